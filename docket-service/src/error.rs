//! Error Types for the docket workflow service
//!
//! Every failure leaving [`ApplicationService`](crate::ApplicationService) is
//! a [`ServiceError`], and every `ServiceError` classifies into one
//! [`ErrorCode`] so a transport layer can map it without inspecting causes.

use docket_core::{
    ApplicationId, ConfigError, DocketError, ExternalError, StorageError, ValidationError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Transport-neutral classification of a service failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed id, empty or inverted filter, invalid status.
    InvalidArgument,
    /// The record does not exist.
    NotFound,
    /// A collaborator (record store or status oracle) could not answer.
    Unavailable,
    /// Anything else.
    Internal,
}

// ============================================================================
// SERVICE ERROR
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] ValidationError),

    #[error("application {id} is not found")]
    NotFound { id: ApplicationId },

    #[error("external status service failed: {0}")]
    ExternalService(#[from] ExternalError),

    #[error("repository failure: {0}")]
    Repository(DocketError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ServiceError {
    /// Classify a failure returned by the repository.
    ///
    /// Validation failures and missing records keep their meaning; every
    /// other failure is opaque to the caller.
    pub fn from_repository(err: DocketError) -> Self {
        match err {
            DocketError::Validation(e) => ServiceError::InvalidArgument(e),
            DocketError::Storage(StorageError::NotFound { id }) => ServiceError::NotFound {
                id: ApplicationId::from_uuid(id),
            },
            other => ServiceError::Repository(other),
        }
    }

    /// Classify a failure returned by the status oracle.
    pub fn from_oracle(err: DocketError) -> Self {
        match err {
            DocketError::External(e) => ServiceError::ExternalService(e),
            other => ServiceError::ExternalService(ExternalError::Transport {
                reason: other.to_string(),
            }),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ServiceError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            ServiceError::NotFound { .. } => ErrorCode::NotFound,
            ServiceError::ExternalService(_) => ErrorCode::Unavailable,
            ServiceError::Repository(DocketError::Storage(StorageError::Unavailable { .. })) => {
                ErrorCode::Unavailable
            }
            ServiceError::Repository(_) | ServiceError::Config(_) => ErrorCode::Internal,
        }
    }
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;
