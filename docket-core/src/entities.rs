//! Application record and the status update payload.

use crate::enums::{ApplicationStatus, ExternalStatus};
use crate::error::ValidationError;
use crate::identity::{ApplicationId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// An application moving through the Open → InProgress → Closed workflow.
///
/// `id`, `owner`, `created_at` and `external_status` never change after
/// creation. `updated_at` is refreshed on every successful status update and
/// is never earlier than `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub status: ApplicationStatus,
    pub owner: UserId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub external_status: ExternalStatus,
}

impl Application {
    /// Create a freshly opened application.
    pub fn open(
        id: ApplicationId,
        owner: UserId,
        external_status: ExternalStatus,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            status: ApplicationStatus::Open,
            owner,
            created_at: now,
            updated_at: now,
            external_status,
        }
    }

    /// Copy of this record moved to `status`, stamped at `at`.
    ///
    /// `updated_at` never moves before `created_at`.
    pub fn with_status(&self, status: ApplicationStatus, at: Timestamp) -> Self {
        Self {
            status,
            updated_at: at.max(self.created_at),
            ..self.clone()
        }
    }

    /// Check the invariants every persisted record must satisfy.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.status.validate()?;
        self.external_status.validate()?;
        if self.updated_at < self.created_at {
            return Err(ValidationError::InvalidValue {
                field: "updated_at".to_string(),
                reason: "updated_at precedes created_at".to_string(),
            });
        }
        Ok(())
    }
}

/// Status-only update of an existing application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub id: ApplicationId,
    pub status: ApplicationStatus,
}

impl StatusUpdate {
    pub fn new(id: ApplicationId, status: ApplicationStatus) -> Self {
        Self { id, status }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.status.validate()
    }
}
