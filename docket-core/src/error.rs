//! Error types for docket operations

use thiserror::Error;
use uuid::Uuid;

/// Storage layer errors (Record Store and cache).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Application not found: {id}")]
    NotFound { id: Uuid },

    #[error("Insert failed for application {id}: {reason}")]
    InsertFailed { id: Uuid, reason: String },

    #[error("Update failed for application {id}: {reason}")]
    UpdateFailed { id: Uuid, reason: String },

    #[error("Record store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Serialization error: {reason}")]
    Serialization { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Write for application {id} was abandoned before completing")]
    WriteAbandoned { id: Uuid },

    #[error("Index entry for application {id} has no primary record")]
    IndexInconsistent { id: Uuid },
}

/// Validation errors. Raised before the cache or the store is touched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Filter must carry at least one predicate")]
    EmptyFilter,

    #[error("Invalid range for {field}: start must be before end")]
    InvalidRange { field: String },
}

/// External status oracle errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExternalError {
    #[error("Oracle request failed with status {status}: {message}")]
    RequestFailed { status: u16, message: String },

    #[error("Invalid response from oracle: {reason}")]
    InvalidResponse { reason: String },

    #[error("Oracle transport error: {reason}")]
    Transport { reason: String },

    #[error("Oracle request timed out")]
    Timeout,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all docket errors.
///
/// `Clone` so a coalesced write can hand the same failure to every waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DocketError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("External error: {0}")]
    External(#[from] ExternalError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl DocketError {
    /// True when the record does not exist in the Record Store.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DocketError::Storage(StorageError::NotFound { .. }))
    }

    /// True for malformed identities, filters or status values.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, DocketError::Validation(_))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization {
            reason: e.to_string(),
        }
    }
}

/// Result type alias for docket operations.
pub type DocketResult<T> = Result<T, DocketError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_not_found() {
        let err = StorageError::NotFound { id: Uuid::nil() };
        let msg = format!("{}", err);
        assert!(msg.contains("not found"));
        assert!(msg.contains("00000000-0000-0000-0000-000000000000"));
    }

    #[test]
    fn test_validation_error_display_invalid_range() {
        let err = ValidationError::InvalidRange {
            field: "created_at".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("created_at"));
        assert!(msg.contains("before end"));
    }

    #[test]
    fn test_external_error_display_request_failed() {
        let err = ExternalError::RequestFailed {
            status: 400,
            message: "bad id".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("400"));
        assert!(msg.contains("bad id"));
    }

    #[test]
    fn test_docket_error_classification() {
        let not_found = DocketError::from(StorageError::NotFound { id: Uuid::nil() });
        assert!(not_found.is_not_found());
        assert!(!not_found.is_invalid_argument());

        let invalid = DocketError::from(ValidationError::EmptyFilter);
        assert!(invalid.is_invalid_argument());
        assert!(!invalid.is_not_found());

        let store = DocketError::from(StorageError::Unavailable {
            reason: "down".to_string(),
        });
        assert!(!store.is_not_found());
        assert!(!store.is_invalid_argument());
    }

    #[test]
    fn test_docket_error_from_variants() {
        assert!(matches!(
            DocketError::from(StorageError::LockPoisoned),
            DocketError::Storage(_)
        ));
        assert!(matches!(
            DocketError::from(ExternalError::Timeout),
            DocketError::External(_)
        ));
        assert!(matches!(
            DocketError::from(ConfigError::MissingRequired {
                field: "url".to_string()
            }),
            DocketError::Config(_)
        ));
    }

    #[test]
    fn test_serde_error_becomes_serialization() {
        let err = serde_json::from_str::<u32>("not json").unwrap_err();
        assert!(matches!(
            StorageError::from(err),
            StorageError::Serialization { .. }
        ));
    }
}
