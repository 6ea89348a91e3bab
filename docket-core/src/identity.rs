//! Identity types for docket records

use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

macro_rules! uuid_identity {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh UUIDv7 identity (timestamp-sortable).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Wrap an existing UUID.
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Get the underlying UUID.
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }

            /// Parse and validate an identity supplied by a caller.
            ///
            /// The nil UUID is never assigned by docket and is rejected.
            pub fn parse(value: &str) -> Result<Self, ValidationError> {
                let id = Uuid::parse_str(value.trim()).map_err(|e| {
                    ValidationError::InvalidValue {
                        field: $field.to_string(),
                        reason: format!("{} is not a valid id: {}", value, e),
                    }
                })?;
                if id.is_nil() {
                    return Err(ValidationError::InvalidValue {
                        field: $field.to_string(),
                        reason: "nil id".to_string(),
                    });
                }
                Ok(Self(id))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_identity!(
    /// Identifier of an application record. Assigned once at creation.
    ApplicationId,
    "id"
);

uuid_identity!(
    /// Identifier of the user that requested an application.
    UserId,
    "user_id"
);
