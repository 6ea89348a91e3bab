//! Enum types for docket records

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// CORE ENUMS
// ============================================================================

/// Workflow status of an application.
///
/// `Unspecified` is the zero value a caller may send; it is never valid for a
/// stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum ApplicationStatus {
    #[default]
    Unspecified,
    Open,
    InProgress,
    Closed,
}

/// Status reported by the external status oracle at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ExternalStatus {
    #[default]
    Unspecified,
    Processed,
    Skipped,
}

impl ApplicationStatus {
    /// Every status a stored record may hold.
    pub const VALID: [ApplicationStatus; 3] = [
        ApplicationStatus::Open,
        ApplicationStatus::InProgress,
        ApplicationStatus::Closed,
    ];

    /// Map a wire code to a status. Unknown codes map to `Unspecified`.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => ApplicationStatus::Open,
            2 => ApplicationStatus::InProgress,
            3 => ApplicationStatus::Closed,
            _ => ApplicationStatus::Unspecified,
        }
    }

    /// Stable wire code of this status.
    pub fn code(&self) -> i32 {
        match self {
            ApplicationStatus::Unspecified => 0,
            ApplicationStatus::Open => 1,
            ApplicationStatus::InProgress => 2,
            ApplicationStatus::Closed => 3,
        }
    }

    /// Reject the `Unspecified` sentinel.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            ApplicationStatus::Unspecified => Err(ValidationError::InvalidValue {
                field: "status".to_string(),
                reason: "invalid status".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

impl ExternalStatus {
    /// Map a wire code to a status. Unknown codes map to `Unspecified`.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => ExternalStatus::Processed,
            2 => ExternalStatus::Skipped,
            _ => ExternalStatus::Unspecified,
        }
    }

    /// Stable wire code of this status.
    pub fn code(&self) -> i32 {
        match self {
            ExternalStatus::Unspecified => 0,
            ExternalStatus::Processed => 1,
            ExternalStatus::Skipped => 2,
        }
    }

    /// Reject the `Unspecified` sentinel.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            ExternalStatus::Unspecified => Err(ValidationError::InvalidValue {
                field: "external_status".to_string(),
                reason: format!("invalid status: {}", self),
            }),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// STRING CONVERSIONS
// ============================================================================

fn normalize_token(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            ApplicationStatus::Unspecified => "unspecified",
            ApplicationStatus::Open => "open",
            ApplicationStatus::InProgress => "in_progress",
            ApplicationStatus::Closed => "closed",
        };
        write!(f, "{}", value)
    }
}

impl FromStr for ApplicationStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "open" => Ok(ApplicationStatus::Open),
            "inprogress" => Ok(ApplicationStatus::InProgress),
            "closed" => Ok(ApplicationStatus::Closed),
            _ => Err(ValidationError::InvalidValue {
                field: "status".to_string(),
                reason: format!("invalid status: {}", s),
            }),
        }
    }
}

impl fmt::Display for ExternalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            ExternalStatus::Unspecified => "unspecified",
            ExternalStatus::Processed => "processed",
            ExternalStatus::Skipped => "skipped",
        };
        write!(f, "{}", value)
    }
}

impl FromStr for ExternalStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "processed" => Ok(ExternalStatus::Processed),
            "skipped" => Ok(ExternalStatus::Skipped),
            _ => Err(ValidationError::InvalidValue {
                field: "external_status".to_string(),
                reason: format!("invalid status: {}", s),
            }),
        }
    }
}
