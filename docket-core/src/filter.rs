//! Conjunctive filters over application records.
//!
//! A filter carries up to four optional predicates. Present predicates are
//! combined with logical AND; a filter with no predicate is invalid input.

use crate::entities::Application;
use crate::enums::ApplicationStatus;
use crate::error::ValidationError;
use crate::identity::{Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// Half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeRange {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    /// True when `at` lies in `[start, end)`.
    pub fn contains(&self, at: Timestamp) -> bool {
        self.start <= at && at < self.end
    }

    fn validate(&self, field: &str) -> Result<(), ValidationError> {
        if self.start < self.end {
            Ok(())
        } else {
            Err(ValidationError::InvalidRange {
                field: field.to_string(),
            })
        }
    }
}

/// Query descriptor for `find_by_filters`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationFilter {
    pub status: Option<ApplicationStatus>,
    pub owner: Option<UserId>,
    pub created_at: Option<TimeRange>,
    pub updated_at: Option<TimeRange>,
}

impl ApplicationFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: ApplicationStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_owner(mut self, owner: UserId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_created_at(mut self, range: TimeRange) -> Self {
        self.created_at = Some(range);
        self
    }

    pub fn with_updated_at(mut self, range: TimeRange) -> Self {
        self.updated_at = Some(range);
        self
    }

    /// Number of predicates present.
    pub fn predicate_count(&self) -> usize {
        usize::from(self.status.is_some())
            + usize::from(self.owner.is_some())
            + usize::from(self.created_at.is_some())
            + usize::from(self.updated_at.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.predicate_count() == 0
    }

    /// Reject empty filters, sentinel statuses and inverted ranges.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::EmptyFilter);
        }
        if let Some(status) = &self.status {
            status.validate()?;
        }
        if let Some(range) = &self.created_at {
            range.validate("created_at")?;
        }
        if let Some(range) = &self.updated_at {
            range.validate("updated_at")?;
        }
        Ok(())
    }

    /// Evaluate every present predicate directly against a record.
    pub fn matches(&self, app: &Application) -> bool {
        self.status.map_or(true, |s| app.status == s)
            && self.owner.map_or(true, |o| app.owner == o)
            && self.created_at.map_or(true, |r| r.contains(app.created_at))
            && self.updated_at.map_or(true, |r| r.contains(app.updated_at))
    }
}
