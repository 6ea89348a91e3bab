//! Docket Core - Entity Types
//!
//! Pure data structures for application records, the filters used to query
//! them, and the error taxonomy shared by every other crate in the workspace.
//! This crate performs no I/O.

pub mod entities;
pub mod enums;
pub mod error;
pub mod filter;
pub mod identity;

pub use entities::{Application, StatusUpdate};
pub use enums::{ApplicationStatus, ExternalStatus};
pub use error::{
    ConfigError, DocketError, DocketResult, ExternalError, StorageError, ValidationError,
};
pub use filter::{ApplicationFilter, TimeRange};
pub use identity::{ApplicationId, Timestamp, UserId};
