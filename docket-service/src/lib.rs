//! Docket Service - Application Workflow
//!
//! Wires the indexed read-through cache from `docket-storage` to the
//! external status oracle and exposes the create/read/update workflow on
//! application records.
//!
//! # Example
//!
//! ```ignore
//! let config = ServiceConfig::from_env()?;
//! init_tracing(&config.telemetry);
//!
//! let service = ApplicationService::bootstrap(&config, store).await?;
//! let app = service.create(&owner_id).await?;
//! ```

pub mod config;
pub mod error;
pub mod oracle;
pub mod service;
pub mod telemetry;

pub use config::{OracleConfig, ServiceConfig, TelemetryConfig};
pub use error::{ErrorCode, ServiceError, ServiceResult};
pub use oracle::{parse_status_response, HttpStatusOracle, MockStatusOracle, StatusOracle};
pub use service::ApplicationService;
pub use telemetry::init_tracing;
