//! External status oracle client.
//!
//! The oracle is asked once per record, at creation time, whether the
//! application was `Processed` or `Skipped`. It is slow; callers should
//! expect it to take seconds.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use docket_core::{
    ApplicationId, ConfigError, DocketError, DocketResult, ExternalError, ExternalStatus,
};
use reqwest::{StatusCode, Url};
use serde::Deserialize;

use crate::config::OracleConfig;

/// Source of the external status for a newly created application.
#[async_trait]
pub trait StatusOracle: Send + Sync {
    async fn external_status(&self, id: ApplicationId) -> DocketResult<ExternalStatus>;
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
}

/// Decode an oracle response body such as `{"status": "Processed"}`.
pub fn parse_status_response(body: &str) -> Result<ExternalStatus, ExternalError> {
    let response: StatusResponse =
        serde_json::from_str(body).map_err(|e| ExternalError::InvalidResponse {
            reason: e.to_string(),
        })?;
    response
        .status
        .parse::<ExternalStatus>()
        .map_err(|e| ExternalError::InvalidResponse {
            reason: e.to_string(),
        })
}

fn transport_error(e: reqwest::Error) -> ExternalError {
    if e.is_timeout() {
        ExternalError::Timeout
    } else {
        ExternalError::Transport {
            reason: e.to_string(),
        }
    }
}

// ============================================================================
// HTTP ORACLE
// ============================================================================

/// Oracle reached over HTTP at `GET {url}/status/{id}`.
#[derive(Debug, Clone)]
pub struct HttpStatusOracle {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpStatusOracle {
    pub fn new(config: &OracleConfig) -> DocketResult<Self> {
        let base_url = Url::parse(config.url.trim_end_matches('/')).map_err(|e| {
            ConfigError::InvalidValue {
                field: "url".to_string(),
                value: config.url.clone(),
                reason: e.to_string(),
            }
        })?;

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ExternalError::Transport {
                reason: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, base_url })
    }

    fn status_url(&self, id: ApplicationId) -> String {
        format!(
            "{}/status/{}",
            self.base_url.as_str().trim_end_matches('/'),
            id
        )
    }
}

#[async_trait]
impl StatusOracle for HttpStatusOracle {
    async fn external_status(&self, id: ApplicationId) -> DocketResult<ExternalStatus> {
        let response = self
            .client
            .get(self.status_url(id))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if status != StatusCode::OK {
            return Err(ExternalError::RequestFailed {
                status: status.as_u16(),
                message: body,
            }
            .into());
        }

        let external = parse_status_response(&body)?;
        tracing::debug!(%id, status = %external, "external status resolved");
        Ok(external)
    }
}

// ============================================================================
// MOCK ORACLE
// ============================================================================

/// In-process oracle returning a fixed answer.
#[derive(Debug)]
pub struct MockStatusOracle {
    answer: Result<ExternalStatus, DocketError>,
    calls: AtomicUsize,
}

impl MockStatusOracle {
    /// Always answer `status`.
    pub fn answering(status: ExternalStatus) -> Self {
        Self {
            answer: Ok(status),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always fail with `error`.
    pub fn failing(error: impl Into<DocketError>) -> Self {
        Self {
            answer: Err(error.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of lookups made.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusOracle for MockStatusOracle {
    async fn external_status(&self, _id: ApplicationId) -> DocketResult<ExternalStatus> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone()
    }
}
