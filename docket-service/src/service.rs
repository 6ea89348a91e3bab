//! Application workflow service.
//!
//! Validates caller input, asks the status oracle for the external status of
//! new applications and routes everything else through the cached
//! repository.

use chrono::Utc;
use docket_core::{
    Application, ApplicationFilter, ApplicationId, ApplicationStatus, DocketError, StatusUpdate,
    UserId,
};
use docket_storage::{ApplicationStore, CachedApplicationStore};

use crate::config::ServiceConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::oracle::{HttpStatusOracle, StatusOracle};

/// Create/read/update workflow over a record repository and a status oracle.
pub struct ApplicationService<R, O> {
    repository: R,
    oracle: O,
}

impl<S: ApplicationStore> ApplicationService<CachedApplicationStore<S>, HttpStatusOracle> {
    /// Assemble the production service: warm a cache over `store` and
    /// connect the HTTP oracle.
    ///
    /// Fails if the oracle URL is unusable or the warm-up read fails.
    pub async fn bootstrap(config: &ServiceConfig, store: S) -> ServiceResult<Self> {
        let oracle = HttpStatusOracle::new(&config.oracle).map_err(|e| match e {
            DocketError::Config(e) => ServiceError::Config(e),
            other => ServiceError::from_oracle(other),
        })?;
        let repository = CachedApplicationStore::new(store, config.cache.clone())
            .await
            .map_err(ServiceError::from_repository)?;

        tracing::info!(
            oracle = %config.oracle.url,
            cached = repository.cache().len(),
            "application service ready"
        );
        Ok(Self::new(repository, oracle))
    }
}

impl<R: ApplicationStore, O: StatusOracle> ApplicationService<R, O> {
    pub fn new(repository: R, oracle: O) -> Self {
        Self { repository, oracle }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Open a new application for `owner`.
    pub async fn create(&self, owner: &str) -> ServiceResult<Application> {
        tracing::info!(user_id = owner, "creating application");
        let owner = UserId::parse(owner).map_err(|e| {
            tracing::warn!(error = %e, "rejected user id");
            ServiceError::from(e)
        })?;

        let id = ApplicationId::new();
        let external_status = self.oracle.external_status(id).await.map_err(|e| {
            tracing::error!(%id, error = %e, "external status lookup failed");
            ServiceError::from_oracle(e)
        })?;

        let app = Application::open(id, owner, external_status, Utc::now());
        app.validate().map_err(|e| {
            tracing::error!(%id, error = %e, "oracle returned an unusable status");
            ServiceError::from(e)
        })?;

        self.repository.create(&app).await.map_err(|e| {
            tracing::error!(%id, error = %e, "failed to save application");
            ServiceError::from_repository(e)
        })?;

        tracing::info!(%id, external_status = %app.external_status, "application created");
        Ok(app)
    }

    /// Fetch one application.
    pub async fn get_by_id(&self, id: &str) -> ServiceResult<Application> {
        let id = ApplicationId::parse(id)?;
        self.find(id).await
    }

    /// Fetch every application matching `filter`.
    pub async fn get_by_filters(&self, filter: &ApplicationFilter) -> ServiceResult<Vec<Application>> {
        tracing::info!(?filter, "finding applications by filter");
        filter.validate()?;

        let apps = self.repository.find_by_filters(filter).await.map_err(|e| {
            tracing::error!(error = %e, "failed to find applications");
            ServiceError::from_repository(e)
        })?;

        tracing::info!(count = apps.len(), "applications found");
        Ok(apps)
    }

    /// Move an existing application to `status`.
    pub async fn update(&self, id: &str, status: ApplicationStatus) -> ServiceResult<Application> {
        tracing::info!(id, %status, "updating application");
        let id = ApplicationId::parse(id)?;
        let update = StatusUpdate::new(id, status);
        update.validate()?;

        self.find(id).await?;

        let app = self.repository.update(&update).await.map_err(|e| {
            tracing::error!(%id, error = %e, "failed to update application");
            ServiceError::from_repository(e)
        })?;

        tracing::info!(%id, status = %app.status, "application updated");
        Ok(app)
    }

    async fn find(&self, id: ApplicationId) -> ServiceResult<Application> {
        match self.repository.find_by_id(id).await {
            Ok(Some(app)) => Ok(app),
            Ok(None) => {
                tracing::info!(%id, "application not found");
                Err(ServiceError::NotFound { id })
            }
            Err(e) => {
                tracing::error!(%id, error = %e, "failed to find application");
                Err(ServiceError::from_repository(e))
            }
        }
    }
}
