//! EndpointService: transport-agnostic endpoint operations.
//!
//! This service owns:
//! - The coordinator handle (invoke, reload, snapshot, shutdown)
//! - Source storage under the endpoint root
//! - The build pipeline configuration
//!
//! Transports (HTTP today) translate requests into calls on this service.

use std::io;
use std::path::PathBuf;

use crate::build::{self, BuildConfig, BuildError};
use crate::endpoint::{Endpoint, EndpointId, EndpointIdError, check_segment};
use crate::orchestrator::{
    CallArgument, CoordinatorHandle, InvokeError, ReloadError, ReloadOutcome, WorkerSnapshot,
};
use crate::version::VersionInfo;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("No src data received")]
    EmptySource,
    #[error(transparent)]
    InvalidPath(#[from] EndpointIdError),
    #[error("failed to save source: {0}")]
    Save(#[source] io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error(transparent)]
    InvalidPath(#[from] EndpointIdError),
    #[error("source file not found: {0}")]
    NotFound(String),
    #[error("failed to read source: {0}")]
    Read(#[source] io::Error),
}

/// What happened after an upload was saved.
#[derive(Debug)]
pub enum UploadOutcome {
    BuildFailed(BuildError),
    Started {
        endpoint: Endpoint,
        reload: ReloadOutcome,
    },
    StartFailed {
        endpoint: Endpoint,
        error: ReloadError,
    },
}

/// Snapshot of service health for transports to query.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthSnapshot {
    pub version: VersionInfo,
    pub coordinator_running: bool,
    pub endpoints: Vec<WorkerSnapshot>,
}

pub struct EndpointService {
    coordinator: CoordinatorHandle,
    endpoint_root: PathBuf,
    build: BuildConfig,
    version: VersionInfo,
}

impl EndpointService {
    pub fn new(
        coordinator: CoordinatorHandle,
        endpoint_root: impl Into<PathBuf>,
        build: BuildConfig,
    ) -> Self {
        Self {
            coordinator,
            endpoint_root: endpoint_root.into(),
            build,
            version: VersionInfo::new(),
        }
    }

    pub async fn invoke(
        &self,
        endpoint: EndpointId,
        argument: CallArgument,
    ) -> Result<String, InvokeError> {
        self.coordinator.invoke(endpoint, argument).await
    }

    pub async fn read_source(
        &self,
        owner: &str,
        package: &str,
        filename: &str,
    ) -> Result<String, SourceError> {
        check_source_path(owner, package, filename)?;
        let path = build::source_path(&self.endpoint_root, owner, package, filename);
        match tokio::fs::read_to_string(&path).await {
            Ok(src) => Ok(src),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(SourceError::NotFound(filename.to_string()))
            }
            Err(e) => Err(SourceError::Read(e)),
        }
    }

    /// Save, build and (re)start. Waits for the reload to finish so the
    /// caller learns whether the worker came up.
    pub async fn upload_source(
        &self,
        owner: &str,
        package: &str,
        filename: &str,
        source: &str,
    ) -> Result<UploadOutcome, UploadError> {
        check_source_path(owner, package, filename)?;
        if source.is_empty() {
            return Err(UploadError::EmptySource);
        }

        let path = build::source_path(&self.endpoint_root, owner, package, filename);
        build::save_source(&path, source)
            .await
            .map_err(UploadError::Save)?;
        tracing::info!(target: "iota::service", path = %path.display(), "Source saved");

        let endpoint = match build::build_endpoint(
            &self.build,
            &self.endpoint_root,
            owner,
            package,
            source,
        )
        .await
        {
            Ok(endpoint) => endpoint,
            Err(e) => return Ok(UploadOutcome::BuildFailed(e)),
        };

        let result = match self.coordinator.reload(endpoint.clone()).await {
            Ok(ticket) => ticket.await,
            Err(e) => Err(e),
        };
        Ok(match result {
            Ok(reload) => UploadOutcome::Started { endpoint, reload },
            Err(error) => UploadOutcome::StartFailed { endpoint, error },
        })
    }

    pub async fn health(&self) -> HealthSnapshot {
        let (coordinator_running, endpoints) = match self.coordinator.snapshot().await {
            Ok(endpoints) => (true, endpoints),
            Err(_) => (false, Vec::new()),
        };
        HealthSnapshot {
            version: self.version.clone(),
            coordinator_running,
            endpoints,
        }
    }

    /// Stop every worker. Idempotent.
    pub async fn shutdown(&self) {
        if self.coordinator.shutdown().await.is_err() {
            tracing::debug!(target: "iota::service", "Coordinator already stopped");
        }
    }
}

fn check_source_path(owner: &str, package: &str, filename: &str) -> Result<(), EndpointIdError> {
    check_segment("owner", owner)?;
    check_segment("package", package)?;
    check_segment("filename", filename)
}
