//! Process supervisor - starts and stops worker executables.
//!
//! Workers live at `<root>/<owner>/f/<package>/endpoint` and are started with
//! `--port <n>`. The handle owns the `tokio::process::Child`, so a worker that
//! has already been reaped is never signalled: a pid recycled by the OS for an
//! unrelated process cannot be hit.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};

use crate::endpoint::EndpointId;

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("worker executable not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("worker executable is not executable: {}", .0.display())]
    NotExecutable(PathBuf),
    #[error("failed to spawn {}: {source}", .path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("spawn failed: {0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TerminateError {
    #[error("worker (pid {pid:?}) is no longer running: {status}")]
    NotRunning { pid: Option<u32>, status: String },
    #[error("failed to signal worker (pid {pid:?}): {reason}")]
    Signal { pid: Option<u32>, reason: String },
    #[error("worker (pid {pid:?}) did not exit within {grace:?}")]
    Unconfirmed { pid: Option<u32>, grace: Duration },
    #[error("failed to wait for worker: {0}")]
    Io(#[from] io::Error),
}

/// What the coordinator needs to know about a worker handle.
pub trait WorkerHandle: Send + 'static {
    fn pid(&self) -> Option<u32>;
}

/// Extension point for how workers are started and stopped.
///
/// Both calls run inside the coordinator's turn; implementations must not
/// wait on anything unbounded.
#[async_trait]
pub trait ProcessSupervisor: Send + Sync + 'static {
    type Handle: WorkerHandle;

    async fn start(&self, endpoint: &EndpointId, port: u16) -> Result<Self::Handle, SpawnError>;

    async fn terminate(&self, handle: &mut Self::Handle) -> Result<(), TerminateError>;
}

/// A started worker executable.
#[derive(Debug)]
pub struct WorkerProcess {
    child: Child,
    pid: Option<u32>,
}

impl WorkerHandle for WorkerProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }
}

/// Supervisor for compiled worker executables under an endpoint root.
#[derive(Debug, Clone)]
pub struct ExecutableSupervisor {
    root: PathBuf,
    terminate_grace: Duration,
}

impl ExecutableSupervisor {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            terminate_grace: Duration::from_secs(5),
        }
    }

    pub fn with_terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn executable_path(&self, endpoint: &EndpointId) -> PathBuf {
        executable_path(&self.root, endpoint)
    }
}

/// `<root>/<owner>/f/<package>/endpoint`
pub fn executable_path(root: &Path, endpoint: &EndpointId) -> PathBuf {
    root.join(endpoint.owner())
        .join("f")
        .join(endpoint.package())
        .join("endpoint")
}

fn check_executable(path: &Path) -> Result<(), SpawnError> {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(SpawnError::NotFound(path.to_path_buf()));
        }
        Err(e) => {
            return Err(SpawnError::Spawn {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };
    if !metadata.is_file() {
        return Err(SpawnError::NotExecutable(path.to_path_buf()));
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(SpawnError::NotExecutable(path.to_path_buf()));
        }
    }
    Ok(())
}

#[async_trait]
impl ProcessSupervisor for ExecutableSupervisor {
    type Handle = WorkerProcess;

    async fn start(&self, endpoint: &EndpointId, port: u16) -> Result<WorkerProcess, SpawnError> {
        let path = self.executable_path(endpoint);
        check_executable(&path)?;

        let child = Command::new(&path)
            .arg("--port")
            .arg(port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SpawnError::Spawn {
                path: path.clone(),
                source,
            })?;

        let pid = child.id();
        tracing::debug!(%endpoint, port, ?pid, path = %path.display(), "Spawned worker");

        Ok(WorkerProcess { child, pid })
    }

    async fn terminate(&self, handle: &mut WorkerProcess) -> Result<(), TerminateError> {
        let pid = handle.pid;

        if let Some(status) = handle.child.try_wait()? {
            return Err(TerminateError::NotRunning {
                pid,
                status: status.to_string(),
            });
        }

        // SIGTERM first so the worker can release its port cleanly.
        #[cfg(unix)]
        {
            if let Some(raw) = handle.child.id() {
                use nix::sys::signal::{Signal, kill};
                use nix::unistd::Pid;

                match kill(Pid::from_raw(raw as i32), Signal::SIGTERM) {
                    Ok(()) => {
                        if let Ok(status) =
                            tokio::time::timeout(self.terminate_grace, handle.child.wait()).await
                        {
                            let status = status?;
                            tracing::debug!(?pid, %status, "Worker exited after SIGTERM");
                            return Ok(());
                        }
                        tracing::warn!(?pid, grace = ?self.terminate_grace, "Worker ignored SIGTERM, killing");
                    }
                    Err(e) => {
                        tracing::warn!(?pid, error = %e, "SIGTERM failed, killing");
                    }
                }
            }
        }

        handle
            .child
            .start_kill()
            .map_err(|e| TerminateError::Signal {
                pid,
                reason: e.to_string(),
            })?;

        match tokio::time::timeout(self.terminate_grace, handle.child.wait()).await {
            Ok(status) => {
                let status = status?;
                tracing::debug!(?pid, %status, "Worker killed");
                Ok(())
            }
            Err(_) => Err(TerminateError::Unconfirmed {
                pid,
                grace: self.terminate_grace,
            }),
        }
    }
}
