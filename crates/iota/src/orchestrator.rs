//! Orchestrator - the coordinator task that owns every running worker.
//!
//! Flow:
//! 1. Callers hold a cloneable [`CoordinatorHandle`] and submit commands
//! 2. One task drains the command queue in arrival order
//! 3. Reload: terminate the old worker, pick a port, start the new worker
//! 4. Invoke: resolve the port, then hand the RPC round trip to its own task
//! 5. Shutdown (or every handle dropped): terminate all workers and exit
//!
//! The coordinator is the only code that touches the registry or the port
//! counter. It awaits supervisor calls inside its turn, so reloads of one
//! endpoint never overlap, but it never awaits worker I/O.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::endpoint::{Endpoint, EndpointId};
use crate::port::{PORT_START, PortAllocator};
use crate::process::{ExecutableSupervisor, ProcessSupervisor, SpawnError, WorkerHandle};
use crate::registry::{Registry, WorkerRecord};
use crate::rpc::{CallError, RpcConfig, RpcProxy, TransportError};

pub struct OrchestratorConfig {
    pub endpoint_root: PathBuf,
    pub port_start: u16,
    pub queue_capacity: usize,
    pub terminate_grace: Duration,
    pub rpc: RpcConfig,
}

impl OrchestratorConfig {
    pub fn new(endpoint_root: impl Into<PathBuf>) -> Self {
        Self {
            endpoint_root: endpoint_root.into(),
            port_start: PORT_START,
            queue_capacity: 256,
            terminate_grace: Duration::from_secs(5),
            rpc: RpcConfig::default(),
        }
    }

    pub fn with_port_start(mut self, port: u16) -> Self {
        self.port_start = port;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.rpc.connect_timeout = timeout;
        self
    }

    /// `None` lets a call wait on its worker forever.
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.rpc.call_timeout = timeout;
        self
    }

    /// Supervisor for compiled workers under `endpoint_root`.
    pub fn executable_supervisor(&self) -> ExecutableSupervisor {
        ExecutableSupervisor::new(&self.endpoint_root).with_terminate_grace(self.terminate_grace)
    }
}

/// The argument of one call, before or after extraction from form values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallArgument {
    Value(String),
    /// Raw form values; the endpoint's parameter name selects the argument.
    Form(Vec<(String, String)>),
}

impl CallArgument {
    fn extract(self, parameter: &str) -> Result<String, InvokeError> {
        match self {
            CallArgument::Value(value) => Ok(value),
            CallArgument::Form(pairs) => {
                let mut values = pairs
                    .into_iter()
                    .filter(|(k, _)| k == parameter)
                    .map(|(_, v)| v);
                match (values.next(), values.next()) {
                    (Some(value), None) => Ok(value),
                    (None, _) => Err(InvokeError::MissingParameter(parameter.to_string())),
                    (Some(_), Some(_)) => {
                        Err(InvokeError::AmbiguousParameter(parameter.to_string()))
                    }
                }
            }
        }
    }
}

/// What a completed reload did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReloadOutcome {
    pub port: u16,
    /// The previous worker's port was handed to the new worker.
    pub reused_port: bool,
    pub generation: u64,
}

/// One running worker, as reported by [`CoordinatorHandle::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerSnapshot {
    pub endpoint: EndpointId,
    pub port: u16,
    pub pid: Option<u32>,
    pub generation: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    #[error("failed to start worker for {endpoint}: {source}")]
    Spawn {
        endpoint: EndpointId,
        #[source]
        source: SpawnError,
    },
    #[error("no free worker ports left")]
    PortsExhausted,
    #[error("coordinator is not running")]
    CoordinatorClosed,
}

#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("endpoint {0} is not running")]
    EndpointNotRunning(EndpointId),
    #[error("missing parameter '{0}'")]
    MissingParameter(String),
    #[error("parameter '{0}' was given more than once")]
    AmbiguousParameter(String),
    #[error(transparent)]
    Transport(TransportError),
    /// Error returned by the endpoint function itself.
    #[error("{0}")]
    Application(String),
    #[error("coordinator is not running")]
    CoordinatorClosed,
}

impl From<CallError> for InvokeError {
    fn from(e: CallError) -> Self {
        match e {
            CallError::Transport(e) => InvokeError::Transport(e),
            CallError::Application(message) => InvokeError::Application(message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("coordinator is not running")]
pub struct CoordinatorClosed;

/// Completion signal for a submitted reload.
///
/// Dropping it is fine: the reload still runs. Awaiting it yields the outcome.
#[derive(Debug)]
pub struct ReloadTicket {
    rx: oneshot::Receiver<Result<ReloadOutcome, ReloadError>>,
}

impl Future for ReloadTicket {
    type Output = Result<ReloadOutcome, ReloadError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or(Err(ReloadError::CoordinatorClosed)))
    }
}

enum Command {
    Reload {
        endpoint: Endpoint,
        ack: oneshot::Sender<Result<ReloadOutcome, ReloadError>>,
    },
    Invoke {
        endpoint: EndpointId,
        argument: CallArgument,
        reply: oneshot::Sender<Result<String, InvokeError>>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<WorkerSnapshot>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Submits commands to the coordinator task. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Command>,
}

impl CoordinatorHandle {
    /// Queue a reload. Waits only for queue space, not for the reload itself.
    pub async fn reload(&self, endpoint: Endpoint) -> Result<ReloadTicket, ReloadError> {
        let (ack, rx) = oneshot::channel();
        self.tx
            .send(Command::Reload { endpoint, ack })
            .await
            .map_err(|_| ReloadError::CoordinatorClosed)?;
        Ok(ReloadTicket { rx })
    }

    pub async fn invoke(
        &self,
        endpoint: EndpointId,
        argument: CallArgument,
    ) -> Result<String, InvokeError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Invoke {
                endpoint,
                argument,
                reply,
            })
            .await
            .map_err(|_| InvokeError::CoordinatorClosed)?;
        rx.await.unwrap_or(Err(InvokeError::CoordinatorClosed))
    }

    pub async fn snapshot(&self) -> Result<Vec<WorkerSnapshot>, CoordinatorClosed> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Snapshot { reply })
            .await
            .map_err(|_| CoordinatorClosed)?;
        rx.await.map_err(|_| CoordinatorClosed)
    }

    /// Terminate every worker and stop the coordinator.
    pub async fn shutdown(&self) -> Result<(), CoordinatorClosed> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Shutdown { reply })
            .await
            .map_err(|_| CoordinatorClosed)?;
        rx.await.map_err(|_| CoordinatorClosed)
    }
}

/// Start the coordinator task on the current runtime.
pub fn spawn_coordinator<S: ProcessSupervisor>(
    config: &OrchestratorConfig,
    supervisor: S,
) -> CoordinatorHandle {
    let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
    let coordinator = Coordinator {
        supervisor,
        registry: Registry::new(),
        ports: PortAllocator::new(config.port_start),
        proxy: RpcProxy::new(config.rpc.clone()),
        generation: 0,
    };
    tracing::info!(
        target: "iota::coordinator",
        port_start = config.port_start,
        queue_capacity = config.queue_capacity,
        "Coordinator started"
    );
    tokio::spawn(coordinator.run(rx));
    CoordinatorHandle { tx }
}

struct Coordinator<S: ProcessSupervisor> {
    supervisor: S,
    registry: Registry<S::Handle>,
    ports: PortAllocator,
    proxy: RpcProxy,
    generation: u64,
}

impl<S: ProcessSupervisor> Coordinator<S> {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Reload { endpoint, ack } => {
                    let id = endpoint.id.clone();
                    let result = self.reload(endpoint).await;
                    if let Err(e) = &result {
                        tracing::error!(target: "iota::coordinator", endpoint = %id, error = %e, "Reload failed");
                    }
                    let _ = ack.send(result);
                }
                Command::Invoke {
                    endpoint,
                    argument,
                    reply,
                } => self.invoke(endpoint, argument, reply),
                Command::Snapshot { reply } => {
                    let _ = reply.send(self.snapshot());
                }
                Command::Shutdown { reply } => {
                    self.terminate_all().await;
                    let _ = reply.send(());
                    tracing::info!(target: "iota::coordinator", "Coordinator stopped");
                    return;
                }
            }
        }

        tracing::info!(target: "iota::coordinator", "All handles dropped, stopping workers");
        self.terminate_all().await;
    }

    async fn reload(&mut self, endpoint: Endpoint) -> Result<ReloadOutcome, ReloadError> {
        let Endpoint { id, parameter } = endpoint;

        // The old record goes away no matter what; a failed start leaves none.
        let reusable = match self.registry.remove(&id) {
            Some(mut old) => match self.supervisor.terminate(&mut old.handle).await {
                Ok(()) => {
                    tracing::debug!(
                        target: "iota::coordinator",
                        endpoint = %id,
                        port = old.port,
                        generation = old.generation,
                        "Stopped previous worker"
                    );
                    Some(old.port)
                }
                Err(e) => {
                    tracing::warn!(
                        target: "iota::coordinator",
                        endpoint = %id,
                        port = old.port,
                        error = %e,
                        "Failed to stop previous worker, not reusing its port"
                    );
                    None
                }
            },
            None => None,
        };

        let (port, reused_port) = match reusable {
            Some(port) => (self.ports.reuse(port), true),
            None => (self.ports.allocate().ok_or(ReloadError::PortsExhausted)?, false),
        };

        let handle = self
            .supervisor
            .start(&id, port)
            .await
            .map_err(|source| ReloadError::Spawn {
                endpoint: id.clone(),
                source,
            })?;

        self.generation += 1;
        let generation = self.generation;
        tracing::info!(
            target: "iota::coordinator",
            endpoint = %id,
            port,
            reused_port,
            generation,
            pid = ?handle.pid(),
            "Worker started"
        );
        self.registry.put(
            id,
            WorkerRecord {
                port,
                handle,
                parameter,
                generation,
            },
        );

        Ok(ReloadOutcome {
            port,
            reused_port,
            generation,
        })
    }

    fn invoke(
        &self,
        endpoint: EndpointId,
        argument: CallArgument,
        reply: oneshot::Sender<Result<String, InvokeError>>,
    ) {
        let Some(record) = self.registry.lookup(&endpoint) else {
            tracing::debug!(target: "iota::coordinator", %endpoint, "Invoke for endpoint that is not running");
            let _ = reply.send(Err(InvokeError::EndpointNotRunning(endpoint)));
            return;
        };

        let argument = match argument.extract(&record.parameter) {
            Ok(argument) => argument,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };

        let port = record.port;
        let generation = record.generation;
        let proxy = self.proxy.clone();
        tokio::spawn(async move {
            let result = proxy.call(port, &argument).await.map_err(InvokeError::from);
            if let Err(e) = &result {
                tracing::debug!(target: "iota::rpc", %endpoint, port, generation, error = %e, "Call failed");
            }
            let _ = reply.send(result);
        });
    }

    fn snapshot(&self) -> Vec<WorkerSnapshot> {
        let mut workers: Vec<_> = self
            .registry
            .iter()
            .map(|(id, record)| WorkerSnapshot {
                endpoint: id.clone(),
                port: record.port,
                pid: record.handle.pid(),
                generation: record.generation,
            })
            .collect();
        workers.sort_by_key(|w| w.generation);
        workers
    }

    async fn terminate_all(&mut self) {
        let records: Vec<_> = self.registry.drain().collect();
        for (id, mut record) in records {
            match self.supervisor.terminate(&mut record.handle).await {
                Ok(()) => {
                    tracing::debug!(target: "iota::coordinator", endpoint = %id, port = record.port, "Worker stopped");
                }
                Err(e) => {
                    tracing::warn!(target: "iota::coordinator", endpoint = %id, error = %e, "Failed to stop worker");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)]) -> CallArgument {
        CallArgument::Form(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn value_argument_passes_through() {
        let arg = CallArgument::Value("world".into());
        assert_eq!(arg.extract("name").unwrap(), "world");
    }

    #[test]
    fn form_argument_selects_parameter() {
        let arg = form(&[("other", "x"), ("name", "world")]);
        assert_eq!(arg.extract("name").unwrap(), "world");
    }

    #[test]
    fn form_argument_missing_parameter() {
        let err = form(&[("other", "x")]).extract("name").unwrap_err();
        assert!(matches!(err, InvokeError::MissingParameter(ref p) if p == "name"));
    }

    #[test]
    fn form_argument_ambiguous_parameter() {
        let err = form(&[("name", "a"), ("name", "b")])
            .extract("name")
            .unwrap_err();
        assert!(matches!(err, InvokeError::AmbiguousParameter(ref p) if p == "name"));
    }

    #[test]
    fn config_builder() {
        let config = OrchestratorConfig::new("/srv/iota")
            .with_port_start(12000)
            .with_queue_capacity(0)
            .with_call_timeout(None);

        assert_eq!(config.port_start, 12000);
        assert_eq!(config.queue_capacity, 1);
        assert_eq!(config.rpc.call_timeout, None);
        assert_eq!(
            config.executable_supervisor().root(),
            std::path::Path::new("/srv/iota")
        );
    }

    #[test]
    fn config_defaults() {
        let config = OrchestratorConfig::new("/srv/iota");
        assert_eq!(config.port_start, 9000);
        assert_eq!(config.rpc.call_timeout, Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn dropped_ticket_channel_is_coordinator_closed() {
        let (ack, rx) = oneshot::channel::<Result<ReloadOutcome, ReloadError>>();
        drop(ack);
        let err = ReloadTicket { rx }.await.unwrap_err();
        assert!(matches!(err, ReloadError::CoordinatorClosed));
    }
}
