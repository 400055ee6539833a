//! Test supervisors shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use iota::worker::{EndpointHandler, serve};
use iota::{EndpointId, ProcessSupervisor, SpawnError, TerminateError, WorkerHandle};

/// A port with nothing listening on it (at the time of the call).
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub fn id(owner: &str, package: &str, function: &str) -> EndpointId {
    EndpointId::new(owner, package, function).unwrap()
}

// ============================================================================
// Recording supervisor: no processes, no sockets
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start { endpoint: String, port: u16 },
    Terminate { endpoint: String, port: u16 },
}

#[derive(Debug, Default)]
struct RecorderState {
    events: Vec<Event>,
    live: HashMap<String, usize>,
    max_live: HashMap<String, usize>,
    next_pid: u32,
    fail_start: bool,
    fail_terminate: bool,
}

/// Records every start/terminate and tracks how many workers per endpoint are
/// alive at once. Failures can be switched on between reloads.
#[derive(Clone, Default)]
pub struct RecordingSupervisor {
    state: Arc<Mutex<RecorderState>>,
}

#[derive(Debug)]
pub struct FakeWorker {
    endpoint: String,
    port: u16,
    pid: u32,
    alive: bool,
}

impl WorkerHandle for FakeWorker {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }
}

impl RecordingSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn max_live(&self, endpoint: &EndpointId) -> usize {
        let state = self.state.lock().unwrap();
        state
            .max_live
            .get(&endpoint.to_string())
            .copied()
            .unwrap_or(0)
    }

    pub fn live(&self, endpoint: &EndpointId) -> usize {
        let state = self.state.lock().unwrap();
        state.live.get(&endpoint.to_string()).copied().unwrap_or(0)
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.state.lock().unwrap().fail_start = fail;
    }

    pub fn set_fail_terminate(&self, fail: bool) {
        self.state.lock().unwrap().fail_terminate = fail;
    }
}

#[async_trait]
impl ProcessSupervisor for RecordingSupervisor {
    type Handle = FakeWorker;

    async fn start(&self, endpoint: &EndpointId, port: u16) -> Result<FakeWorker, SpawnError> {
        // Give other tasks a chance to interleave if they could.
        tokio::task::yield_now().await;

        let mut state = self.state.lock().unwrap();
        if state.fail_start {
            return Err(SpawnError::Other("start disabled".to_string()));
        }
        let key = endpoint.to_string();
        state.events.push(Event::Start {
            endpoint: key.clone(),
            port,
        });
        let live = state.live.entry(key.clone()).or_default();
        *live += 1;
        let live = *live;
        let max = state.max_live.entry(key.clone()).or_default();
        *max = (*max).max(live);
        state.next_pid += 1;
        Ok(FakeWorker {
            endpoint: key,
            port,
            pid: 1000 + state.next_pid,
            alive: true,
        })
    }

    async fn terminate(&self, handle: &mut FakeWorker) -> Result<(), TerminateError> {
        tokio::task::yield_now().await;

        let mut state = self.state.lock().unwrap();
        if state.fail_terminate {
            return Err(TerminateError::Signal {
                pid: Some(handle.pid),
                reason: "terminate disabled".to_string(),
            });
        }
        if !handle.alive {
            return Err(TerminateError::NotRunning {
                pid: Some(handle.pid),
                status: "already stopped".to_string(),
            });
        }
        handle.alive = false;
        state.events.push(Event::Terminate {
            endpoint: handle.endpoint.clone(),
            port: handle.port,
        });
        if let Some(live) = state.live.get_mut(&handle.endpoint) {
            *live -= 1;
        }
        Ok(())
    }
}

// ============================================================================
// In-process supervisor: real sockets, workers run as tasks
// ============================================================================

/// Chooses its behaviour from the endpoint's function name:
/// `Hi` greets, `Fail` returns an application error, `Hang` never answers.
pub struct SampleHandler {
    function: String,
}

#[async_trait]
impl EndpointHandler for SampleHandler {
    async fn serve(&self, argument: String) -> Result<String, String> {
        match self.function.as_str() {
            "Fail" => Err(format!("cannot greet {argument}")),
            "Hang" => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(argument)
            }
            _ => Ok(format!("hello {argument}")),
        }
    }
}

#[derive(Clone, Default)]
pub struct InProcessSupervisor;

pub struct TaskWorker {
    stop: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<std::io::Result<()>>,
}

impl WorkerHandle for TaskWorker {
    fn pid(&self) -> Option<u32> {
        None
    }
}

#[async_trait]
impl ProcessSupervisor for InProcessSupervisor {
    type Handle = TaskWorker;

    async fn start(&self, endpoint: &EndpointId, port: u16) -> Result<TaskWorker, SpawnError> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|e| SpawnError::Other(format!("bind {port}: {e}")))?;
        let handler = Arc::new(SampleHandler {
            function: endpoint.function().to_string(),
        });
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(serve(listener, handler, async {
            let _ = stopped.await;
        }));
        Ok(TaskWorker {
            stop: Some(stop),
            task,
        })
    }

    async fn terminate(&self, handle: &mut TaskWorker) -> Result<(), TerminateError> {
        match handle.stop.take() {
            Some(stop) => {
                let _ = stop.send(());
            }
            None => {
                return Err(TerminateError::NotRunning {
                    pid: None,
                    status: "already stopped".to_string(),
                });
            }
        }
        (&mut handle.task)
            .await
            .map_err(|e| TerminateError::Io(std::io::Error::other(e)))??;
        Ok(())
    }
}
