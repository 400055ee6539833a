//! iota: hosts user endpoint functions as worker processes and routes calls to them.

mod version;

pub mod bridge;
pub mod build;
pub mod endpoint;
pub mod logging;
pub mod orchestrator;
pub mod port;
pub mod process;
pub mod registry;
pub mod rpc;
pub mod service;
pub mod signal;
pub mod transport;
pub mod worker;

pub use endpoint::{Endpoint, EndpointId, EndpointIdError};
pub use orchestrator::{
    CallArgument, CoordinatorClosed, CoordinatorHandle, InvokeError, OrchestratorConfig,
    ReloadError, ReloadOutcome, ReloadTicket, WorkerSnapshot, spawn_coordinator,
};
pub use process::{ExecutableSupervisor, ProcessSupervisor, SpawnError, TerminateError, WorkerHandle};
pub use rpc::{CallError, RpcConfig, RpcProxy, TransportError};
pub use service::{EndpointService, HealthSnapshot};
pub use version::{IOTA_VERSION, VersionInfo};
pub use worker::{EndpointHandler, WorkerArgs, run_worker};
