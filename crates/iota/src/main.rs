//! iota server binary.
//!
//! Hosts endpoint workers under the endpoint root and serves the HTTP
//! front-end until SIGINT/SIGTERM, then stops every worker.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use iota::build::BuildConfig;
use iota::orchestrator::{OrchestratorConfig, spawn_coordinator};
use iota::service::EndpointService;
use iota::transport::{ServerConfig, serve};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// HTTP bind host
    #[arg(long, env = "IOTA_HOST", default_value = "0.0.0.0")]
    host: String,

    /// HTTP bind port
    #[arg(long, env = "IOTA_PORT", default_value_t = 8000)]
    port: u16,

    /// Directory holding user sources and built workers
    #[arg(long, env = "IOTA_ENDPOINT_ROOT", default_value = "endpoints")]
    endpoint_root: PathBuf,

    /// First port handed to workers
    #[arg(long, env = "IOTA_PORT_START", default_value_t = iota::port::PORT_START)]
    port_start: u16,

    /// Per-call timeout in seconds; 0 waits forever
    #[arg(long, env = "IOTA_CALL_TIMEOUT_SECS", default_value_t = 30)]
    call_timeout_secs: u64,

    /// Worker connect timeout in milliseconds
    #[arg(long, env = "IOTA_CONNECT_TIMEOUT_MS", default_value_t = 5000)]
    connect_timeout_ms: u64,

    /// Grace period between SIGTERM and SIGKILL when stopping a worker
    #[arg(long, env = "IOTA_TERMINATE_GRACE_SECS", default_value_t = 5)]
    terminate_grace_secs: u64,

    /// Capacity of the coordinator's command queue
    #[arg(long, env = "IOTA_QUEUE_CAPACITY", default_value_t = 256)]
    queue_capacity: usize,

    /// Worker main template
    #[arg(long, env = "IOTA_TEMPLATE", default_value = "templates/endpointmain.go.tmpl")]
    template: PathBuf,

    /// Build script, run as `<script> <user_dir> <package> <main_file>`
    #[arg(long, env = "IOTA_BUILD_SCRIPT", default_value = "scripts/buildendpoint.sh")]
    build_script: PathBuf,
}

impl Cli {
    fn orchestrator_config(&self, endpoint_root: PathBuf) -> OrchestratorConfig {
        let call_timeout = match self.call_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        OrchestratorConfig::new(endpoint_root)
            .with_port_start(self.port_start)
            .with_call_timeout(call_timeout)
            .with_connect_timeout(Duration::from_millis(self.connect_timeout_ms))
            .with_terminate_grace(Duration::from_secs(self.terminate_grace_secs))
            .with_queue_capacity(self.queue_capacity)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    iota::logging::init_tracing();
    let cli = Cli::parse();

    tokio::fs::create_dir_all(&cli.endpoint_root)
        .await
        .with_context(|| format!("creating endpoint root {}", cli.endpoint_root.display()))?;
    let endpoint_root = std::path::absolute(&cli.endpoint_root)
        .with_context(|| format!("resolving endpoint root {}", cli.endpoint_root.display()))?;

    let config = cli.orchestrator_config(endpoint_root.clone());
    tracing::info!(
        version = iota::IOTA_VERSION,
        endpoint_root = %endpoint_root.display(),
        port_start = config.port_start,
        call_timeout = ?config.rpc.call_timeout,
        "Starting iota"
    );

    let coordinator = spawn_coordinator(&config, config.executable_supervisor());
    let build = BuildConfig {
        template_path: cli.template.clone(),
        build_script: cli.build_script.clone(),
    };
    let service = Arc::new(EndpointService::new(coordinator, endpoint_root, build));

    serve(
        ServerConfig {
            host: cli.host.clone(),
            port: cli.port,
        },
        service,
    )
    .await
}
