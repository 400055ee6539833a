//! Sample endpoint worker written in Rust: `Hi(name) -> "hello <name>"`.
//!
//! Install it as `<root>/<owner>/f/<package>/endpoint` to serve it without a
//! Go toolchain.

use std::sync::Arc;

use clap::Parser;
use iota::worker::{WorkerArgs, run_worker};

fn hi(name: String) -> Result<String, String> {
    if name.is_empty() {
        return Err("name must not be empty".to_string());
    }
    Ok(format!("hello {name}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    iota::logging::init_tracing();
    let args = WorkerArgs::parse();
    run_worker(Arc::new(hi), args).await?;
    Ok(())
}
