//! Wire bridge between the orchestrator and worker processes.
//!
//! Workers speak JSON-RPC 1.0 over TCP, one JSON object per line, which is what
//! Go's `net/rpc/jsonrpc` produces and consumes.
//!
//! # Architecture
//!
//! - **protocol**: Message types (RpcRequest/RpcResponse)
//! - **codec**: newline-delimited JSON codec for AsyncRead/AsyncWrite

pub mod codec;
pub mod protocol;
