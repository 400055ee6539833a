//! Wire protocol types for orchestrator-worker communication.
//!
//! JSON-RPC 1.0 as spoken by Go's `net/rpc/jsonrpc`: every worker exposes a
//! single service method taking one string and returning one string.

use serde::{Deserialize, Serialize};

/// The one method every worker serves.
pub const SERVICE_METHOD: &str = "Iotasvc.ServeHttp";

/// Call from orchestrator to worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    /// Positional arguments. A well-formed call carries exactly one string.
    pub params: Vec<String>,
    pub id: u64,
}

impl RpcRequest {
    pub fn serve_http(id: u64, argument: impl Into<String>) -> Self {
        Self {
            method: SERVICE_METHOD.to_string(),
            params: vec![argument.into()],
            id,
        }
    }

    /// The single string argument, if the request is well-formed.
    pub fn argument(&self) -> Option<&str> {
        match self.params.as_slice() {
            [arg] => Some(arg),
            _ => None,
        }
    }
}

/// Reply from worker to orchestrator.
///
/// Exactly one of `result`/`error` is set; both fields are always present on
/// the wire (`null` when unset).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: u64,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl RpcResponse {
    pub fn ok(id: u64, result: impl Into<String>) -> Self {
        Self {
            id,
            result: Some(result.into()),
            error: None,
        }
    }

    pub fn err(id: u64, error: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Collapse into the function's outcome. A non-empty `error` wins;
    /// `None` means the response carried neither.
    pub fn into_outcome(self) -> Option<Result<String, String>> {
        match (self.result, self.error) {
            (_, Some(error)) if !error.is_empty() => Some(Err(error)),
            (Some(result), _) => Some(Ok(result)),
            (None, _) => None,
        }
    }
}
