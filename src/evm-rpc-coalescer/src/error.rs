//! Error types delivered to individual coalesced calls.

use evm_rpc_client::JsonRpcError;
use thiserror::Error;

/// Result type for calls routed through the coalescing pipeline.
pub type CallResult<T> = std::result::Result<T, CallError>;

/// Error settled into a single pending call.
///
/// `Clone` because one settled result may be observed by every cached waiter
/// attached to the same key.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    /// The wire request carrying this call failed as a whole; every call in
    /// the same batch receives the same error.
    #[error("transport error: {0}")]
    Transport(String),
    /// The node answered this call with an error object; sibling calls in the
    /// same batch are unaffected.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    /// The result payload could not be decoded.
    #[error("invalid JSON in RPC response: {0}")]
    Json(String),
    /// The batch response carried no entry for this call's correlation id.
    #[error("no response received for request id {0}")]
    MissingResponse(u64),
}

impl From<jsonrpc_core::Error> for CallError {
    fn from(err: jsonrpc_core::Error) -> Self {
        CallError::Rpc {
            code: err.code.code(),
            message: err.message,
        }
    }
}

impl From<serde_json::Error> for CallError {
    fn from(err: serde_json::Error) -> Self {
        CallError::Json(err.to_string())
    }
}

impl From<JsonRpcError> for CallError {
    fn from(err: JsonRpcError) -> Self {
        match err {
            JsonRpcError::Rpc(error) => error.into(),
            JsonRpcError::Json(error) => CallError::Json(error.to_string()),
            other => CallError::Transport(other.to_string()),
        }
    }
}
