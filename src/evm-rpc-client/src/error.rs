//! Error types for the JSON-RPC client.

use thiserror::Error;

/// Result type for the JSON-RPC client.
pub type JsonRpcResult<T> = std::result::Result<T, JsonRpcError>;

/// Error type for the JSON-RPC client.
#[derive(Debug, Error)]
pub enum JsonRpcError {
    /// Error while parsing a JSON payload.
    #[error("Invalid JSON response: {0}")]
    Json(#[from] serde_json::Error),
    /// The node processed the call and answered with an error object.
    #[error("RPC error {}: {}", .0.code.code(), .0.message)]
    Rpc(jsonrpc_core::Error),
    /// HTTP error.
    #[cfg(feature = "reqwest")]
    #[error("HTTP error {code}: {text}")]
    Http {
        /// HTTP status code.
        code: reqwest::StatusCode,
        /// HTTP response text.
        text: String,
    },
    /// Reqwest error.
    #[cfg(feature = "reqwest")]
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    /// The transport failed to deliver the request or receive the response.
    #[error("Transport error: {0}")]
    Transport(String),
    /// A single request was sent, but a batch response was received.
    #[error("unexpected batch response: expected single but got batch")]
    UnexpectedBatch,
    /// A batch request was sent, but the number of responses differs from the
    /// number of requests.
    #[error("unexpected response: expected {expected} but got {actual}")]
    UnexpectedResultsAmount { expected: usize, actual: usize },
}

impl From<jsonrpc_core::Error> for JsonRpcError {
    fn from(err: jsonrpc_core::Error) -> Self {
        JsonRpcError::Rpc(err)
    }
}
