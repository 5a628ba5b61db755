//! JSON-RPC client layer for EVM nodes.
//!
//! The crate is split between the transport boundary ([`Client`]), the typed
//! call catalog ([`calls`]) and the direct client ([`EthJsonRpcClient`]) that
//! sends calls one request (or one explicit batch) at a time. Coalescing of
//! concurrent calls lives in the `evm-rpc-coalescer` crate, which builds on
//! the same [`Client`] trait and call catalog.

pub mod calls;
mod client;
pub mod error;
pub mod types;

#[cfg(feature = "reqwest")]
pub mod reqwest;

pub use client::{Client, EthJsonRpcClient};
pub use error::{JsonRpcError, JsonRpcResult};
pub use jsonrpc_core::{Call, Id, MethodCall, Output, Params, Request, Response, Version};
