//! Call batching and request-scoped caching in front of a JSON-RPC client.
//!
//! Resolving one query against an EVM node fans out into many independent
//! calls (balances, codes, receipts, contract reads). Sent naively, each call
//! is its own round trip. This crate puts a transparent pipeline between the
//! typed operation surface and the transport:
//!
//! - calls issued while a batch is open are coalesced into a single
//!   wire-level batch request, sealed when a bounded collection window
//!   elapses, when the batch reaches its size cap, or on an explicit
//!   [`CoalescingClient::flush_now`];
//! - identical calls within one scope are computed once and their result is
//!   memoized for the remainder of the scope's lifetime;
//! - results and errors are fanned back to individual callers by correlation
//!   id, so one failing call never affects its batch siblings, while a failed
//!   batch send fails every call it carried.
//!
//! [`CoalescingClient`] exposes the same operations as the direct
//! `EthJsonRpcClient`, so resolvers use it as a drop-in replacement. Both
//! stages can be switched off independently through [`CoalesceConfig`]; with
//! batching off every call goes straight to the transport. State-changing
//! operations bypass the pipeline unconditionally.
//!
//! Each [`CoalescingClient`] owns one scope. Scopes share nothing with each
//! other; the transport behind them may be pooled freely.

mod batch;
mod cache;
mod client;
pub mod config;
pub mod error;
pub mod key;

pub use client::{CoalescingClient, ContractHandle};
pub use config::CoalesceConfig;
pub use error::{CallError, CallResult};
