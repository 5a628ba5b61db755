//! Request-scoped memoization of in-flight and settled calls.

use std::collections::HashMap;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::CallResult;

/// A memoized call result, shared between every waiter on the same key.
pub(crate) type SharedCall = Shared<BoxFuture<'static, CallResult<Value>>>;

/// Memo table mapping call key to its in-flight or settled result.
///
/// Entries live for the lifetime of the owning scope; there is no eviction.
/// The whole table is discarded when the scope is dropped.
pub(crate) struct ResultCache {
    entries: Mutex<HashMap<String, SharedCall>>,
}

impl ResultCache {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the future memoized under `key`, creating it from `compute` if
    /// absent. `compute` runs at most once per key per scope; concurrent and
    /// later callers attach to the same shared future.
    pub(crate) async fn get_or_compute<F>(&self, key: &str, compute: F) -> SharedCall
    where
        F: FnOnce() -> BoxFuture<'static, CallResult<Value>>,
    {
        let mut entries = self.entries.lock().await;
        if let Some(existing) = entries.get(key) {
            log::trace!("cache hit for {key}");
            return existing.clone();
        }
        let computed = compute().shared();
        entries.insert(key.to_owned(), computed.clone());
        computed
    }
}
