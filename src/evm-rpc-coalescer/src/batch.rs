//! Coalescing scheduler and batch dispatcher.
//!
//! Calls admitted while a batch is open are sealed together and sent as one
//! wire-level batch request. A batch is sealed when its collection window
//! elapses, when it reaches the configured size cap, or on an explicit
//! [`Dispatcher::flush_now`]. Results are fanned back to the individual
//! waiters by correlation id, never by position.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use evm_rpc_client::calls::RpcCall;
use evm_rpc_client::Client;
use jsonrpc_core::{Id, Output, Request, Response};
use serde_json::Value;
use tokio::sync::{oneshot, Mutex};

use crate::config::CoalesceConfig;
use crate::error::{CallError, CallResult};

/// One admitted call waiting for its batch to settle.
struct PendingCall {
    call: RpcCall,
    cache_key: String,
    tx: oneshot::Sender<CallResult<Value>>,
}

/// Scheduling state of one scope. Dispatch happens between sealing and
/// demultiplexing, during which the state is already `Idle` again so that a
/// late call opens a fresh batch instead of joining a sealed one.
enum BatchState {
    Idle,
    Collecting {
        calls: Vec<PendingCall>,
        generation: u64,
    },
}

struct DispatchInner<C: Client + 'static> {
    client: C,
    window: Duration,
    max_batch_size: usize,
    state: Mutex<BatchState>,
    next_id: AtomicU64,
    next_generation: AtomicU64,
}

/// Accumulates calls into the open batch of one scope and sends each sealed
/// batch as exactly one wire request.
pub(crate) struct Dispatcher<C: Client + 'static> {
    inner: Arc<DispatchInner<C>>,
}

impl<C: Client + 'static> Clone for Dispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Client + 'static> Dispatcher<C> {
    pub(crate) fn new(client: C, config: &CoalesceConfig) -> Self {
        Self {
            inner: Arc::new(DispatchInner {
                client,
                window: config.window,
                max_batch_size: config.max_batch_size.max(1),
                state: Mutex::new(BatchState::Idle),
                next_id: AtomicU64::new(0),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Admits `call` into the open batch, opening one if none is open. The
    /// size cap applies from the first admission on; a batch that is still
    /// below the cap after opening arms its window timer. The returned
    /// receiver settles when the containing batch has been dispatched and
    /// demultiplexed.
    pub(crate) async fn schedule(
        &self,
        call: RpcCall,
        cache_key: String,
    ) -> oneshot::Receiver<CallResult<Value>> {
        let (tx, rx) = oneshot::channel();
        let pending = PendingCall {
            call,
            cache_key,
            tx,
        };

        let sealed = {
            let mut state = self.inner.state.lock().await;
            match std::mem::replace(&mut *state, BatchState::Idle) {
                BatchState::Idle => {
                    let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
                    log::trace!("opening batch generation {generation}");
                    let calls = vec![pending];
                    if calls.len() >= self.inner.max_batch_size {
                        // A cap of one fills the batch at open; no timer needed.
                        log::trace!("batch generation {generation} reached size cap, sealing");
                        Some(calls)
                    } else {
                        *state = BatchState::Collecting { calls, generation };
                        self.arm_window(generation);
                        None
                    }
                }
                BatchState::Collecting {
                    mut calls,
                    generation,
                } => {
                    calls.push(pending);
                    log::trace!(
                        "admitted call into batch generation {generation} ({} pending)",
                        calls.len()
                    );
                    if calls.len() >= self.inner.max_batch_size {
                        log::trace!("batch generation {generation} reached size cap, sealing");
                        Some(calls)
                    } else {
                        *state = BatchState::Collecting { calls, generation };
                        None
                    }
                }
            }
        };

        if let Some(calls) = sealed {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.dispatch(calls).await });
        }

        rx
    }

    /// Seals and dispatches the currently open batch, if any.
    pub(crate) async fn flush_now(&self) {
        let calls = {
            let mut state = self.inner.state.lock().await;
            match std::mem::replace(&mut *state, BatchState::Idle) {
                BatchState::Collecting { calls, .. } => calls,
                BatchState::Idle => return,
            }
        };
        self.inner.dispatch(calls).await;
    }

    /// Sends one call outside the batching pipeline, one wire request per
    /// invocation. Used for non-batchable operations and when batching is
    /// disabled.
    pub(crate) async fn send_direct(&self, call: RpcCall) -> CallResult<Value> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let request = Request::Single(call.into_method_call(Id::Num(id)));
        log::trace!("sending direct request id {id}");

        let response = self
            .inner
            .client
            .send_rpc_request(request)
            .await
            .map_err(|err| CallError::Transport(err.to_string()))?;

        match response {
            Response::Single(output) => split_output(output).1,
            Response::Batch(_) => Err(CallError::Transport(
                "unexpected batch response to a single request".to_string(),
            )),
        }
    }

    /// Arms the collection window for batch `generation`. The timer flushes
    /// only its own generation; a batch sealed earlier by the size cap or an
    /// explicit flush leaves the timer to expire without effect.
    fn arm_window(&self, generation: u64) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(inner.window).await;
            let calls = {
                let mut state = inner.state.lock().await;
                match std::mem::replace(&mut *state, BatchState::Idle) {
                    BatchState::Collecting {
                        calls,
                        generation: current,
                    } if current == generation => calls,
                    other => {
                        *state = other;
                        return;
                    }
                }
            };
            inner.dispatch(calls).await;
        });
    }
}

impl<C: Client + 'static> DispatchInner<C> {
    /// Sends one sealed batch as a single wire request and settles every
    /// pending call from the correlated responses.
    async fn dispatch(&self, calls: Vec<PendingCall>) {
        if calls.is_empty() {
            return;
        }

        let mut waiting: HashMap<u64, oneshot::Sender<CallResult<Value>>> =
            HashMap::with_capacity(calls.len());
        let mut wire_calls = Vec::with_capacity(calls.len());
        for pending in calls {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            log::trace!("call {} assigned correlation id {id}", pending.cache_key);
            wire_calls.push(pending.call.into_method_call(Id::Num(id)));
            waiting.insert(id, pending.tx);
        }

        let batch_size = waiting.len();
        log::debug!("dispatching batch of {batch_size} call(s)");
        let response = self
            .client
            .send_rpc_request(Request::Batch(wire_calls))
            .await;

        match response {
            Err(err) => {
                // The batch send itself failed: every call in it fails alike.
                let err = CallError::Transport(err.to_string());
                log::warn!("batch send failed: {err}");
                for tx in waiting.into_values() {
                    let _ = tx.send(Err(err.clone()));
                }
            }
            Ok(Response::Single(output)) if batch_size == 1 => {
                // Some services answer a one-element batch with a single response.
                let (_, result) = split_output(output);
                if let Some(tx) = waiting.into_values().next() {
                    let _ = tx.send(result);
                }
            }
            Ok(Response::Single(_)) => {
                let err = CallError::Transport(format!(
                    "single response to a batch of {batch_size} requests"
                ));
                log::warn!("{err}");
                for tx in waiting.into_values() {
                    let _ = tx.send(Err(err.clone()));
                }
            }
            Ok(Response::Batch(outputs)) => {
                for output in outputs {
                    let (id, result) = split_output(output);
                    let Some(id) = numeric_id(&id) else {
                        log::warn!("dropping response with non-numeric id {id:?}");
                        continue;
                    };
                    match waiting.remove(&id) {
                        // A send error means the waiter is gone; the call was
                        // admitted, so it settles with its batch regardless.
                        Some(tx) => {
                            let _ = tx.send(result);
                        }
                        None => log::warn!("dropping response for unknown id {id}"),
                    }
                }
                for (id, tx) in waiting {
                    log::warn!("no response received for id {id}");
                    let _ = tx.send(Err(CallError::MissingResponse(id)));
                }
            }
        }
    }
}

/// Awaits a scheduled call's settlement, mapping a dropped dispatcher to a
/// transport error.
pub(crate) async fn await_settled(rx: oneshot::Receiver<CallResult<Value>>) -> CallResult<Value> {
    match rx.await {
        Ok(result) => result,
        Err(_) => Err(CallError::Transport(
            "batch dispatcher dropped the call before settling it".to_string(),
        )),
    }
}

fn split_output(output: Output) -> (Id, CallResult<Value>) {
    match output {
        Output::Success(success) => (success.id, Ok(success.result)),
        Output::Failure(failure) => (failure.id, Err(failure.error.into())),
    }
}

fn numeric_id(id: &Id) -> Option<u64> {
    match id {
        Id::Num(id) => Some(*id),
        _ => None,
    }
}
