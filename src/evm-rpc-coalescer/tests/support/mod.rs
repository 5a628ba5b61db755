use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use evm_rpc_client::{Call, Client, JsonRpcResult, Request, Response};
use jsonrpc_core::{Id, MethodCall, Output, Params, Success, Version};
use serde_json::{json, Value};

/// Transport that records every wire request and answers from a scripted
/// closure.
#[derive(Clone)]
pub struct RecordingClient {
    requests: Arc<Mutex<Vec<Request>>>,
    responder: Arc<dyn Fn(&Request) -> JsonRpcResult<Response> + Send + Sync>,
}

impl RecordingClient {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&Request) -> JsonRpcResult<Response> + Send + Sync + 'static,
    {
        let _ = env_logger::builder().is_test(true).try_init();
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            responder: Arc::new(responder),
        }
    }

    /// Transport answering every call with canned per-method values.
    pub fn canned() -> Self {
        Self::new(|request| Ok(answer_request(request)))
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Client for RecordingClient {
    fn send_rpc_request(
        &self,
        request: Request,
    ) -> Pin<Box<dyn Future<Output = JsonRpcResult<Response>> + Send>> {
        self.requests.lock().unwrap().push(request.clone());
        let result = (self.responder)(&request);
        Box::pin(async move { result })
    }
}

/// Answers a request with one canned output per carried call.
pub fn answer_request(request: &Request) -> Response {
    match request {
        Request::Single(call) => Response::Single(answer_call(call)),
        Request::Batch(batch_calls) => {
            Response::Batch(batch_calls.iter().map(answer_call).collect())
        }
    }
}

pub fn answer_call(call: &Call) -> Output {
    let method_call = expect_method_call(call);
    success(method_call.id.clone(), canned_result(&method_call.method))
}

pub fn expect_method_call(call: &Call) -> &MethodCall {
    match call {
        Call::MethodCall(method_call) => method_call,
        other => panic!("unexpected call: {other:?}"),
    }
}

pub fn success(id: Id, result: Value) -> Output {
    Output::Success(Success {
        jsonrpc: Some(Version::V2),
        result,
        id,
    })
}

/// First positional parameter of a call, for matching on addresses.
pub fn first_param(call: &Call) -> Option<Value> {
    match &expect_method_call(call).params {
        Params::Array(values) => values.first().cloned(),
        _ => None,
    }
}

fn canned_result(method: &str) -> Value {
    match method {
        "eth_chainId" => json!("0x1"),
        "eth_blockNumber" => json!("0x2a"),
        "eth_getBalance" => json!("0x64"),
        "eth_getCode" => json!("0x6001"),
        "eth_getTransactionCount" => json!("0x5"),
        "eth_gasPrice" | "eth_maxPriorityFeePerGas" => json!("0x3b9aca00"),
        "eth_call" => {
            json!("0x0000000000000000000000000000000000000000000000000000000000000001")
        }
        "eth_sendRawTransaction" => {
            json!("0x3333333333333333333333333333333333333333333333333333333333333333")
        }
        _ => Value::Null,
    }
}

/// Sizes of recorded requests: `None` for a single request, `Some(n)` for a
/// batch of `n` calls.
pub fn request_shapes(requests: &[Request]) -> Vec<Option<usize>> {
    requests
        .iter()
        .map(|request| match request {
            Request::Single(_) => None,
            Request::Batch(batch_calls) => Some(batch_calls.len()),
        })
        .collect()
}
