use std::time::Duration;

use ethereum_types::{H160, U256};
use evm_rpc_client::types::{BlockNumber, Bytes};
use evm_rpc_client::JsonRpcError;
use evm_rpc_coalescer::{CallError, CoalesceConfig, CoalescingClient};
use jsonrpc_core::{Error, ErrorCode, Failure, Id, Output, Request, Response, Version};

mod support;

use support::RecordingClient;

fn address(byte: u8) -> H160 {
    H160::repeat_byte(byte)
}

fn client_with_config(
    transport: RecordingClient,
    config: CoalesceConfig,
) -> CoalescingClient<RecordingClient> {
    CoalescingClient::new(transport, config)
}

fn default_client(transport: RecordingClient) -> CoalescingClient<RecordingClient> {
    client_with_config(transport, CoalesceConfig::default())
}

#[tokio::test]
async fn calls_in_one_window_travel_in_one_batch() {
    let transport = RecordingClient::canned();
    let client = default_client(transport.clone());

    let (chain_id, block_number, balance) = tokio::join!(
        client.get_chain_id(),
        client.get_block_number(),
        client.get_balance(address(0xaa), BlockNumber::Latest),
    );

    assert_eq!(chain_id.unwrap(), 1);
    assert_eq!(block_number.unwrap(), 42);
    assert_eq!(balance.unwrap(), U256::from(100u64));
    assert_eq!(support::request_shapes(&transport.requests()), vec![Some(3)]);
}

#[tokio::test]
async fn reordered_batch_responses_reach_their_own_callers() {
    let transport = RecordingClient::new(|request| {
        let Request::Batch(batch_calls) = request else {
            panic!("expected batch request, got {request:?}");
        };
        // Answer each balance from its address byte, then deliver the
        // outputs in reverse order: correlation ids must still route them.
        let mut outputs: Vec<Output> = batch_calls
            .iter()
            .map(|call| {
                let param = support::first_param(call).unwrap();
                let byte = param.as_str().unwrap()[2..4].to_string();
                support::success(
                    support::expect_method_call(call).id.clone(),
                    serde_json::json!(format!("0x{byte}")),
                )
            })
            .collect();
        outputs.reverse();
        Ok(Response::Batch(outputs))
    });
    let client = default_client(transport.clone());

    let (a, b, c) = tokio::join!(
        client.get_balance(address(0x0a), BlockNumber::Latest),
        client.get_balance(address(0x0b), BlockNumber::Latest),
        client.get_balance(address(0x0c), BlockNumber::Latest),
    );

    assert_eq!(a.unwrap(), U256::from(0x0au64));
    assert_eq!(b.unwrap(), U256::from(0x0bu64));
    assert_eq!(c.unwrap(), U256::from(0x0cu64));
    assert_eq!(support::request_shapes(&transport.requests()), vec![Some(3)]);
}

#[tokio::test]
async fn duplicate_call_is_served_from_cache() {
    let transport = RecordingClient::canned();
    let client = default_client(transport.clone());

    // getBalance(A), getBalance(B), getBalance(A): one send, two distinct
    // wire calls, the duplicate A attaches to the first A's future.
    let (first_a, b, second_a) = tokio::join!(
        client.get_balance(address(0xaa), BlockNumber::Latest),
        client.get_balance(address(0xbb), BlockNumber::Latest),
        client.get_balance(address(0xaa), BlockNumber::Latest),
    );

    let first_a = first_a.unwrap();
    assert_eq!(first_a, second_a.unwrap());
    assert_eq!(b.unwrap(), U256::from(100u64));
    assert_eq!(support::request_shapes(&transport.requests()), vec![Some(2)]);
}

#[tokio::test]
async fn caching_off_keeps_duplicates_in_the_batch() {
    let transport = RecordingClient::canned();
    let client = client_with_config(
        transport.clone(),
        CoalesceConfig {
            caching: false,
            ..Default::default()
        },
    );

    let (first_a, b, second_a) = tokio::join!(
        client.get_balance(address(0xaa), BlockNumber::Latest),
        client.get_balance(address(0xbb), BlockNumber::Latest),
        client.get_balance(address(0xaa), BlockNumber::Latest),
    );

    assert!(first_a.is_ok() && b.is_ok() && second_a.is_ok());
    assert_eq!(support::request_shapes(&transport.requests()), vec![Some(3)]);
}

#[tokio::test]
async fn batching_off_sends_one_request_per_call() {
    let transport = RecordingClient::canned();
    let client = client_with_config(
        transport.clone(),
        CoalesceConfig {
            batching: false,
            ..Default::default()
        },
    );

    let (first_a, b, second_a) = tokio::join!(
        client.get_balance(address(0xaa), BlockNumber::Latest),
        client.get_balance(address(0xbb), BlockNumber::Latest),
        client.get_balance(address(0xaa), BlockNumber::Latest),
    );

    assert!(first_a.is_ok() && b.is_ok() && second_a.is_ok());
    // Three singles; with batching off the cache is never consulted, so the
    // duplicate A is a wire call of its own.
    assert_eq!(
        support::request_shapes(&transport.requests()),
        vec![None, None, None]
    );

    // Still no memoization for later identical calls.
    client
        .get_balance(address(0xaa), BlockNumber::Latest)
        .await
        .unwrap();
    assert_eq!(transport.request_count(), 4);
}

#[tokio::test]
async fn cache_spans_sequential_batches_within_one_scope() {
    let transport = RecordingClient::canned();
    let client = default_client(transport.clone());

    let first = client
        .get_balance(address(0xaa), BlockNumber::Latest)
        .await
        .unwrap();
    // Recurs in a later window of the same scope: computed once, reused.
    let second = client
        .get_balance(address(0xaa), BlockNumber::Latest)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn item_error_rejects_only_its_own_caller() {
    let bad = serde_json::to_value(address(0xbb)).unwrap();
    let transport = RecordingClient::new(move |request| {
        let Request::Batch(batch_calls) = request else {
            panic!("expected batch request, got {request:?}");
        };
        let outputs = batch_calls
            .iter()
            .map(|call| {
                if support::first_param(call).as_ref() == Some(&bad) {
                    Output::Failure(Failure {
                        jsonrpc: Some(Version::V2),
                        error: Error {
                            code: ErrorCode::ServerError(-32000),
                            message: "execution reverted".to_string(),
                            data: None,
                        },
                        id: support::expect_method_call(call).id.clone(),
                    })
                } else {
                    support::answer_call(call)
                }
            })
            .collect();
        Ok(Response::Batch(outputs))
    });
    let client = default_client(transport.clone());

    let (a, b, c) = tokio::join!(
        client.get_balance(address(0xaa), BlockNumber::Latest),
        client.get_balance(address(0xbb), BlockNumber::Latest),
        client.get_balance(address(0xcc), BlockNumber::Latest),
    );

    assert!(a.is_ok());
    assert!(c.is_ok());
    assert_eq!(
        b.unwrap_err(),
        CallError::Rpc {
            code: -32000,
            message: "execution reverted".to_string(),
        }
    );
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn transport_failure_rejects_every_call_in_the_batch() {
    let transport = RecordingClient::new(|_| {
        Err(JsonRpcError::Transport("connection reset by peer".to_string()))
    });
    let client = default_client(transport.clone());

    let (a, b, c) = tokio::join!(
        client.get_balance(address(0xaa), BlockNumber::Latest),
        client.get_balance(address(0xbb), BlockNumber::Latest),
        client.get_chain_id(),
    );

    let a = a.unwrap_err();
    assert!(matches!(&a, CallError::Transport(text) if text.contains("connection reset")));
    assert_eq!(a, b.unwrap_err());
    assert_eq!(a, c.unwrap_err());
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn size_cap_seals_the_batch_early() {
    let transport = RecordingClient::canned();
    let client = client_with_config(
        transport.clone(),
        CoalesceConfig {
            window: Duration::from_secs(60),
            max_batch_size: 2,
            ..Default::default()
        },
    );

    // Completes well before the 60s window: the cap seals and dispatches.
    let (a, b) = tokio::join!(
        client.get_balance(address(0xaa), BlockNumber::Latest),
        client.get_balance(address(0xbb), BlockNumber::Latest),
    );
    assert!(a.is_ok() && b.is_ok());

    // The sealed batch admits nothing further; these open a new one.
    let (c, d) = tokio::join!(
        client.get_balance(address(0xcc), BlockNumber::Latest),
        client.get_balance(address(0xdd), BlockNumber::Latest),
    );
    assert!(c.is_ok() && d.is_ok());

    assert_eq!(
        support::request_shapes(&transport.requests()),
        vec![Some(2), Some(2)]
    );
}

#[tokio::test]
async fn size_cap_of_one_dispatches_each_call_immediately() {
    let transport = RecordingClient::canned();
    let client = client_with_config(
        transport.clone(),
        CoalesceConfig {
            window: Duration::from_secs(60),
            max_batch_size: 1,
            ..Default::default()
        },
    );

    // A cap of one fills the batch on admission; the call must settle
    // without waiting out the window.
    let balance = tokio::time::timeout(
        Duration::from_millis(500),
        client.get_balance(address(0xaa), BlockNumber::Latest),
    )
    .await
    .expect("call should dispatch at admission, not after the window")
    .unwrap();
    assert_eq!(balance, U256::from(100u64));

    let code = tokio::time::timeout(
        Duration::from_millis(500),
        client.get_code(address(0xaa), BlockNumber::Latest),
    )
    .await
    .expect("call should dispatch at admission, not after the window")
    .unwrap();
    assert_eq!(code, "0x6001");

    assert_eq!(
        support::request_shapes(&transport.requests()),
        vec![Some(1), Some(1)]
    );
}

#[tokio::test]
async fn flush_now_dispatches_the_open_batch() {
    let transport = RecordingClient::canned();
    let client = client_with_config(
        transport.clone(),
        CoalesceConfig {
            window: Duration::from_secs(60),
            ..Default::default()
        },
    );

    let first = {
        let client = client.clone();
        tokio::spawn(async move { client.get_balance(address(0xaa), BlockNumber::Latest).await })
    };
    let second = {
        let client = client.clone();
        tokio::spawn(async move { client.get_balance(address(0xbb), BlockNumber::Latest).await })
    };

    // Let both tasks get admitted to the open batch.
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    client.flush_now().await;

    assert!(first.await.unwrap().is_ok());
    assert!(second.await.unwrap().is_ok());
    assert_eq!(support::request_shapes(&transport.requests()), vec![Some(2)]);
}

#[tokio::test]
async fn non_batchable_call_bypasses_the_scheduler() {
    let transport = RecordingClient::canned();
    let client = default_client(transport.clone());

    let (balance_a, tx_hash, balance_b) = tokio::join!(
        client.get_balance(address(0xaa), BlockNumber::Latest),
        client.send_raw_transaction_bytes(&[0x01, 0x02, 0x03]),
        client.get_balance(address(0xbb), BlockNumber::Latest),
    );

    assert!(balance_a.is_ok() && balance_b.is_ok());
    assert!(!tx_hash.unwrap().is_zero());

    let mut shapes = support::request_shapes(&transport.requests());
    shapes.sort();
    // One immediate single for the raw transaction, one batch for the reads.
    assert_eq!(shapes, vec![None, Some(2)]);
}

#[tokio::test]
async fn contract_handle_shares_the_scope() {
    let transport = RecordingClient::canned();
    let client = default_client(transport.clone());
    let handle = client.contract(address(0xcc));

    let (handle_code, direct_code, handle_balance) = tokio::join!(
        handle.code(BlockNumber::Latest),
        client.get_code(address(0xcc), BlockNumber::Latest),
        handle.balance(BlockNumber::Latest),
    );

    // The handle's code call and the equivalent top-level call share one
    // cache entry; the balance rides in the same batch.
    assert_eq!(handle_code.unwrap(), direct_code.unwrap());
    assert!(handle_balance.is_ok());
    assert_eq!(support::request_shapes(&transport.requests()), vec![Some(2)]);
}

#[tokio::test]
async fn contract_call_goes_through_the_pipeline() {
    let transport = RecordingClient::canned();
    let client = default_client(transport.clone());
    let handle = client.contract(address(0xcc));

    let (first, second) = tokio::join!(
        handle.call(Bytes(vec![0x70, 0xa0, 0x82, 0x31]), BlockNumber::Latest),
        handle.call(Bytes(vec![0x70, 0xa0, 0x82, 0x31]), BlockNumber::Latest),
    );

    assert_eq!(first.unwrap(), second.unwrap());
    assert_eq!(support::request_shapes(&transport.requests()), vec![Some(1)]);
}

#[tokio::test]
async fn single_response_to_one_element_batch_is_accepted() {
    let transport = RecordingClient::new(|request| {
        let Request::Batch(batch_calls) = request else {
            panic!("expected batch request, got {request:?}");
        };
        assert_eq!(batch_calls.len(), 1);
        Ok(Response::Single(support::answer_call(&batch_calls[0])))
    });
    let client = default_client(transport.clone());

    let balance = client
        .get_balance(address(0xaa), BlockNumber::Latest)
        .await
        .unwrap();

    assert_eq!(balance, U256::from(100u64));
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn missing_response_settles_the_call_with_an_error() {
    let dropped = serde_json::to_value(address(0xbb)).unwrap();
    let transport = RecordingClient::new(move |request| {
        let Request::Batch(batch_calls) = request else {
            panic!("expected batch request, got {request:?}");
        };
        let outputs = batch_calls
            .iter()
            .filter(|&call| support::first_param(call).as_ref() != Some(&dropped))
            .map(support::answer_call)
            .collect();
        Ok(Response::Batch(outputs))
    });
    let client = default_client(transport.clone());

    let (a, b) = tokio::join!(
        client.get_balance(address(0xaa), BlockNumber::Latest),
        client.get_balance(address(0xbb), BlockNumber::Latest),
    );

    assert!(a.is_ok());
    assert!(matches!(b.unwrap_err(), CallError::MissingResponse(_)));
}

#[tokio::test]
async fn responses_with_stray_ids_are_dropped() {
    let renamed = serde_json::to_value(address(0xbb)).unwrap();
    let transport = RecordingClient::new(move |request| {
        let Request::Batch(batch_calls) = request else {
            panic!("expected batch request, got {request:?}");
        };
        // Answer the 0xbb call under a string id and append an output for an
        // id that was never assigned; neither correlates to a waiting call.
        let mut outputs: Vec<Output> = batch_calls
            .iter()
            .map(|call| {
                if support::first_param(call).as_ref() == Some(&renamed) {
                    support::success(
                        Id::Str("eth_getBalance".to_string()),
                        serde_json::json!("0x64"),
                    )
                } else {
                    support::answer_call(call)
                }
            })
            .collect();
        outputs.push(support::success(Id::Num(9999), serde_json::json!("0x64")));
        Ok(Response::Batch(outputs))
    });
    let client = default_client(transport.clone());

    let (a, b) = tokio::join!(
        client.get_balance(address(0xaa), BlockNumber::Latest),
        client.get_balance(address(0xbb), BlockNumber::Latest),
    );

    // The sibling settles normally; the caller whose response came back under
    // a foreign id ends up unanswered.
    assert_eq!(a.unwrap(), U256::from(100u64));
    assert!(matches!(b.unwrap_err(), CallError::MissingResponse(_)));
    assert_eq!(transport.request_count(), 1);
}
