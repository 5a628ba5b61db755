//! Typed construction of JSON-RPC calls.
//!
//! Every supported operation has exactly one constructor here which fixes its
//! method name, parameter encoding and batchability. Whether a call may be
//! coalesced into a wire batch is a static property of the operation, decided
//! once at the constructor rather than per invocation.

use ethereum_types::{H160, H256};
use jsonrpc_core::{Call, Id, MethodCall, Params, Version};

use crate::error::JsonRpcResult;
use crate::types::{BlockNumber, EthGetLogsParams, TransactionRequest};

pub const ETH_CHAIN_ID_METHOD: &str = "eth_chainId";
pub const ETH_BLOCK_NUMBER_METHOD: &str = "eth_blockNumber";
pub const ETH_GET_BALANCE_METHOD: &str = "eth_getBalance";
pub const ETH_GAS_PRICE_METHOD: &str = "eth_gasPrice";
pub const ETH_MAX_PRIORITY_FEE_PER_GAS_METHOD: &str = "eth_maxPriorityFeePerGas";
pub const ETH_GET_CODE_METHOD: &str = "eth_getCode";
pub const ETH_GET_TRANSACTION_COUNT_METHOD: &str = "eth_getTransactionCount";
pub const ETH_GET_BLOCK_BY_NUMBER_METHOD: &str = "eth_getBlockByNumber";
pub const ETH_GET_TRANSACTION_RECEIPT_METHOD: &str = "eth_getTransactionReceipt";
pub const ETH_GET_TRANSACTION_BY_HASH_METHOD: &str = "eth_getTransactionByHash";
pub const ETH_CALL_METHOD: &str = "eth_call";
pub const ETH_GET_LOGS_METHOD: &str = "eth_getLogs";

// State-changing methods; these are never coalesced or cached.
pub const ETH_SEND_RAW_TRANSACTION_METHOD: &str = "eth_sendRawTransaction";

macro_rules! params_array {
    ($($items:expr),*) => {
        Params::Array(vec![$(serde_json::to_value($items)?, )*])
    };
}

/// A single JSON-RPC invocation, built before it is scheduled or sent.
#[derive(Debug, Clone)]
pub struct RpcCall {
    /// JSON-RPC method name.
    pub method: &'static str,
    /// Encoded positional parameters.
    pub params: Params,
    /// Whether the call may be coalesced into a wire batch and memoized.
    pub batchable: bool,
}

impl RpcCall {
    fn query(method: &'static str, params: Params) -> Self {
        Self {
            method,
            params,
            batchable: true,
        }
    }

    fn update(method: &'static str, params: Params) -> Self {
        Self {
            method,
            params,
            batchable: false,
        }
    }

    /// Turns the call into a wire-level method call correlated by `id`.
    pub fn into_method_call(self, id: Id) -> Call {
        Call::MethodCall(MethodCall {
            jsonrpc: Some(Version::V2),
            method: self.method.to_string(),
            params: self.params,
            id,
        })
    }
}

pub fn chain_id() -> JsonRpcResult<RpcCall> {
    Ok(RpcCall::query(ETH_CHAIN_ID_METHOD, Params::Array(vec![])))
}

pub fn block_number() -> JsonRpcResult<RpcCall> {
    Ok(RpcCall::query(ETH_BLOCK_NUMBER_METHOD, Params::Array(vec![])))
}

pub fn get_balance(address: H160, block: BlockNumber) -> JsonRpcResult<RpcCall> {
    Ok(RpcCall::query(
        ETH_GET_BALANCE_METHOD,
        params_array!(address, block),
    ))
}

pub fn gas_price() -> JsonRpcResult<RpcCall> {
    Ok(RpcCall::query(ETH_GAS_PRICE_METHOD, Params::Array(vec![])))
}

pub fn max_priority_fee_per_gas() -> JsonRpcResult<RpcCall> {
    Ok(RpcCall::query(
        ETH_MAX_PRIORITY_FEE_PER_GAS_METHOD,
        Params::Array(vec![]),
    ))
}

pub fn get_code(address: H160, block: BlockNumber) -> JsonRpcResult<RpcCall> {
    Ok(RpcCall::query(
        ETH_GET_CODE_METHOD,
        params_array!(address, block),
    ))
}

pub fn get_transaction_count(address: H160, block: BlockNumber) -> JsonRpcResult<RpcCall> {
    Ok(RpcCall::query(
        ETH_GET_TRANSACTION_COUNT_METHOD,
        params_array!(address, block),
    ))
}

/// `full` selects between transaction hashes and full transaction bodies.
pub fn get_block_by_number(block: BlockNumber, full: bool) -> JsonRpcResult<RpcCall> {
    Ok(RpcCall::query(
        ETH_GET_BLOCK_BY_NUMBER_METHOD,
        params_array!(block, full),
    ))
}

pub fn get_transaction_receipt(hash: H256) -> JsonRpcResult<RpcCall> {
    Ok(RpcCall::query(
        ETH_GET_TRANSACTION_RECEIPT_METHOD,
        params_array!(hash),
    ))
}

pub fn get_transaction_by_hash(hash: H256) -> JsonRpcResult<RpcCall> {
    Ok(RpcCall::query(
        ETH_GET_TRANSACTION_BY_HASH_METHOD,
        params_array!(hash),
    ))
}

pub fn eth_call(request: &TransactionRequest, block: BlockNumber) -> JsonRpcResult<RpcCall> {
    Ok(RpcCall::query(
        ETH_CALL_METHOD,
        params_array!(request, block),
    ))
}

pub fn get_logs(params: &EthGetLogsParams) -> JsonRpcResult<RpcCall> {
    Ok(RpcCall::query(ETH_GET_LOGS_METHOD, params_array!(params)))
}

pub fn send_raw_transaction(transaction: &[u8]) -> JsonRpcResult<RpcCall> {
    let transaction = format!("0x{}", hex::encode(transaction));
    Ok(RpcCall::update(
        ETH_SEND_RAW_TRANSACTION_METHOD,
        params_array!(transaction),
    ))
}
