use std::sync::Arc;

use ethereum_types::{H160, H256, U64, U256};
use evm_rpc_client::calls::{self, RpcCall};
use evm_rpc_client::types::{
    Block, BlockNumber, Bytes, EthGetLogsParams, LogEntry, Transaction, TransactionReceipt,
    TransactionRequest,
};
use evm_rpc_client::{Client, JsonRpcResult};
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::batch::{await_settled, Dispatcher};
use crate::cache::ResultCache;
use crate::config::CoalesceConfig;
use crate::error::CallResult;
use crate::key::derive_key;

/// Drop-in replacement for the direct client that coalesces and memoizes
/// batchable calls within one request scope.
///
/// One instance owns one scope: its cache and open batch are shared by every
/// clone and by every [`ContractHandle`] created from it, and discarded
/// together when the last clone is dropped. Batchable calls issued while a
/// batch is open travel in one wire request; identical calls are computed
/// once per scope. Non-batchable calls (and every call when batching is
/// disabled) go straight to the transport, one request each.
pub struct CoalescingClient<C: Client + 'static> {
    dispatcher: Dispatcher<C>,
    cache: Arc<ResultCache>,
    batching: bool,
    caching: bool,
}

impl<C: Client + 'static> Clone for CoalescingClient<C> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            cache: Arc::clone(&self.cache),
            batching: self.batching,
            caching: self.caching,
        }
    }
}

impl<C: Client + 'static> CoalescingClient<C> {
    /// Creates a new scope on top of the given transport.
    pub fn new(client: C, config: CoalesceConfig) -> Self {
        Self {
            dispatcher: Dispatcher::new(client, &config),
            cache: Arc::new(ResultCache::new()),
            batching: config.batching,
            caching: config.caching,
        }
    }

    /// Seals and dispatches the currently open batch, if any. Callers that
    /// know their burst of calls is complete can use this instead of waiting
    /// for the collection window to elapse.
    pub async fn flush_now(&self) {
        self.dispatcher.flush_now().await;
    }

    /// Returns a handle whose operations target one contract address and are
    /// coalesced and cached together with calls made on this client.
    pub fn contract(&self, address: H160) -> ContractHandle<C> {
        ContractHandle {
            client: self.clone(),
            address,
        }
    }

    /// Returns chain id.
    pub async fn get_chain_id(&self) -> CallResult<u64> {
        self.call_typed::<U64>(calls::chain_id())
            .await
            .map(|v| v.as_u64())
    }

    /// Returns chain block number.
    pub async fn get_block_number(&self) -> CallResult<u64> {
        self.call_typed::<U64>(calls::block_number())
            .await
            .map(|v| v.as_u64())
    }

    /// Returns balance of the address.
    pub async fn get_balance(&self, address: H160, block: BlockNumber) -> CallResult<U256> {
        self.call_typed(calls::get_balance(address, block)).await
    }

    /// Returns the gas price.
    pub async fn gas_price(&self) -> CallResult<U256> {
        self.call_typed(calls::gas_price()).await
    }

    /// Returns the max priority fee per gas.
    pub async fn max_priority_fee_per_gas(&self) -> CallResult<U256> {
        self.call_typed(calls::max_priority_fee_per_gas()).await
    }

    /// Returns code of the given contract.
    pub async fn get_code(&self, address: H160, block: BlockNumber) -> CallResult<String> {
        self.call_typed(calls::get_code(address, block)).await
    }

    /// Returns transaction count of the address.
    pub async fn get_transaction_count(
        &self,
        address: H160,
        block: BlockNumber,
    ) -> CallResult<u64> {
        self.call_typed::<U64>(calls::get_transaction_count(address, block))
            .await
            .map(|v| v.as_u64())
    }

    /// Returns block with transaction hashes by number.
    pub async fn get_block_by_number(&self, block: BlockNumber) -> CallResult<Block<H256>> {
        self.call_typed(calls::get_block_by_number(block, false))
            .await
    }

    /// Returns full block by number.
    pub async fn get_full_block_by_number(
        &self,
        block: BlockNumber,
    ) -> CallResult<Block<Transaction>> {
        self.call_typed(calls::get_block_by_number(block, true))
            .await
    }

    /// Returns receipt by hash.
    pub async fn get_receipt_by_hash(
        &self,
        hash: H256,
    ) -> CallResult<Option<TransactionReceipt>> {
        self.call_typed(calls::get_transaction_receipt(hash)).await
    }

    /// Gets transaction by hash.
    pub async fn get_transaction_by_hash(&self, hash: H256) -> CallResult<Option<Transaction>> {
        self.call_typed(calls::get_transaction_by_hash(hash)).await
    }

    /// Performs eth call and returns the hex-encoded result.
    pub async fn eth_call(
        &self,
        request: &TransactionRequest,
        block: BlockNumber,
    ) -> CallResult<String> {
        self.call_typed(calls::eth_call(request, block)).await
    }

    /// Get EVM logs according to the given parameters.
    pub async fn get_logs(&self, params: &EthGetLogsParams) -> CallResult<Vec<LogEntry>> {
        self.call_typed(calls::get_logs(params)).await
    }

    /// Sends a raw transaction and returns its hash. Never batched or cached.
    pub async fn send_raw_transaction_bytes(&self, transaction: &[u8]) -> CallResult<H256> {
        self.call_typed(calls::send_raw_transaction(transaction))
            .await
    }

    async fn call_typed<R: DeserializeOwned>(&self, call: JsonRpcResult<RpcCall>) -> CallResult<R> {
        let value = self.execute(call?).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Routes one call through the pipeline: non-batchable calls and every
    /// call with batching disabled go straight to the transport; batchable
    /// calls are admitted to the open batch, behind the scope cache unless
    /// caching is disabled.
    async fn execute(&self, call: RpcCall) -> CallResult<Value> {
        if !self.batching || !call.batchable {
            return self.dispatcher.send_direct(call).await;
        }

        let key = derive_key(call.method, &call.params);
        if !self.caching {
            return await_settled(self.dispatcher.schedule(call, key).await).await;
        }

        let dispatcher = self.dispatcher.clone();
        let shared = self
            .cache
            .get_or_compute(&key, || {
                let key = key.clone();
                async move { await_settled(dispatcher.schedule(call, key).await).await }.boxed()
            })
            .await;
        shared.await
    }
}

/// Operation surface bound to one on-chain contract address.
///
/// Handles are constructed from a [`CoalescingClient`] and share its scope:
/// calls made through a handle are admitted to the same open batch and served
/// from the same cache as calls made on the client itself.
pub struct ContractHandle<C: Client + 'static> {
    client: CoalescingClient<C>,
    address: H160,
}

impl<C: Client + 'static> Clone for ContractHandle<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            address: self.address,
        }
    }
}

impl<C: Client + 'static> ContractHandle<C> {
    /// The address this handle is bound to.
    pub fn address(&self) -> H160 {
        self.address
    }

    /// Returns the contract's code.
    pub async fn code(&self, block: BlockNumber) -> CallResult<String> {
        self.client.get_code(self.address, block).await
    }

    /// Returns the contract's balance.
    pub async fn balance(&self, block: BlockNumber) -> CallResult<U256> {
        self.client.get_balance(self.address, block).await
    }

    /// Performs a read-only call against the contract with the given ABI-encoded
    /// input data.
    pub async fn call(&self, data: Bytes, block: BlockNumber) -> CallResult<String> {
        let request = TransactionRequest {
            to: Some(self.address),
            data: Some(data),
            ..Default::default()
        };
        self.client.eth_call(&request, block).await
    }
}
