use std::future::Future;
use std::pin::Pin;

use ethereum_types::{H160, H256, U64, U256};
use itertools::Itertools;
use jsonrpc_core::{Id, Output, Request, Response};
use serde::de::DeserializeOwned;

use crate::calls::{self, RpcCall};
use crate::error::{JsonRpcError, JsonRpcResult};
use crate::types::{
    Block, BlockNumber, EthGetLogsParams, LogEntry, Transaction, TransactionReceipt,
    TransactionRequest,
};

/// Transport capable of delivering one JSON-RPC request (single or batch) and
/// returning its response.
///
/// Implementations must be safe to invoke concurrently from many request
/// scopes; retries and timeouts are the transport's business, not the
/// caller's.
pub trait Client: Clone + Send + Sync {
    /// Send RPC request.
    fn send_rpc_request(
        &self,
        request: Request,
    ) -> Pin<Box<dyn Future<Output = JsonRpcResult<Response>> + Send>>;
}

/// A client for interacting with an Ethereum node over JSON-RPC.
///
/// Every method issues its own wire request; use the coalescing client when
/// concurrent calls should share one batch.
#[derive(Clone)]
pub struct EthJsonRpcClient<C: Client> {
    client: C,
}

impl<C: Client> EthJsonRpcClient<C> {
    /// Create a new client on top of the given transport.
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Returns chain id.
    pub async fn get_chain_id(&self) -> JsonRpcResult<u64> {
        self.single_request::<U64>(calls::chain_id()?, str_id(calls::ETH_CHAIN_ID_METHOD))
            .await
            .map(|v| v.as_u64())
    }

    /// Returns chain block number.
    pub async fn get_block_number(&self) -> JsonRpcResult<u64> {
        self.single_request::<U64>(
            calls::block_number()?,
            str_id(calls::ETH_BLOCK_NUMBER_METHOD),
        )
        .await
        .map(|v| v.as_u64())
    }

    /// Returns balance of the address.
    pub async fn get_balance(&self, address: H160, block: BlockNumber) -> JsonRpcResult<U256> {
        self.single_request(
            calls::get_balance(address, block)?,
            str_id(calls::ETH_GET_BALANCE_METHOD),
        )
        .await
    }

    /// Returns the gas price.
    pub async fn gas_price(&self) -> JsonRpcResult<U256> {
        self.single_request(calls::gas_price()?, str_id(calls::ETH_GAS_PRICE_METHOD))
            .await
    }

    /// Returns the max priority fee per gas.
    pub async fn max_priority_fee_per_gas(&self) -> JsonRpcResult<U256> {
        self.single_request(
            calls::max_priority_fee_per_gas()?,
            str_id(calls::ETH_MAX_PRIORITY_FEE_PER_GAS_METHOD),
        )
        .await
    }

    /// Returns code of the given contract.
    pub async fn get_code(&self, address: H160, block: BlockNumber) -> JsonRpcResult<String> {
        self.single_request(
            calls::get_code(address, block)?,
            str_id(calls::ETH_GET_CODE_METHOD),
        )
        .await
    }

    /// Returns transaction count of the address.
    pub async fn get_transaction_count(
        &self,
        address: H160,
        block: BlockNumber,
    ) -> JsonRpcResult<u64> {
        self.single_request::<U64>(
            calls::get_transaction_count(address, block)?,
            str_id(calls::ETH_GET_TRANSACTION_COUNT_METHOD),
        )
        .await
        .map(|v| v.as_u64())
    }

    /// Returns block with transaction hashes by number.
    pub async fn get_block_by_number(&self, block: BlockNumber) -> JsonRpcResult<Block<H256>> {
        self.single_request(
            calls::get_block_by_number(block, false)?,
            // Some JSON-RPC services fail to parse requests with a null id
            str_id(calls::ETH_GET_BLOCK_BY_NUMBER_METHOD),
        )
        .await
    }

    /// Returns full block by number.
    pub async fn get_full_block_by_number(
        &self,
        block: BlockNumber,
    ) -> JsonRpcResult<Block<Transaction>> {
        self.single_request(
            calls::get_block_by_number(block, true)?,
            str_id(calls::ETH_GET_BLOCK_BY_NUMBER_METHOD),
        )
        .await
    }

    /// Returns full blocks by number.
    pub async fn get_full_blocks_by_number(
        &self,
        blocks: impl IntoIterator<Item = BlockNumber>,
        max_batch_size: usize,
    ) -> JsonRpcResult<Vec<Block<Transaction>>> {
        let calls = blocks
            .into_iter()
            .enumerate()
            .map(|(index, block)| -> JsonRpcResult<(RpcCall, Id)> {
                Ok((calls::get_block_by_number(block, true)?, Id::Num(index as _)))
            })
            .collect::<JsonRpcResult<Vec<_>>>()?;
        self.batch_request(calls, max_batch_size).await
    }

    /// Returns receipt by hash.
    pub async fn get_receipt_by_hash(
        &self,
        hash: H256,
    ) -> JsonRpcResult<Option<TransactionReceipt>> {
        self.single_request(
            calls::get_transaction_receipt(hash)?,
            // `Display` for H256 abbreviates; ids must carry the full hash.
            Id::Str(format!("{hash:?}")),
        )
        .await
    }

    /// Returns receipts by hash, batched by `max_batch_size`. Hashes without
    /// a receipt (pending or unknown transactions) are skipped.
    pub async fn get_receipts_by_hash(
        &self,
        hashes: impl IntoIterator<Item = H256>,
        max_batch_size: usize,
    ) -> JsonRpcResult<Vec<TransactionReceipt>> {
        let calls = hashes
            .into_iter()
            .map(|hash| -> JsonRpcResult<(RpcCall, Id)> {
                Ok((calls::get_transaction_receipt(hash)?, Id::Str(format!("{hash:?}"))))
            })
            .collect::<JsonRpcResult<Vec<_>>>()?;

        Ok(self
            .batch_request::<Option<TransactionReceipt>>(calls, max_batch_size)
            .await?
            .into_iter()
            .flatten()
            .collect())
    }

    /// Gets transaction by hash.
    pub async fn get_transaction_by_hash(
        &self,
        hash: H256,
    ) -> JsonRpcResult<Option<Transaction>> {
        self.single_request(
            calls::get_transaction_by_hash(hash)?,
            Id::Str(format!("{hash:?}")),
        )
        .await
    }

    /// Performs eth call and returns the hex-encoded result.
    pub async fn eth_call(
        &self,
        request: &TransactionRequest,
        block: BlockNumber,
    ) -> JsonRpcResult<String> {
        self.single_request(
            calls::eth_call(request, block)?,
            str_id(calls::ETH_CALL_METHOD),
        )
        .await
    }

    /// Get EVM logs according to the given parameters.
    pub async fn get_logs(&self, params: &EthGetLogsParams) -> JsonRpcResult<Vec<LogEntry>> {
        self.single_request(calls::get_logs(params)?, str_id(calls::ETH_GET_LOGS_METHOD))
            .await
    }

    /// Sends a raw transaction and returns its hash.
    pub async fn send_raw_transaction_bytes(&self, transaction: &[u8]) -> JsonRpcResult<H256> {
        self.single_request(
            calls::send_raw_transaction(transaction)?,
            str_id(calls::ETH_SEND_RAW_TRANSACTION_METHOD),
        )
        .await
    }

    /// Performs a raw request.
    pub async fn request(&self, request: Request) -> JsonRpcResult<Response> {
        self.client.send_rpc_request(request).await
    }

    /// Performs a single request.
    pub async fn single_request<R: DeserializeOwned>(
        &self,
        call: RpcCall,
        id: Id,
    ) -> JsonRpcResult<R> {
        let request = Request::Single(call.into_method_call(id));
        let response = self.client.send_rpc_request(request).await?;

        match response {
            Response::Single(output) => output_into(output),
            Response::Batch(_) => Err(JsonRpcError::UnexpectedBatch),
        }
    }

    /// Performs a batch request, splitting it into chunks of at most
    /// `max_batch_size` calls.
    pub async fn batch_request<R: DeserializeOwned>(
        &self,
        calls: impl IntoIterator<Item = (RpcCall, Id)>,
        max_batch_size: usize,
    ) -> JsonRpcResult<Vec<R>> {
        let mut results = Vec::new();

        // Collect chunks before iterating, otherwise the future is not `Send`.
        let chunks: Vec<Vec<(RpcCall, Id)>> = calls
            .into_iter()
            .chunks(max_batch_size.max(1))
            .into_iter()
            .map(Iterator::collect)
            .collect();
        for chunk in chunks {
            let chunk_size = chunk.len();
            let request = Request::Batch(
                chunk
                    .into_iter()
                    .map(|(call, id)| call.into_method_call(id))
                    .collect(),
            );
            log::trace!("sending batch chunk of {chunk_size} call(s)");

            let response = self.client.send_rpc_request(request).await?;

            match response {
                // Some services answer a one-element batch with a single response.
                Response::Single(output) if chunk_size == 1 => results.push(output_into(output)?),
                Response::Single(_) => {
                    return Err(JsonRpcError::UnexpectedResultsAmount {
                        expected: chunk_size,
                        actual: 1,
                    });
                }
                Response::Batch(outputs) => {
                    if outputs.len() != chunk_size {
                        return Err(JsonRpcError::UnexpectedResultsAmount {
                            expected: chunk_size,
                            actual: outputs.len(),
                        });
                    }
                    for output in outputs {
                        results.push(output_into(output)?);
                    }
                }
            }
        }

        Ok(results)
    }
}

fn str_id(method: &str) -> Id {
    Id::Str(method.to_string())
}

fn output_into<R: DeserializeOwned>(output: Output) -> JsonRpcResult<R> {
    match output {
        Output::Success(success) => Ok(serde_json::from_value(success.result)?),
        Output::Failure(failure) => Err(JsonRpcError::Rpc(failure.error)),
    }
}
