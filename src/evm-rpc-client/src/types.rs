//! Parameter and response types shared by the direct and coalescing clients.

use ethereum_types::{H160, H256, U64, U256};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Block selector accepted by most read methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockNumber {
    Latest,
    Earliest,
    Pending,
    Number(U64),
}

impl Serialize for BlockNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            BlockNumber::Latest => serializer.serialize_str("latest"),
            BlockNumber::Earliest => serializer.serialize_str("earliest"),
            BlockNumber::Pending => serializer.serialize_str("pending"),
            BlockNumber::Number(number) => number.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for BlockNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        match tag.as_str() {
            "latest" => Ok(BlockNumber::Latest),
            "earliest" => Ok(BlockNumber::Earliest),
            "pending" => Ok(BlockNumber::Pending),
            other => {
                let digits = other
                    .strip_prefix("0x")
                    .ok_or_else(|| de::Error::custom("expected a 0x-prefixed block number"))?;
                let number = u64::from_str_radix(digits, 16).map_err(de::Error::custom)?;
                Ok(BlockNumber::Number(number.into()))
            }
        }
    }
}

impl From<u64> for BlockNumber {
    fn from(number: u64) -> Self {
        BlockNumber::Number(number.into())
    }
}

/// Binary payload carried as a 0x-prefixed hex string on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bytes(pub Vec<u8>);

impl Serialize for Bytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(&self.0)))
    }
}

impl<'de> Deserialize<'de> for Bytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        let digits = text.strip_prefix("0x").unwrap_or(&text);
        hex::decode(digits).map(Bytes).map_err(de::Error::custom)
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes(bytes)
    }
}

/// Call parameters for `eth_call` (and gas estimation).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<H160>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<H160>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Bytes>,
}

/// Block as returned by `eth_getBlockByNumber`, generic over the transaction
/// representation (`H256` hashes or full [`Transaction`] bodies).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block<TX> {
    pub number: Option<U64>,
    pub hash: Option<H256>,
    pub parent_hash: H256,
    pub timestamp: U256,
    pub gas_used: U256,
    pub gas_limit: U256,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_fee_per_gas: Option<U256>,
    pub transactions: Vec<TX>,
}

/// Transaction body as returned by `eth_getTransactionByHash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub hash: H256,
    pub nonce: U256,
    pub block_hash: Option<H256>,
    pub block_number: Option<U64>,
    pub from: H160,
    pub to: Option<H160>,
    pub value: U256,
    pub gas: U256,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<U256>,
    pub input: Bytes,
}

/// Receipt as returned by `eth_getTransactionReceipt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: H256,
    pub transaction_index: U64,
    pub block_hash: Option<H256>,
    pub block_number: Option<U64>,
    pub cumulative_gas_used: U256,
    pub gas_used: Option<U256>,
    pub contract_address: Option<H160>,
    pub status: Option<U64>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

/// Log entry as returned by `eth_getLogs` and inside receipts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub address: H160,
    pub topics: Vec<H256>,
    pub data: Bytes,
    pub block_number: Option<U64>,
    pub transaction_hash: Option<H256>,
    pub log_index: Option<U256>,
}

/// Parameters to `eth_getLogs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthGetLogsParams {
    /// Addresses of contracts to filter logs for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Vec<H160>>,

    /// Start searching logs from this block number.
    pub from_block: BlockNumber,

    /// Finish searching logs on this block number.
    pub to_block: BlockNumber,

    /// Filter logs by topics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topics: Option<Vec<Vec<H256>>>,
}
