//! Read-only chain access.
//!
//! Everything the daemon learns about the pool and the vault goes through the
//! `ChainReader` trait: value reads, tuple reads, bounded-span log queries and
//! block timestamp lookups. The production implementation speaks JSON-RPC over
//! HTTP through alloy (`rpc::RpcChainReader`); tests use a scripted fake.
//!
//! Every read is expected to be wrapped in `with_timeout` by the caller so a
//! slow provider degrades a field to "stale" instead of stalling a tick.

pub mod rpc;

#[cfg(test)]
pub(crate) mod fake;

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::events::abi::keccak256;

pub use rpc::RpcChainReader;

#[derive(Error, Debug, Clone)]
pub enum ReadError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("read timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// A log as returned by the provider, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: Option<u64>,
    pub block_hash: Option<B256>,
    pub tx_hash: Option<B256>,
    pub log_index: Option<u64>,
}

/// eth_getLogs parameters. Block bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub addresses: Vec<Address>,
    /// Accepted topic0 values (event signatures).
    pub topics: Vec<B256>,
    pub from_block: u64,
    pub to_block: u64,
}

/// A view-function call with static arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub signature: &'static str,
    args: Vec<B256>,
}

impl ContractCall {
    pub fn new(signature: &'static str) -> Self {
        Self {
            signature,
            args: Vec::new(),
        }
    }

    pub fn with_address(mut self, address: Address) -> Self {
        self.args.push(address.into_word());
        self
    }

    pub fn selector(&self) -> [u8; 4] {
        let hash = keccak256(self.signature.as_bytes());
        [hash[0], hash[1], hash[2], hash[3]]
    }

    /// ABI calldata: 4-byte selector followed by one word per argument.
    pub fn calldata(&self) -> Bytes {
        let mut out = Vec::with_capacity(4 + 32 * self.args.len());
        out.extend_from_slice(&self.selector());
        for arg in &self.args {
            out.extend_from_slice(arg.as_slice());
        }
        Bytes::from(out)
    }
}

#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn block_number(&self) -> Result<u64, ReadError>;

    /// Raw eth_call against `contract`.
    async fn call(&self, contract: Address, call: &ContractCall) -> Result<Bytes, ReadError>;

    /// Logs for a single block range. Callers keep the span within the
    /// provider's limit.
    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<RawLog>, ReadError>;

    /// Timestamp (unix seconds) of the block with this hash, if known.
    async fn block_timestamp(&self, block_hash: B256) -> Result<Option<u64>, ReadError>;

    /// Single uint256 return value.
    async fn read_uint(&self, contract: Address, call: &ContractCall) -> Result<U256, ReadError> {
        let words = self.read_tuple(contract, call, 1).await?;
        Ok(words[0])
    }

    /// First `arity` static words of the return data.
    async fn read_tuple(
        &self,
        contract: Address,
        call: &ContractCall,
        arity: usize,
    ) -> Result<Vec<U256>, ReadError> {
        let data = self.call(contract, call).await?;
        decode_words(&data, arity).ok_or_else(|| {
            ReadError::Malformed(format!(
                "{} returned {} bytes, expected at least {}",
                call.signature,
                data.len(),
                arity * 32
            ))
        })
    }
}

fn decode_words(data: &[u8], arity: usize) -> Option<Vec<U256>> {
    if arity == 0 || data.len() < arity * 32 {
        return None;
    }
    Some(
        data.chunks_exact(32)
            .take(arity)
            .map(U256::from_be_slice)
            .collect(),
    )
}

/// Bound an external read. A timeout becomes `ReadError::Timeout`.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, ReadError>
where
    F: Future<Output = Result<T, ReadError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ReadError::Timeout(limit)),
    }
}
