//! JSON-RPC chain reader backed by an alloy HTTP provider.

use alloy::primitives::{Address, Bytes, B256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log, TransactionInput, TransactionRequest};
use async_trait::async_trait;
use tracing::{debug, info};

use super::{ChainReader, ContractCall, LogQuery, RawLog, ReadError};

pub struct RpcChainReader {
    provider: DynProvider,
}

impl RpcChainReader {
    pub fn connect(rpc_url: &str) -> anyhow::Result<Self> {
        let url = rpc_url.parse()?;
        let provider = ProviderBuilder::new().connect_http(url).erased();
        info!(url = %redact(rpc_url), "chain reader configured");
        Ok(Self { provider })
    }
}

/// Drop the path of an RPC URL before logging it; hosted providers put the
/// API key there.
fn redact(url: &str) -> String {
    match url.find("://") {
        Some(scheme_end) => {
            let rest = &url[scheme_end + 3..];
            let host_end = rest.find('/').unwrap_or(rest.len());
            format!("{}{}", &url[..scheme_end + 3], &rest[..host_end])
        }
        None => "<unparsed>".to_string(),
    }
}

fn transport<E: std::fmt::Display>(e: E) -> ReadError {
    ReadError::Transport(e.to_string())
}

fn to_raw(log: Log) -> RawLog {
    RawLog {
        address: log.address(),
        topics: log.topics().to_vec(),
        data: log.data().data.clone(),
        block_number: log.block_number,
        block_hash: log.block_hash,
        tx_hash: log.transaction_hash,
        log_index: log.log_index,
    }
}

#[async_trait]
impl ChainReader for RpcChainReader {
    async fn block_number(&self) -> Result<u64, ReadError> {
        self.provider.get_block_number().await.map_err(transport)
    }

    async fn call(&self, contract: Address, call: &ContractCall) -> Result<Bytes, ReadError> {
        let tx = TransactionRequest::default()
            .to(contract)
            .input(TransactionInput::new(call.calldata()));
        self.provider.call(tx).await.map_err(transport)
    }

    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<RawLog>, ReadError> {
        let filter = Filter::new()
            .address(query.addresses.clone())
            .event_signature(query.topics.clone())
            .from_block(query.from_block)
            .to_block(query.to_block);

        let logs = self.provider.get_logs(&filter).await.map_err(transport)?;
        debug!(
            from = query.from_block,
            to = query.to_block,
            count = logs.len(),
            "eth_getLogs"
        );
        Ok(logs.into_iter().map(to_raw).collect())
    }

    async fn block_timestamp(&self, block_hash: B256) -> Result<Option<u64>, ReadError> {
        let block = self
            .provider
            .get_block_by_hash(block_hash)
            .await
            .map_err(transport)?;
        Ok(block.map(|b| b.header.timestamp))
    }
}
