//! Scripted in-memory `ChainReader` for tests.

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{ChainReader, ContractCall, LogQuery, RawLog, ReadError};

#[derive(Default)]
pub(crate) struct FakeChainReader {
    head: AtomicU64,
    logs: Mutex<Vec<RawLog>>,
    failing_ranges: Mutex<HashSet<(u64, u64)>>,
    /// Reject queries wider than this, like a hosted provider would.
    max_span: Option<u64>,
    calls: Mutex<HashMap<(Address, [u8; 4]), Vec<U256>>>,
    failing_calls: Mutex<HashSet<(Address, [u8; 4])>>,
    slow_calls: Mutex<HashMap<(Address, [u8; 4]), Duration>>,
    timestamps: Mutex<HashMap<B256, u64>>,
    pub log_queries: Mutex<Vec<(u64, u64)>>,
    pub timestamp_lookups: AtomicUsize,
}

impl FakeChainReader {
    pub fn new(head: u64) -> Self {
        Self {
            head: AtomicU64::new(head),
            ..Self::default()
        }
    }

    pub fn with_max_span(mut self, span: u64) -> Self {
        self.max_span = Some(span);
        self
    }

    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    pub fn push_log(&self, log: RawLog) {
        self.logs.lock().unwrap().push(log);
    }

    pub fn fail_range(&self, from: u64, to: u64) {
        self.failing_ranges.lock().unwrap().insert((from, to));
    }

    pub fn heal_ranges(&self) {
        self.failing_ranges.lock().unwrap().clear();
    }

    pub fn set_call(&self, contract: Address, call: &ContractCall, words: Vec<U256>) {
        self.calls
            .lock()
            .unwrap()
            .insert((contract, call.selector()), words);
    }

    pub fn fail_call(&self, contract: Address, call: &ContractCall) {
        self.failing_calls
            .lock()
            .unwrap()
            .insert((contract, call.selector()));
    }

    pub fn slow_call(&self, contract: Address, call: &ContractCall, delay: Duration) {
        self.slow_calls
            .lock()
            .unwrap()
            .insert((contract, call.selector()), delay);
    }

    pub fn set_timestamp(&self, block_hash: B256, ts: u64) {
        self.timestamps.lock().unwrap().insert(block_hash, ts);
    }

    pub fn queried_ranges(&self) -> Vec<(u64, u64)> {
        self.log_queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainReader for FakeChainReader {
    async fn block_number(&self) -> Result<u64, ReadError> {
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn call(&self, contract: Address, call: &ContractCall) -> Result<Bytes, ReadError> {
        let key = (contract, call.selector());
        let delay = self.slow_calls.lock().unwrap().get(&key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_calls.lock().unwrap().contains(&key) {
            return Err(ReadError::Transport(format!("{} reverted", call.signature)));
        }
        let words = self
            .calls
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| ReadError::Transport(format!("no such call {}", call.signature)))?;
        let mut out = Vec::with_capacity(words.len() * 32);
        for w in words {
            out.extend_from_slice(&w.to_be_bytes::<32>());
        }
        Ok(Bytes::from(out))
    }

    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<RawLog>, ReadError> {
        self.log_queries
            .lock()
            .unwrap()
            .push((query.from_block, query.to_block));

        if let Some(span) = self.max_span {
            if query.to_block - query.from_block + 1 > span {
                return Err(ReadError::Transport(format!(
                    "block range exceeds {span} blocks"
                )));
            }
        }
        if self
            .failing_ranges
            .lock()
            .unwrap()
            .contains(&(query.from_block, query.to_block))
        {
            return Err(ReadError::Transport("upstream 503".into()));
        }

        let logs = self.logs.lock().unwrap();
        Ok(logs
            .iter()
            .filter(|l| {
                let block = l.block_number.unwrap_or(0);
                block >= query.from_block
                    && block <= query.to_block
                    && query.addresses.contains(&l.address)
                    && l.topics
                        .first()
                        .map(|t| query.topics.contains(t))
                        .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn block_timestamp(&self, block_hash: B256) -> Result<Option<u64>, ReadError> {
        self.timestamp_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.timestamps.lock().unwrap().get(&block_hash).copied())
    }
}
