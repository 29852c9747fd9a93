//! Windowed, deduplicated, persisted event-log indexer.
//!
//! Each poll:
//! 1. reads the chain head and computes the block range since the last
//!    checkpoint (or `cold_start_lookback_blocks` behind head on first run);
//! 2. splits it into sub-ranges no wider than the provider's span limit and
//!    fetches them sequentially per contract, pool and vault in parallel;
//! 3. decodes every log against the schema for its (contract, topic0), and
//!    formats the arguments for display;
//! 4. merges into the `HistoryWindow` keyed by (tx hash, event name), evicts by
//!    age and by count, then persists the window.
//!
//! A failed sub-range or an undecodable log never aborts the poll; both are
//! recorded in the returned `PollReport`. The checkpoint only advances over
//! the leading run of sub-ranges that succeeded for every contract, so a
//! failed range is fetched again next tick.
//!
//! The checkpoint is persisted next to the window, and only after the window
//! itself was written, so a restart resumes from a block the stored window
//! already covers. A resumed poll never reaches further back than the
//! cold-start lookback.

pub mod window;

use alloy::primitives::B256;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::chain::{with_timeout, ChainReader, LogQuery, RawLog, ReadError};
use crate::config::{ChainConfig, IndexerConfig, RetentionClock};
use crate::events::format::tx_hex;
use crate::events::{decode_log, EventRegistry, Source};
use crate::store::{checkpoint_key, load_records, save_records, PersistenceStore, HISTORY_KEY};

pub use window::{EventArg, HistoryWindow, LogEvent, MergeStats};

#[derive(Debug, Clone)]
pub struct IndexerSettings {
    pub max_block_span: u64,
    pub read_timeout: Duration,
    pub retention_secs: u64,
    pub capacity: usize,
    pub cold_start_lookback_blocks: u64,
    pub retention_clock: RetentionClock,
}

impl IndexerSettings {
    pub fn from_config(chain: &ChainConfig, indexer: &IndexerConfig) -> Self {
        Self {
            max_block_span: chain.max_block_span,
            read_timeout: chain.read_timeout(),
            retention_secs: indexer.retention_secs,
            capacity: indexer.capacity,
            cold_start_lookback_blocks: indexer.cold_start_lookback_blocks,
            retention_clock: indexer.retention_clock,
        }
    }
}

/// Result of fetching one sub-range for one contract.
#[derive(Debug, Clone)]
pub struct RangeOutcome {
    pub source: Source,
    pub from_block: u64,
    pub to_block: u64,
    /// Number of raw logs on success.
    pub result: Result<usize, ReadError>,
}

/// What a single poll did. Partial failures live here instead of aborting.
#[derive(Debug, Clone, Default)]
pub struct PollReport {
    pub head: Option<u64>,
    pub head_error: Option<ReadError>,
    pub ranges: Vec<RangeOutcome>,
    pub decode_failures: Vec<String>,
    pub merge: MergeStats,
    pub expired: usize,
    pub overflowed: usize,
    pub persisted: bool,
    pub persist_error: Option<String>,
}

impl PollReport {
    pub fn failed_ranges(&self) -> usize {
        self.ranges.iter().filter(|r| r.result.is_err()).count()
    }

    pub fn is_clean(&self) -> bool {
        self.head_error.is_none()
            && self.failed_ranges() == 0
            && self.decode_failures.is_empty()
            && self.persist_error.is_none()
    }
}

/// Inclusive sub-ranges of at most `span` blocks covering `[from, to]`.
pub fn split_range(from: u64, to: u64, span: u64) -> Vec<(u64, u64)> {
    let span = span.max(1);
    let mut out = Vec::new();
    let mut start = from;
    while start <= to {
        let end = start.saturating_add(span - 1).min(to);
        out.push((start, end));
        if end == u64::MAX {
            break;
        }
        start = end + 1;
    }
    out
}

pub struct LogWindowIndexer {
    reader: Arc<dyn ChainReader>,
    store: Arc<dyn PersistenceStore>,
    store_key: String,
    registry: EventRegistry,
    settings: IndexerSettings,
    window: HistoryWindow,
    /// Last block fully fetched for every watched contract.
    checkpoint: Option<u64>,
    /// Checkpoint value the store currently holds.
    stored_checkpoint: Option<u64>,
    /// Window changed since the last successful persist.
    dirty: bool,
}

impl LogWindowIndexer {
    pub fn new(
        reader: Arc<dyn ChainReader>,
        store: Arc<dyn PersistenceStore>,
        registry: EventRegistry,
        settings: IndexerSettings,
    ) -> Self {
        let window = HistoryWindow::new(settings.retention_secs, settings.capacity);
        Self {
            reader,
            store,
            store_key: HISTORY_KEY.to_string(),
            registry,
            settings,
            window,
            checkpoint: None,
            stored_checkpoint: None,
            dirty: false,
        }
    }

    /// Use a different persistence key (several indexers on one store).
    pub fn with_store_key(mut self, key: impl Into<String>) -> Self {
        self.store_key = key.into();
        self
    }

    pub fn window(&self) -> &HistoryWindow {
        &self.window
    }

    pub fn checkpoint(&self) -> Option<u64> {
        self.checkpoint
    }

    /// Load the persisted window and checkpoint. Call once before the first
    /// poll.
    pub async fn hydrate(&mut self, now: u64) -> usize {
        let records: Vec<LogEvent> = load_records(self.store.as_ref(), &self.store_key).await;
        let loaded = records.len();
        let kept = self.window.restore(records, now);

        self.checkpoint = self.load_checkpoint().await;
        self.stored_checkpoint = self.checkpoint;
        info!(
            key = %self.store_key,
            loaded = loaded,
            kept = kept,
            checkpoint = ?self.checkpoint,
            "event window hydrated"
        );
        kept
    }

    async fn load_checkpoint(&self) -> Option<u64> {
        let key = checkpoint_key(&self.store_key);
        let raw = match self.store.get(&key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to read checkpoint, cold starting");
                return None;
            }
        };
        match raw.trim().parse::<u64>() {
            Ok(block) => Some(block),
            Err(e) => {
                warn!(key = %key, value = %raw, error = %e, "ignoring unparsable checkpoint");
                None
            }
        }
    }

    /// Write the checkpoint if it moved. Only called once the window it
    /// covers is durable.
    async fn persist_checkpoint(&mut self, report: &mut PollReport) {
        let Some(block) = self.checkpoint else {
            return;
        };
        if self.stored_checkpoint == Some(block) {
            return;
        }
        let key = checkpoint_key(&self.store_key);
        match self.store.set(&key, &block.to_string()).await {
            Ok(()) => self.stored_checkpoint = Some(block),
            Err(e) => {
                warn!(key = %key, block = block, error = %e, "failed to persist checkpoint");
                report.persist_error = Some(e.to_string());
            }
        }
    }

    pub async fn poll(&mut self, now: u64) -> PollReport {
        let mut report = PollReport::default();

        match with_timeout(self.settings.read_timeout, self.reader.block_number()).await {
            Ok(head) => {
                report.head = Some(head);
                self.fetch_and_merge(head, now, &mut report).await;
            }
            Err(e) => {
                warn!(error = %e, "failed to read chain head, skipping log fetch this tick");
                report.head_error = Some(e);
            }
        }

        report.expired = self.window.evict_expired(now);
        report.overflowed = self.window.enforce_capacity();
        if report.merge.inserted > 0 || report.expired > 0 || report.overflowed > 0 {
            self.dirty = true;
        }

        if self.dirty {
            match save_records(self.store.as_ref(), &self.store_key, self.window.iter()).await {
                Ok(()) => {
                    self.dirty = false;
                    report.persisted = true;
                }
                Err(e) => {
                    warn!(key = %self.store_key, error = %e, "failed to persist event window");
                    report.persist_error = Some(e.to_string());
                }
            }
        }
        if !self.dirty {
            self.persist_checkpoint(&mut report).await;
        }

        debug!(
            head = ?report.head,
            checkpoint = ?self.checkpoint,
            inserted = report.merge.inserted,
            duplicates = report.merge.duplicates,
            stale = report.merge.stale,
            expired = report.expired,
            overflowed = report.overflowed,
            failed_ranges = report.failed_ranges(),
            decode_failures = report.decode_failures.len(),
            window = self.window.len(),
            "indexer poll"
        );
        report
    }

    async fn fetch_and_merge(&mut self, head: u64, now: u64, report: &mut PollReport) {
        let earliest = head.saturating_sub(self.settings.cold_start_lookback_blocks);
        let from = match self.checkpoint {
            Some(cp) => cp.saturating_add(1).max(earliest),
            None => earliest,
        };
        if from > head {
            return;
        }
        let ranges = split_range(from, head, self.settings.max_block_span);

        let per_source = join_all(
            [Source::Pool, Source::Vault]
                .into_iter()
                .map(|source| self.fetch_source(source, &ranges)),
        )
        .await;

        // advance over the leading sub-ranges every contract fetched
        let mut advanced_to = None;
        for (i, (_, to)) in ranges.iter().enumerate() {
            let all_ok = per_source
                .iter()
                .all(|outcomes| outcomes.get(i).map_or(false, |(o, _)| o.result.is_ok()));
            if !all_ok {
                break;
            }
            advanced_to = Some(*to);
        }
        if let Some(to) = advanced_to {
            self.checkpoint = Some(to);
        }

        let mut logs: Vec<RawLog> = Vec::new();
        for outcomes in per_source {
            for (outcome, batch) in outcomes {
                report.ranges.push(outcome);
                logs.extend(batch);
            }
        }
        logs.sort_by_key(|l| (l.block_number.unwrap_or(0), l.log_index.unwrap_or(0)));

        let events = self.decode_batch(&logs, now, report).await;
        report.merge = self.window.merge(events);

        if report.merge.inserted > 0 {
            info!(
                new = report.merge.inserted,
                duplicates = report.merge.duplicates,
                window = self.window.len(),
                "new contract events"
            );
        }
    }

    /// Sequential sub-range fetches for one contract.
    async fn fetch_source(
        &self,
        source: Source,
        ranges: &[(u64, u64)],
    ) -> Vec<(RangeOutcome, Vec<RawLog>)> {
        let Some(address) = self.registry.address_of(source) else {
            return Vec::new();
        };
        let topics = self.registry.topics_for(source);
        let mut out = Vec::with_capacity(ranges.len());

        for &(from_block, to_block) in ranges {
            let query = LogQuery {
                addresses: vec![address],
                topics: topics.clone(),
                from_block,
                to_block,
            };
            match with_timeout(self.settings.read_timeout, self.reader.get_logs(&query)).await {
                Ok(batch) => {
                    let outcome = RangeOutcome {
                        source,
                        from_block,
                        to_block,
                        result: Ok(batch.len()),
                    };
                    out.push((outcome, batch));
                }
                Err(e) => {
                    warn!(
                        source = %source,
                        from = from_block,
                        to = to_block,
                        error = %e,
                        "log fetch failed for sub-range"
                    );
                    let outcome = RangeOutcome {
                        source,
                        from_block,
                        to_block,
                        result: Err(e),
                    };
                    out.push((outcome, Vec::new()));
                }
            }
        }
        out
    }

    async fn decode_batch(&self, logs: &[RawLog], now: u64, report: &mut PollReport) -> Vec<LogEvent> {
        let mut block_times: HashMap<B256, Option<u64>> = HashMap::new();
        let mut events = Vec::with_capacity(logs.len());

        for log in logs {
            let decoded = match decode_log(&self.registry, log) {
                Ok(d) => d,
                Err(e) => {
                    warn!(
                        address = %log.address,
                        block = ?log.block_number,
                        error = %e,
                        "failed to decode log"
                    );
                    report.decode_failures.push(e.to_string());
                    continue;
                }
            };
            let Some(tx_hash) = log.tx_hash else {
                warn!(event = decoded.name, "log without transaction hash, skipping");
                report
                    .decode_failures
                    .push(format!("{}: missing transaction hash", decoded.name));
                continue;
            };

            let observed_at = match self.settings.retention_clock {
                RetentionClock::Local => now,
                RetentionClock::Block => self
                    .block_time(log.block_hash, &mut block_times)
                    .await
                    .unwrap_or(now),
            };

            events.push(LogEvent {
                observed_at,
                source: decoded.source,
                event_name: decoded.name.to_string(),
                args: decoded
                    .args
                    .iter()
                    .map(|(name, value)| EventArg {
                        name: name.to_string(),
                        value: value.format(),
                    })
                    .collect(),
                tx_hash: tx_hex(&tx_hash),
                block_number: log.block_number.unwrap_or(0),
                log_index: log.log_index.unwrap_or(0),
            });
        }
        events
    }

    async fn block_time(
        &self,
        block_hash: Option<B256>,
        cache: &mut HashMap<B256, Option<u64>>,
    ) -> Option<u64> {
        let hash = block_hash?;
        if let Some(cached) = cache.get(&hash) {
            return *cached;
        }
        let ts = match with_timeout(self.settings.read_timeout, self.reader.block_timestamp(hash)).await {
            Ok(ts) => ts,
            Err(e) => {
                debug!(block_hash = %hash, error = %e, "block timestamp lookup failed, using local time");
                None
            }
        };
        cache.insert(hash, ts);
        ts
    }
}
