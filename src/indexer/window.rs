//! Deduplicated, age- and count-bounded event history.

use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use tracing::warn;

use crate::events::format::short_tx;
use crate::events::Source;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventArg {
    pub name: String,
    pub value: String,
}

/// A decoded, display-formatted contract event. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Unix seconds, stamped from the configured retention clock.
    pub observed_at: u64,
    pub source: Source,
    pub event_name: String,
    pub args: Vec<EventArg>,
    pub tx_hash: String,
    #[serde(default)]
    pub block_number: u64,
    #[serde(default)]
    pub log_index: u64,
}

/// Uniqueness key: (tx hash, event name).
pub type EventKey = (String, String);

impl LogEvent {
    pub fn key(&self) -> EventKey {
        (self.tx_hash.clone(), self.event_name.clone())
    }

    /// `Vault Rebalanced`, `Pool Swap`, …
    pub fn label(&self) -> String {
        format!("{} {}", self.source, self.event_name)
    }

    pub fn short_tx(&self) -> String {
        short_tx(&self.tx_hash)
    }

    /// Chain position: (block number, log index).
    pub fn position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }

    fn validate(&self) -> Result<(), String> {
        let hex = self
            .tx_hash
            .strip_prefix("0x")
            .ok_or_else(|| format!("tx hash {:?} lacks 0x prefix", self.tx_hash))?;
        if hex.len() != 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(format!("tx hash {:?} is not 32 bytes of hex", self.tx_hash));
        }
        if self.event_name.is_empty() {
            return Err("empty event name".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub inserted: usize,
    pub duplicates: usize,
    /// Unseen events positioned at or before something already dropped for
    /// capacity.
    pub stale: usize,
}

/// Append-ordered event window.
///
/// Invariants after every public mutation:
/// - no two retained events share a key;
/// - `len() <= capacity`.
///
/// Keys of evicted events are remembered (up to `capacity` of them) so a
/// re-fetched old log is still treated as a duplicate rather than re-added
/// with a fresh timestamp.
///
/// The window holds the newest `capacity` events, so an incoming event that
/// sorts at or before the last capacity eviction, or before the oldest
/// retained event of a full window, is stale and never appended. That rule
/// survives a restart, where the tombstones do not.
#[derive(Debug, Clone)]
pub struct HistoryWindow {
    events: VecDeque<LogEvent>,
    keys: HashSet<EventKey>,
    tombstones: VecDeque<EventKey>,
    tombstone_set: HashSet<EventKey>,
    /// Highest position dropped by `enforce_capacity`.
    floor: Option<(u64, u64)>,
    retention_secs: u64,
    capacity: usize,
}

impl HistoryWindow {
    pub fn new(retention_secs: u64, capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            keys: HashSet::new(),
            tombstones: VecDeque::new(),
            tombstone_set: HashSet::new(),
            floor: None,
            retention_secs,
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn retention_secs(&self) -> u64 {
        self.retention_secs
    }

    /// Oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &LogEvent> {
        self.events.iter()
    }

    pub fn contains(&self, tx_hash: &str, event_name: &str) -> bool {
        self.keys
            .contains(&(tx_hash.to_string(), event_name.to_string()))
    }

    /// Most recent retained event emitted by `source`.
    pub fn latest_from(&self, source: Source) -> Option<&LogEvent> {
        self.events.iter().rev().find(|e| e.source == source)
    }

    /// Append events not already seen. First occurrence wins.
    pub fn merge<I: IntoIterator<Item = LogEvent>>(&mut self, incoming: I) -> MergeStats {
        let mut stats = MergeStats::default();
        for event in incoming {
            let key = event.key();
            if self.keys.contains(&key) || self.tombstone_set.contains(&key) {
                stats.duplicates += 1;
                continue;
            }
            if self.is_stale(&event) {
                stats.stale += 1;
                continue;
            }
            self.keys.insert(key);
            self.events.push_back(event);
            stats.inserted += 1;
        }
        stats
    }

    fn is_stale(&self, event: &LogEvent) -> bool {
        let position = event.position();
        if self.floor.is_some_and(|floor| position <= floor) {
            return true;
        }
        self.events.len() >= self.capacity
            && self
                .events
                .front()
                .is_some_and(|oldest| position < oldest.position())
    }

    /// Drop events older than the retention horizon. Returns how many went.
    pub fn evict_expired(&mut self, now: u64) -> usize {
        let retention = self.retention_secs;
        let before = self.events.len();
        let mut expired = Vec::new();
        self.events.retain(|e| {
            let keep = now.saturating_sub(e.observed_at) <= retention;
            if !keep {
                expired.push(e.key());
            }
            keep
        });
        for key in expired {
            self.forget(key);
        }
        before - self.events.len()
    }

    /// Drop oldest events past the capacity cap. Returns how many went.
    pub fn enforce_capacity(&mut self) -> usize {
        let mut dropped = 0;
        while self.events.len() > self.capacity {
            if let Some(oldest) = self.events.pop_front() {
                let position = oldest.position();
                self.floor = Some(self.floor.map_or(position, |f| f.max(position)));
                self.forget(oldest.key());
                dropped += 1;
            }
        }
        dropped
    }

    fn forget(&mut self, key: EventKey) {
        self.keys.remove(&key);
        if self.tombstone_set.insert(key.clone()) {
            self.tombstones.push_back(key);
        }
        while self.tombstones.len() > self.capacity {
            if let Some(old) = self.tombstones.pop_front() {
                self.tombstone_set.remove(&old);
            }
        }
    }

    /// Rebuild from persisted records: invalid records are dropped, then the
    /// usual dedup, retention and capacity rules apply.
    pub fn restore(&mut self, records: Vec<LogEvent>, now: u64) -> usize {
        let valid = records.into_iter().filter(|e| match e.validate() {
            Ok(()) => true,
            Err(reason) => {
                warn!(reason = %reason, "dropping invalid persisted event");
                false
            }
        });
        self.merge(valid);
        self.evict_expired(now);
        self.enforce_capacity();
        // hydration history is not evidence of anything evicted this run;
        // positions dropped for capacity still bound what may come back
        self.tombstones.clear();
        self.tombstone_set.clear();
        self.events.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn event(tx: u8, name: &str, observed_at: u64) -> LogEvent {
        LogEvent {
            observed_at,
            source: Source::Pool,
            event_name: name.to_string(),
            args: vec![EventArg {
                name: "amount".into(),
                value: "1 DFT".into(),
            }],
            tx_hash: format!("0x{}", format!("{tx:02x}").repeat(32)),
            block_number: tx as u64,
            log_index: 0,
        }
    }

    #[test]
    fn test_merge_dedups_by_tx_and_name() {
        let mut w = HistoryWindow::new(3600, 300);
        let stats = w.merge(vec![event(1, "Swap", 100), event(2, "Swap", 100)]);
        assert_eq!(stats, MergeStats { inserted: 2, duplicates: 0, stale: 0 });

        // same tx, same name → duplicate; same tx, other name → distinct
        let stats = w.merge(vec![
            event(2, "Swap", 200),
            event(2, "Sync", 200),
            event(3, "Swap", 200),
        ]);
        assert_eq!(stats, MergeStats { inserted: 2, duplicates: 1, stale: 0 });
        assert_eq!(w.len(), 4);

        // first occurrence wins: original timestamp kept
        let kept = w.iter().find(|e| e.event_name == "Swap" && e.block_number == 2).unwrap();
        assert_eq!(kept.observed_at, 100);
    }

    #[test]
    fn test_retention_boundary_is_inclusive() {
        let mut w = HistoryWindow::new(3600, 300);
        w.merge(vec![event(1, "Swap", 1000), event(2, "Swap", 2000)]);

        assert_eq!(w.evict_expired(4600), 0); // exactly at the horizon
        assert_eq!(w.len(), 2);
        assert_eq!(w.evict_expired(4601), 1);
        assert_eq!(w.len(), 1);
        assert!(!w.contains(&event(1, "Swap", 0).tx_hash, "Swap"));
    }

    #[test]
    fn test_capacity_evicts_oldest_first() {
        let mut w = HistoryWindow::new(3600, 3);
        w.merge((1..=5).map(|i| event(i, "Swap", 100)));
        assert_eq!(w.enforce_capacity(), 2);
        assert_eq!(w.len(), 3);
        let blocks: Vec<u64> = w.iter().map(|e| e.block_number).collect();
        assert_eq!(blocks, vec![3, 4, 5]);
    }

    #[test]
    fn test_evicted_event_is_not_resurrected() {
        let mut w = HistoryWindow::new(3600, 2);
        w.merge((1..=3).map(|i| event(i, "Swap", 100)));
        w.enforce_capacity();
        let stats = w.merge(vec![event(1, "Swap", 500)]);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(w.len(), 2);
    }

    #[test]
    fn test_full_window_rejects_older_positions_after_restore() {
        let mut w = HistoryWindow::new(3600, 2);
        w.merge((1..=3).map(|i| event(i, "Swap", 100)));
        w.enforce_capacity();
        let persisted: Vec<LogEvent> = w.iter().cloned().collect();

        // a fresh window knows nothing about the event dropped for capacity
        let mut restored = HistoryWindow::new(3600, 2);
        assert_eq!(restored.restore(persisted, 200), 2);
        let stats = restored.merge(vec![event(1, "Swap", 300)]);
        assert_eq!(stats, MergeStats { inserted: 0, duplicates: 0, stale: 1 });
        assert_eq!(restored.enforce_capacity(), 0);

        let blocks: Vec<u64> = restored.iter().map(|e| e.block_number).collect();
        assert_eq!(blocks, vec![2, 3]);

        // newer events still displace the oldest
        restored.merge(vec![event(4, "Swap", 300)]);
        restored.enforce_capacity();
        let blocks: Vec<u64> = restored.iter().map(|e| e.block_number).collect();
        assert_eq!(blocks, vec![3, 4]);
    }

    #[test]
    fn test_capacity_floor_holds_when_window_has_room() {
        let mut w = HistoryWindow::new(3600, 2);
        w.merge((2..=4).map(|i| event(i, "Swap", 100)));
        w.enforce_capacity(); // drops block 2
        w.evict_expired(5_000); // empties the window
        assert!(w.is_empty());

        // block 1 was never seen, but sorts before a capacity eviction
        let stats = w.merge(vec![event(1, "Swap", 5_000), event(5, "Swap", 5_000)]);
        assert_eq!(stats.stale, 1);
        assert_eq!(stats.inserted, 1);
    }

    #[test]
    fn test_restore_drops_invalid_and_reapplies_rules() {
        let mut bad = event(9, "Swap", 100);
        bad.tx_hash = "0x1234".into();
        let mut nameless = event(8, "", 100);
        nameless.event_name.clear();

        let records = vec![
            event(1, "Swap", 100),
            event(1, "Swap", 150),
            bad,
            nameless,
            event(2, "Sync", 10),
            event(3, "Mint", 4000),
        ];
        let mut w = HistoryWindow::new(3600, 300);
        // at t=3650 the event observed at 10 is past the horizon
        assert_eq!(w.restore(records, 3650), 2);
        let names: Vec<&str> = w.iter().map(|e| e.event_name.as_str()).collect();
        assert_eq!(names, vec!["Swap", "Mint"]);
    }

    #[test]
    fn test_latest_from_source_and_label() {
        let mut w = HistoryWindow::new(3600, 300);
        let mut vault = event(2, "Rebalanced", 100);
        vault.source = Source::Vault;
        w.merge(vec![event(1, "Swap", 100), vault, event(3, "Sync", 100)]);
        let last = w.latest_from(Source::Vault).unwrap();
        assert_eq!(last.label(), "Vault Rebalanced");
        assert_eq!(last.short_tx(), "0x02020202…020202");
    }
}
