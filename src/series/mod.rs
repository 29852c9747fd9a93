//! Bounded chronological metric series for trend display.
//!
//! A `SeriesAggregator` turns each snapshot into one `SeriesPoint` through a
//! `MetricGroup`, appends it, prunes by age and persists. When any input the
//! group needs is unknown the point is skipped entirely: a series never
//! contains a placeholder zero or NaN.

use alloy::primitives::U256;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::events::format::fixed18_to_f64;
use crate::snapshot::{PoolSnapshot, VaultSnapshot};
use crate::store::{bigint, load_records, save_records, PersistenceStore, POOL_SERIES_KEY, VAULT_SERIES_KEY};

/// A metric value. Ratios and prices are floats; raw 18-decimal amounts are
/// kept as integers and persisted with the large-integer marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Float(f64),
    Amount(U256),
}

impl MetricValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            MetricValue::Float(v) => *v,
            MetricValue::Amount(v) => fixed18_to_f64(*v),
        }
    }

    fn is_valid(&self) -> bool {
        match self {
            MetricValue::Float(v) => v.is_finite(),
            MetricValue::Amount(_) => true,
        }
    }
}

impl Serialize for MetricValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MetricValue::Float(v) => serializer.serialize_f64(*v),
            MetricValue::Amount(v) => bigint::serialize(v, serializer),
        }
    }
}

impl<'de> Deserialize<'de> for MetricValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Number(v) => Ok(MetricValue::Float(v)),
            Raw::Text(text) => bigint::decode(&text)
                .map(MetricValue::Amount)
                .ok_or_else(|| de::Error::custom(format!("not a metric value: {text:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub ts: u64,
    #[serde(flatten)]
    pub metrics: BTreeMap<String, MetricValue>,
}

impl SeriesPoint {
    pub fn get(&self, metric: &str) -> Option<&MetricValue> {
        self.metrics.get(metric)
    }
}

/// Chronological points no older than the retention horizon.
#[derive(Debug, Clone)]
pub struct TimeSeries {
    points: VecDeque<SeriesPoint>,
    retention_secs: u64,
}

impl TimeSeries {
    pub fn new(retention_secs: u64) -> Self {
        Self {
            points: VecDeque::new(),
            retention_secs,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &SeriesPoint> {
        self.points.iter()
    }

    pub fn last(&self) -> Option<&SeriesPoint> {
        self.points.back()
    }

    /// Append and prune against `now`. Returns how many points were pruned.
    pub fn push(&mut self, point: SeriesPoint, now: u64) -> usize {
        self.points.push_back(point);
        self.prune(now)
    }

    pub fn prune(&mut self, now: u64) -> usize {
        let retention = self.retention_secs;
        let before = self.points.len();
        self.points
            .retain(|p| now.saturating_sub(p.ts) <= retention);
        before - self.points.len()
    }

    /// Rebuild from persisted points, dropping non-finite values and any
    /// point that goes back in time.
    pub fn restore(&mut self, records: Vec<SeriesPoint>, now: u64) -> usize {
        self.points.clear();
        for point in records {
            if let Some(bad) = point.metrics.iter().find(|(_, v)| !v.is_valid()) {
                warn!(ts = point.ts, metric = %bad.0, "dropping persisted point with non-finite value");
                continue;
            }
            if self.points.back().map_or(false, |last| point.ts < last.ts) {
                warn!(ts = point.ts, "dropping out-of-order persisted point");
                continue;
            }
            self.points.push_back(point);
        }
        self.prune(now);
        self.points.len()
    }
}

/// A named set of metrics derived from one kind of snapshot.
pub trait MetricGroup: Send + Sync {
    type Input: Send + Sync;

    fn name(&self) -> &'static str;

    /// Persistence key for this group's series.
    fn store_key(&self) -> &'static str;

    /// Every metric of the group, or the names of the inputs that were
    /// missing (or of derived values that came out non-finite).
    fn derive(&self, input: &Self::Input) -> Result<BTreeMap<String, MetricValue>, Vec<&'static str>>;
}

/// `ema30`, `ema120` and `spot` from the vault snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct VaultPrice;

impl MetricGroup for VaultPrice {
    type Input = VaultSnapshot;

    fn name(&self) -> &'static str {
        "vault_price"
    }

    fn store_key(&self) -> &'static str {
        VAULT_SERIES_KEY
    }

    fn derive(&self, snap: &VaultSnapshot) -> Result<BTreeMap<String, MetricValue>, Vec<&'static str>> {
        let mut missing = Vec::new();
        if snap.ema_short.is_none() {
            missing.push("emaShort");
        }
        if snap.ema_long.is_none() {
            missing.push("emaLong");
        }
        if snap.stable_balance.is_none() {
            missing.push("stableBalance");
        }
        match snap.dft_balance {
            None => missing.push("dftBalance"),
            // spot is undefined without DFT in the vault
            Some(dft) if dft.is_zero() => missing.push("spot"),
            Some(_) => {}
        }
        let (Some(short), Some(long), Some(stable), Some(dft), true) = (
            snap.ema_short,
            snap.ema_long,
            snap.stable_balance,
            snap.dft_balance,
            missing.is_empty(),
        ) else {
            return Err(missing);
        };

        let values = [
            ("ema30", fixed18_to_f64(short)),
            ("ema120", fixed18_to_f64(long)),
            ("spot", fixed18_to_f64(stable) / fixed18_to_f64(dft)),
        ];
        // JSON has no infinity; one such value would void the whole blob
        let non_finite: Vec<&'static str> = values
            .iter()
            .filter(|(_, v)| !v.is_finite())
            .map(|(name, _)| *name)
            .collect();
        if !non_finite.is_empty() {
            return Err(non_finite);
        }
        Ok(values
            .into_iter()
            .map(|(name, v)| (name.to_string(), MetricValue::Float(v)))
            .collect())
    }
}

/// `dftReserve` and `stableReserve` from the pool snapshot, as raw amounts.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolReserves;

impl MetricGroup for PoolReserves {
    type Input = PoolSnapshot;

    fn name(&self) -> &'static str {
        "pool_reserves"
    }

    fn store_key(&self) -> &'static str {
        POOL_SERIES_KEY
    }

    fn derive(&self, snap: &PoolSnapshot) -> Result<BTreeMap<String, MetricValue>, Vec<&'static str>> {
        let (dft, stable) = snap.reserves.ok_or_else(|| vec!["reserves"])?;
        let mut metrics = BTreeMap::new();
        metrics.insert("dftReserve".to_string(), MetricValue::Amount(dft));
        metrics.insert("stableReserve".to_string(), MetricValue::Amount(stable));
        Ok(metrics)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended { pruned: usize },
    Skipped { missing: Vec<&'static str> },
}

/// Owns one group's series and its persistence key.
pub struct SeriesAggregator<G: MetricGroup> {
    group: G,
    series: TimeSeries,
    store: Arc<dyn PersistenceStore>,
    dirty: bool,
}

impl<G: MetricGroup> SeriesAggregator<G> {
    pub fn new(group: G, store: Arc<dyn PersistenceStore>, retention_secs: u64) -> Self {
        Self {
            group,
            series: TimeSeries::new(retention_secs),
            store,
            dirty: false,
        }
    }

    pub fn series(&self) -> &TimeSeries {
        &self.series
    }

    pub fn group(&self) -> &G {
        &self.group
    }

    pub async fn hydrate(&mut self, now: u64) -> usize {
        let key = self.group.store_key();
        let records: Vec<SeriesPoint> = load_records(self.store.as_ref(), key).await;
        let kept = self.series.restore(records, now);
        debug!(group = self.group.name(), kept = kept, "series hydrated");
        kept
    }

    pub async fn on_snapshot(&mut self, input: &G::Input, now: u64) -> AppendOutcome {
        let outcome = match self.group.derive(input) {
            Ok(metrics) => {
                let pruned = self.series.push(SeriesPoint { ts: now, metrics }, now);
                self.dirty = true;
                AppendOutcome::Appended { pruned }
            }
            Err(missing) => {
                debug!(group = self.group.name(), missing = ?missing, "series point skipped");
                if self.series.prune(now) > 0 {
                    self.dirty = true;
                }
                AppendOutcome::Skipped { missing }
            }
        };
        self.persist().await;
        outcome
    }

    pub async fn prune(&mut self, now: u64) -> usize {
        let pruned = self.series.prune(now);
        if pruned > 0 {
            self.dirty = true;
            self.persist().await;
        }
        pruned
    }

    async fn persist(&mut self) {
        if !self.dirty {
            return;
        }
        let key = self.group.store_key();
        match save_records(self.store.as_ref(), key, self.series.iter()).await {
            Ok(()) => self.dirty = false,
            Err(e) => warn!(key = key, error = %e, "failed to persist series"),
        }
    }
}
