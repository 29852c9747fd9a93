//! Read-only output model for presentation.
//!
//! Writers (the indexer and sampler tasks) publish through a `watch` channel;
//! readers hold a `Receiver` and always see the latest complete state.

use alloy::primitives::U256;
use std::sync::Arc;
use tokio::sync::watch;

use crate::events::Source;
use crate::indexer::{HistoryWindow, LogEvent};
use crate::policy::PolicyAssessment;
use crate::series::{SeriesPoint, TimeSeries};
use crate::snapshot::{PoolSnapshot, VaultSnapshot};

#[derive(Debug, Clone, Default)]
pub struct TelemetryState {
    /// Retained events, oldest first.
    pub history: Vec<LogEvent>,
    /// Most recent retained vault-side event.
    pub last_vault_action: Option<LogEvent>,
    pub vault_series: Vec<SeriesPoint>,
    pub pool_series: Vec<SeriesPoint>,
    pub vault: Option<VaultSnapshot>,
    pub pool: Option<PoolSnapshot>,
    pub policy: Option<PolicyAssessment>,
    pub daily_budget_abs: Option<U256>,
    pub budget_pct: Option<f64>,
    pub stable_share_pct: Option<f64>,
    pub history_updated_at: u64,
    pub snapshot_updated_at: u64,
}

/// Everything one sampler tick produced.
#[derive(Debug, Clone)]
pub struct SampleUpdate {
    pub vault: VaultSnapshot,
    pub pool: PoolSnapshot,
    pub policy: PolicyAssessment,
    pub daily_budget_abs: Option<U256>,
}

#[derive(Clone)]
pub struct Telemetry {
    tx: Arc<watch::Sender<TelemetryState>>,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(TelemetryState::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<TelemetryState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> TelemetryState {
        self.tx.borrow().clone()
    }

    pub fn publish_history(&self, window: &HistoryWindow, now: u64) {
        let history: Vec<LogEvent> = window.iter().cloned().collect();
        let last_vault_action = window.latest_from(Source::Vault).cloned();
        self.tx.send_modify(|state| {
            state.history = history;
            state.last_vault_action = last_vault_action;
            state.history_updated_at = now;
        });
    }

    pub fn publish_samples(
        &self,
        update: SampleUpdate,
        vault_series: &TimeSeries,
        pool_series: &TimeSeries,
        now: u64,
    ) {
        let vault_points: Vec<SeriesPoint> = vault_series.iter().cloned().collect();
        let pool_points: Vec<SeriesPoint> = pool_series.iter().cloned().collect();
        let budget_pct = update.vault.budget_pct(update.daily_budget_abs);
        let stable_share_pct = update.vault.stable_share_pct();
        self.tx.send_modify(|state| {
            state.vault_series = vault_points;
            state.pool_series = pool_points;
            state.vault = Some(update.vault);
            state.pool = Some(update.pool);
            state.policy = Some(update.policy);
            state.daily_budget_abs = update.daily_budget_abs;
            state.budget_pct = budget_pct;
            state.stable_share_pct = stable_share_pct;
            state.snapshot_updated_at = now;
        });
    }
}
