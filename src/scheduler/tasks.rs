//! The daemon's two periodic tasks.

use alloy::primitives::U256;
use async_trait::async_trait;
use tracing::{info, warn};

use super::PeriodicTask;
use crate::indexer::LogWindowIndexer;
use crate::policy::{evaluate, PolicyInputs, PolicyStatus};
use crate::series::{PoolReserves, SeriesAggregator, VaultPrice};
use crate::snapshot::SnapshotSampler;
use crate::telemetry::{SampleUpdate, Telemetry};

/// Polls contract logs into the event window.
pub struct IndexerTask {
    indexer: LogWindowIndexer,
    telemetry: Telemetry,
}

impl IndexerTask {
    pub fn new(indexer: LogWindowIndexer, telemetry: Telemetry) -> Self {
        Self { indexer, telemetry }
    }

    pub fn indexer(&self) -> &LogWindowIndexer {
        &self.indexer
    }
}

#[async_trait]
impl PeriodicTask for IndexerTask {
    fn name(&self) -> &'static str {
        "indexer"
    }

    async fn tick(&mut self, now: u64) {
        let report = self.indexer.poll(now).await;
        if !report.is_clean() {
            warn!(
                failed_ranges = report.failed_ranges(),
                decode_failures = report.decode_failures.len(),
                head_error = report.head_error.is_some(),
                persist_error = report.persist_error.is_some(),
                "indexer tick completed with partial failures"
            );
        }
        self.telemetry.publish_history(self.indexer.window(), now);
    }
}

/// Samples vault and pool state, feeds both series and classifies the vault.
pub struct SamplerTask {
    sampler: SnapshotSampler,
    vault_series: SeriesAggregator<VaultPrice>,
    pool_series: SeriesAggregator<PoolReserves>,
    budget_override: Option<U256>,
    last_status: Option<PolicyStatus>,
    telemetry: Telemetry,
}

impl SamplerTask {
    pub fn new(
        sampler: SnapshotSampler,
        vault_series: SeriesAggregator<VaultPrice>,
        pool_series: SeriesAggregator<PoolReserves>,
        budget_override: Option<U256>,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            sampler,
            vault_series,
            pool_series,
            budget_override,
            last_status: None,
            telemetry,
        }
    }
}

#[async_trait]
impl PeriodicTask for SamplerTask {
    fn name(&self) -> &'static str {
        "sampler"
    }

    async fn tick(&mut self, now: u64) {
        let (vault, pool) = tokio::join!(
            self.sampler.sample_vault(now),
            self.sampler.sample_pool(now),
        );

        self.vault_series.on_snapshot(&vault, now).await;
        self.pool_series.on_snapshot(&pool, now).await;

        let inputs = PolicyInputs::from_snapshot(&vault, now, self.budget_override);
        let assessment = evaluate(&inputs);
        if self.last_status != Some(assessment.status) {
            info!(
                from = ?self.last_status,
                to = %assessment.status,
                severity = ?assessment.severity(),
                unresolved = ?assessment.unresolved,
                "vault status changed"
            );
            self.last_status = Some(assessment.status);
        }

        self.telemetry.publish_samples(
            SampleUpdate {
                vault,
                pool,
                policy: assessment,
                daily_budget_abs: inputs.daily_budget_abs,
            },
            self.vault_series.series(),
            self.pool_series.series(),
            now,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::fake::FakeChainReader;
    use crate::chain::ContractCall;
    use crate::config::{ContractAddresses, RetentionClock};
    use crate::events::EventRegistry;
    use crate::indexer::IndexerSettings;
    use crate::store::MemoryStore;
    use alloy::primitives::Address;
    use std::sync::Arc;
    use std::time::Duration;

    fn e18(n: u64) -> U256 {
        U256::from(n) * U256::from(10u64).pow(U256::from(18u64))
    }

    fn addresses() -> ContractAddresses {
        ContractAddresses {
            pool: Address::repeat_byte(0xaa),
            vault: Address::repeat_byte(0xbb),
            dft: Address::repeat_byte(0xcc),
            stable: Address::repeat_byte(0xdd),
        }
    }

    fn script_vault(reader: &FakeChainReader, addrs: &ContractAddresses, next_allowed_at: u64) {
        let balance_of = ContractCall::new("balanceOf(address)").with_address(addrs.vault);
        reader.set_call(addrs.dft, &balance_of, vec![e18(1_000)]);
        reader.set_call(addrs.stable, &balance_of, vec![e18(2_000)]);
        let v = addrs.vault;
        reader.set_call(v, &ContractCall::new("emaShort()"), vec![e18(2)]);
        reader.set_call(v, &ContractCall::new("emaLong()"), vec![e18(3)]);
        reader.set_call(v, &ContractCall::new("spentTodayStableEq()"), vec![e18(10)]);
        reader.set_call(v, &ContractCall::new("nextAllowedAt()"), vec![U256::from(next_allowed_at)]);
        reader.set_call(v, &ContractCall::new("stressRatioBps()"), vec![U256::from(10)]);
        reader.set_call(v, &ContractCall::new("stressMaxBps()"), vec![U256::from(500)]);
        reader.set_call(v, &ContractCall::new("dailyBudgetBps()"), vec![U256::from(100)]);
        reader.set_call(
            addrs.pool,
            &ContractCall::new("getReserves()"),
            vec![e18(50), e18(125), U256::ZERO],
        );
    }

    #[tokio::test]
    async fn test_sampler_tick_publishes_everything() {
        let addrs = addresses();
        let reader = Arc::new(FakeChainReader::new(1));
        script_vault(&reader, &addrs, 0);
        let store = Arc::new(MemoryStore::new());
        let telemetry = Telemetry::new();

        let mut task = SamplerTask::new(
            SnapshotSampler::new(reader.clone(), addrs, Duration::from_millis(100)),
            SeriesAggregator::new(VaultPrice, store.clone(), 3600),
            SeriesAggregator::new(PoolReserves, store.clone(), 3600),
            None,
            telemetry.clone(),
        );
        task.tick(1_000).await;

        let state = telemetry.current();
        assert_eq!(state.snapshot_updated_at, 1_000);
        assert_eq!(state.vault_series.len(), 1);
        assert_eq!(state.pool_series.len(), 1);
        assert_eq!(state.policy.as_ref().map(|p| p.status), Some(PolicyStatus::Active));
        // (2000 + 1000 × 3) × 1% = 50
        assert_eq!(state.daily_budget_abs, Some(e18(50)));
        assert_eq!(state.budget_pct, Some(20.0));
        assert!(state.pool.and_then(|p| p.prices).is_none());

        // next tick the vault enters cooldown
        script_vault(&reader, &addrs, 5_000);
        task.tick(1_010).await;
        assert_eq!(task.last_status, Some(PolicyStatus::Cooldown));
        assert_eq!(telemetry.current().vault_series.len(), 2);
    }

    #[tokio::test]
    async fn test_indexer_tick_publishes_window() {
        let reader = Arc::new(FakeChainReader::new(10));
        let store = Arc::new(MemoryStore::new());
        let indexer = LogWindowIndexer::new(
            reader,
            store,
            EventRegistry::new(Address::repeat_byte(0xaa), Address::repeat_byte(0xbb)),
            IndexerSettings {
                max_block_span: 5,
                read_timeout: Duration::from_millis(100),
                retention_secs: 3600,
                capacity: 10,
                cold_start_lookback_blocks: 10,
                retention_clock: RetentionClock::Local,
            },
        );
        let telemetry = Telemetry::new();
        let mut task = IndexerTask::new(indexer, telemetry.clone());
        task.tick(2_000).await;

        assert_eq!(task.indexer().checkpoint(), Some(10));
        let state = telemetry.current();
        assert_eq!(state.history_updated_at, 2_000);
        assert!(state.history.is_empty());
    }
}
