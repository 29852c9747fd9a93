//! Point-in-time reads of vault and pool state.
//!
//! A snapshot is ephemeral: it is taken once per sampler tick, fed to the
//! series aggregators and the policy evaluator, published, and dropped. Every
//! field is optional. A read that failed or timed out leaves its field `None`,
//! which downstream code treats as unknown rather than zero.

use alloy::primitives::{Address, U256};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::chain::{with_timeout, ChainReader, ContractCall};
use crate::config::ContractAddresses;
use crate::events::format::fixed18_to_f64;

const BPS_DENOMINATOR: u64 = 10_000;

fn one_e18() -> U256 {
    U256::from(10u64).pow(U256::from(18u64))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VaultSnapshot {
    pub taken_at: u64,
    /// DFT held by the vault (18 decimals).
    pub dft_balance: Option<U256>,
    /// Stable held by the vault (18 decimals).
    pub stable_balance: Option<U256>,
    /// Short EMA of the DFT price in stable (18 decimals).
    pub ema_short: Option<U256>,
    /// Long EMA of the DFT price in stable (18 decimals).
    pub ema_long: Option<U256>,
    /// Stable-equivalent spent in the current day window (18 decimals).
    pub spent_today_abs: Option<U256>,
    /// Unix seconds before which the vault will not act again.
    pub next_allowed_at: Option<u64>,
    pub stress_ratio_bps: Option<u64>,
    pub stress_max_bps: Option<u64>,
    pub daily_budget_bps: Option<u64>,
}

impl VaultSnapshot {
    /// Vault value in stable-equivalent: `stable + dft × emaLong`.
    pub fn value_stable_eq(&self) -> Option<U256> {
        let dft = self.dft_balance?;
        let stable = self.stable_balance?;
        let ema = self.ema_long?;
        let dft_in_stable = dft.saturating_mul(ema) / one_e18();
        Some(stable.saturating_add(dft_in_stable))
    }

    /// Absolute daily budget. A configured override wins; otherwise it is
    /// `value × dailyBudgetBps / 10 000` on the unrounded integers.
    pub fn daily_budget_abs(&self, override_abs: Option<U256>) -> Option<U256> {
        if override_abs.is_some() {
            return override_abs;
        }
        let bps = self.daily_budget_bps?;
        let value = self.value_stable_eq()?;
        Some(value.saturating_mul(U256::from(bps)) / U256::from(BPS_DENOMINATOR))
    }

    /// Share of the daily budget already spent, in percent.
    pub fn budget_pct(&self, override_abs: Option<U256>) -> Option<f64> {
        let budget = self.daily_budget_abs(override_abs)?;
        if budget.is_zero() {
            return None;
        }
        let spent = self.spent_today_abs?;
        Some(100.0 * fixed18_to_f64(spent) / fixed18_to_f64(budget))
    }

    /// Stable balance as a share of both balances, in percent.
    pub fn stable_share_pct(&self) -> Option<f64> {
        let stable = fixed18_to_f64(self.stable_balance?);
        let dft = fixed18_to_f64(self.dft_balance?);
        let total = stable + dft;
        if total <= 0.0 {
            return None;
        }
        Some(100.0 * stable / total)
    }

    pub fn is_cooldown(&self, now: u64) -> Option<bool> {
        self.next_allowed_at.map(|at| at > now)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub taken_at: u64,
    /// `getReserves()`: (DFT reserve, stable reserve).
    pub reserves: Option<(U256, U256)>,
    /// `getPrices()`: (DFT priced in stable, stable priced in DFT).
    pub prices: Option<(U256, U256)>,
}

/// Reads snapshots through a `ChainReader`, every call under the read timeout.
pub struct SnapshotSampler {
    reader: Arc<dyn ChainReader>,
    addresses: ContractAddresses,
    read_timeout: Duration,
}

impl SnapshotSampler {
    pub fn new(
        reader: Arc<dyn ChainReader>,
        addresses: ContractAddresses,
        read_timeout: Duration,
    ) -> Self {
        Self {
            reader,
            addresses,
            read_timeout,
        }
    }

    pub async fn sample_vault(&self, now: u64) -> VaultSnapshot {
        let vault = self.addresses.vault;
        let balance_of = ContractCall::new("balanceOf(address)").with_address(vault);
        let ema_short_call = ContractCall::new("emaShort()");
        let ema_long_call = ContractCall::new("emaLong()");
        let spent_call = ContractCall::new("spentTodayStableEq()");
        let next_call = ContractCall::new("nextAllowedAt()");
        let stress_call = ContractCall::new("stressRatioBps()");
        let stress_max_call = ContractCall::new("stressMaxBps()");
        let budget_bps_call = ContractCall::new("dailyBudgetBps()");

        let (
            dft_balance,
            stable_balance,
            ema_short,
            ema_long,
            spent_today_abs,
            next_allowed_at,
            stress_ratio_bps,
            stress_max_bps,
            daily_budget_bps,
        ) = tokio::join!(
            self.uint(self.addresses.dft, &balance_of, "dftBalance"),
            self.uint(self.addresses.stable, &balance_of, "stableBalance"),
            self.uint(vault, &ema_short_call, "emaShort"),
            self.uint(vault, &ema_long_call, "emaLong"),
            self.uint(vault, &spent_call, "spentTodayAbs"),
            self.timestamp(vault, &next_call, "nextAllowedAt"),
            self.small(vault, &stress_call, "stressRatioBps"),
            self.small(vault, &stress_max_call, "stressMaxBps"),
            self.small(vault, &budget_bps_call, "dailyBudgetBps"),
        );

        VaultSnapshot {
            taken_at: now,
            dft_balance,
            stable_balance,
            ema_short,
            ema_long,
            spent_today_abs,
            next_allowed_at,
            stress_ratio_bps,
            stress_max_bps,
            daily_budget_bps,
        }
    }

    pub async fn sample_pool(&self, now: u64) -> PoolSnapshot {
        let pool = self.addresses.pool;
        let reserves_call = ContractCall::new("getReserves()");
        let prices_call = ContractCall::new("getPrices()");
        let (reserves, prices) = tokio::join!(
            self.pair(pool, &reserves_call, "reserves"),
            self.pair(pool, &prices_call, "prices"),
        );
        PoolSnapshot {
            taken_at: now,
            reserves,
            prices,
        }
    }

    async fn uint(&self, contract: Address, call: &ContractCall, field: &'static str) -> Option<U256> {
        match with_timeout(self.read_timeout, self.reader.read_uint(contract, call)).await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(field = field, call = call.signature, error = %e, "snapshot read failed, field unknown");
                None
            }
        }
    }

    /// A unix timestamp. Anything past u64 is still "later than now", so it
    /// saturates instead of becoming unknown.
    async fn timestamp(&self, contract: Address, call: &ContractCall, field: &'static str) -> Option<u64> {
        let value = self.uint(contract, call, field).await?;
        Some(u64::try_from(value).unwrap_or(u64::MAX))
    }

    /// A uint that must fit in u64 (basis points).
    async fn small(&self, contract: Address, call: &ContractCall, field: &'static str) -> Option<u64> {
        let value = self.uint(contract, call, field).await?;
        match u64::try_from(value) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(field = field, value = %value, "snapshot value out of range, field unknown");
                None
            }
        }
    }

    async fn pair(
        &self,
        contract: Address,
        call: &ContractCall,
        field: &'static str,
    ) -> Option<(U256, U256)> {
        match with_timeout(self.read_timeout, self.reader.read_tuple(contract, call, 2)).await {
            Ok(words) => Some((words[0], words[1])),
            Err(e) => {
                warn!(field = field, call = call.signature, error = %e, "snapshot read failed, field unknown");
                None
            }
        }
    }
}
