//! Advisory vault status classification.
//!
//! This is a client-side mirror of the vault's own gating rules, computed
//! from the latest snapshot for display. It never blocks or permits an
//! on-chain action, and nothing guarantees the chain agrees with it at the
//! moment a transaction lands: the snapshot may be a tick old and the
//! contract re-checks everything itself.
//!
//! Rules are checked in a fixed order and the first match wins:
//! 1. cooldown (`nextAllowedAt > now`)
//! 2. stress (`stressRatioBps > stressMaxBps`)
//! 3. budget (`dailyBudgetAbs > 0 && spentTodayAbs >= dailyBudgetAbs`)
//! 4. active
//!
//! A rule whose inputs are unknown is skipped and named in `unresolved`.
//! A missing `nextAllowedAt` is evaluated as no cooldown (zero is the neutral
//! value there) but is still reported as unresolved.

use alloy::primitives::U256;
use serde::Serialize;

use crate::snapshot::VaultSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PolicyStatus {
    Active,
    Cooldown,
    StressSkip,
    BudgetExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Ok,
    Warning,
    Critical,
}

impl PolicyStatus {
    pub fn label(&self) -> &'static str {
        match self {
            PolicyStatus::Active => "Active",
            PolicyStatus::Cooldown => "Cooldown",
            PolicyStatus::StressSkip => "Skip (Stress)",
            PolicyStatus::BudgetExhausted => "Budget reached",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            PolicyStatus::Active => Severity::Ok,
            PolicyStatus::Cooldown => Severity::Warning,
            PolicyStatus::StressSkip | PolicyStatus::BudgetExhausted => Severity::Critical,
        }
    }
}

impl std::fmt::Display for PolicyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyInputs {
    pub now: u64,
    pub next_allowed_at: Option<u64>,
    pub stress_ratio_bps: Option<u64>,
    pub stress_max_bps: Option<u64>,
    pub spent_today_abs: Option<U256>,
    pub daily_budget_abs: Option<U256>,
}

impl PolicyInputs {
    pub fn from_snapshot(snapshot: &VaultSnapshot, now: u64, budget_override: Option<U256>) -> Self {
        Self {
            now,
            next_allowed_at: snapshot.next_allowed_at,
            stress_ratio_bps: snapshot.stress_ratio_bps,
            stress_max_bps: snapshot.stress_max_bps,
            spent_today_abs: snapshot.spent_today_abs,
            daily_budget_abs: snapshot.daily_budget_abs(budget_override),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyAssessment {
    pub status: PolicyStatus,
    /// Inputs that were unknown, so their rule was not applied.
    pub unresolved: Vec<&'static str>,
}

impl PolicyAssessment {
    pub fn label(&self) -> &'static str {
        self.status.label()
    }

    pub fn severity(&self) -> Severity {
        self.status.severity()
    }
}

pub fn evaluate(inputs: &PolicyInputs) -> PolicyAssessment {
    let mut unresolved = Vec::new();
    if inputs.next_allowed_at.is_none() {
        unresolved.push("nextAllowedAt");
    }

    let cooldown = inputs.next_allowed_at.unwrap_or(0) > inputs.now;
    if cooldown {
        return PolicyAssessment {
            status: PolicyStatus::Cooldown,
            unresolved,
        };
    }

    match (inputs.stress_ratio_bps, inputs.stress_max_bps) {
        (Some(ratio), Some(max)) if ratio > max => {
            return PolicyAssessment {
                status: PolicyStatus::StressSkip,
                unresolved,
            };
        }
        (Some(_), Some(_)) => {}
        (ratio, max) => {
            if ratio.is_none() {
                unresolved.push("stressRatioBps");
            }
            if max.is_none() {
                unresolved.push("stressMaxBps");
            }
        }
    }

    match (inputs.spent_today_abs, inputs.daily_budget_abs) {
        (Some(spent), Some(budget)) if !budget.is_zero() && spent >= budget => {
            return PolicyAssessment {
                status: PolicyStatus::BudgetExhausted,
                unresolved,
            };
        }
        (Some(_), Some(_)) => {}
        (spent, budget) => {
            if spent.is_none() {
                unresolved.push("spentTodayAbs");
            }
            if budget.is_none() {
                unresolved.push("dailyBudgetAbs");
            }
        }
    }

    PolicyAssessment {
        status: PolicyStatus::Active,
        unresolved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000;

    fn inputs(next: u64, ratio: u64, max: u64, spent: u64, budget: u64) -> PolicyInputs {
        PolicyInputs {
            now: NOW,
            next_allowed_at: Some(next),
            stress_ratio_bps: Some(ratio),
            stress_max_bps: Some(max),
            spent_today_abs: Some(U256::from(spent)),
            daily_budget_abs: Some(U256::from(budget)),
        }
    }

    #[test]
    fn test_cooldown_scenario() {
        let a = evaluate(&inputs(NOW + 120, 50, 500, 0, 1000));
        assert_eq!(a.status, PolicyStatus::Cooldown);
        assert_eq!(a.severity(), Severity::Warning);
    }

    #[test]
    fn test_stress_scenario() {
        let a = evaluate(&inputs(0, 600, 500, 0, 1000));
        assert_eq!(a.status, PolicyStatus::StressSkip);
        assert_eq!(a.label(), "Skip (Stress)");
    }

    #[test]
    fn test_budget_boundary_is_inclusive() {
        assert_eq!(
            evaluate(&inputs(0, 10, 500, 1000, 1000)).status,
            PolicyStatus::BudgetExhausted
        );
        assert_eq!(evaluate(&inputs(0, 10, 500, 500, 1000)).status, PolicyStatus::Active);
        // a zero budget never exhausts
        assert_eq!(evaluate(&inputs(0, 10, 500, 500, 0)).status, PolicyStatus::Active);
    }

    #[test]
    fn test_cooldown_dominates_everything() {
        let a = evaluate(&inputs(NOW + 1, 900, 500, 5000, 1000));
        assert_eq!(a.status, PolicyStatus::Cooldown);
        // stress still beats budget
        let a = evaluate(&inputs(NOW, 900, 500, 5000, 1000));
        assert_eq!(a.status, PolicyStatus::StressSkip);
    }

    #[test]
    fn test_unknown_inputs_skip_rules_and_are_reported() {
        let a = evaluate(&PolicyInputs {
            now: NOW,
            next_allowed_at: None,
            stress_ratio_bps: Some(600),
            stress_max_bps: None,
            spent_today_abs: Some(U256::from(10u64)),
            daily_budget_abs: None,
        });
        assert_eq!(a.status, PolicyStatus::Active);
        assert_eq!(
            a.unresolved,
            vec!["nextAllowedAt", "stressMaxBps", "dailyBudgetAbs"]
        );
    }

    #[test]
    fn test_far_future_cooldown_and_unknown_cooldown() {
        let mut far = inputs(u64::MAX, 10, 500, 0, 1000);
        assert_eq!(evaluate(&far).status, PolicyStatus::Cooldown);

        far.next_allowed_at = None;
        let a = evaluate(&far);
        assert_eq!(a.status, PolicyStatus::Active);
        assert_eq!(a.unresolved, vec!["nextAllowedAt"]);
    }

    #[test]
    fn test_inputs_from_snapshot_derive_budget() {
        let one = U256::from(10u64).pow(U256::from(18u64));
        let snap = VaultSnapshot {
            dft_balance: Some(U256::ZERO),
            stable_balance: Some(U256::from(1000u64) * one),
            ema_long: Some(one),
            spent_today_abs: Some(U256::from(10u64) * one),
            daily_budget_bps: Some(100),
            next_allowed_at: Some(0),
            stress_ratio_bps: Some(0),
            stress_max_bps: Some(500),
            ..VaultSnapshot::default()
        };
        let inputs = PolicyInputs::from_snapshot(&snap, NOW, None);
        assert_eq!(inputs.daily_budget_abs, Some(U256::from(10u64) * one));
        assert_eq!(evaluate(&inputs).status, PolicyStatus::BudgetExhausted);
    }
}
