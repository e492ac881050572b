// agentgate-gateway/src/rollout.rs
// ============================================================================
// Module: Canary Evaluator & Rollout Controller
// Description: Budget-gated canary verdicts and tenant rollout lifecycle.
// Purpose: Gate a candidate policy's promotion on drift and error budgets.
// Dependencies: agentgate-core
// ============================================================================

//! ## Overview
//! The canary evaluator is pure: it takes a replay summary, its deltas'
//! severities, and an observed error rate, and returns `pass`/`fail` against
//! a fixed budget. The rollout controller persists the resulting record and
//! exposes `advance_rollout`/`rollback_rollout`; starting a rollout for an
//! already-recorded `{tenant, baseline, candidate}` triple is idempotent.

use agentgate_core::CanaryVerdict;
use agentgate_core::ReplaySummary;
use agentgate_core::RolloutRecord;
use agentgate_core::RolloutStatus;
use agentgate_core::StoreError;
use agentgate_core::TraceStore;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// Canary budget thresholds.
#[derive(Debug, Clone, Copy)]
pub struct CanaryBudget {
    /// Maximum tolerated count of `critical`-severity deltas.
    pub max_critical: u64,
    /// Maximum tolerated count of `high`-severity deltas.
    pub max_high: u64,
    /// Maximum tolerated observed error rate.
    pub max_error_rate: f64,
}

impl Default for CanaryBudget {
    fn default() -> Self {
        Self { max_critical: 0, max_high: 2, max_error_rate: 0.02 }
    }
}

/// Evaluates a replay summary against a canary budget.
#[must_use]
pub fn evaluate_canary(summary: &ReplaySummary, error_rate: f64, budget: CanaryBudget) -> (CanaryVerdict, String, u64, u64) {
    let critical = *summary.by_severity.get("critical").unwrap_or(&0) as u64;
    let high = *summary.by_severity.get("high").unwrap_or(&0) as u64;
    let mut reasons = Vec::new();
    if critical > budget.max_critical {
        reasons.push(format!("critical drift {critical} exceeds budget {}", budget.max_critical));
    }
    if high > budget.max_high {
        reasons.push(format!("high drift {high} exceeds budget {}", budget.max_high));
    }
    if error_rate > budget.max_error_rate {
        reasons.push(format!("error rate {error_rate} exceeds budget {}", budget.max_error_rate));
    }
    if reasons.is_empty() {
        (CanaryVerdict::Pass, "within budget".to_string(), critical, high)
    } else {
        (CanaryVerdict::Fail, reasons.join("; "), critical, high)
    }
}

/// Errors raised by rollout controller operations.
#[derive(Debug, Error)]
pub enum RolloutError {
    /// The underlying store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The rollout is not in a state that allows the requested transition.
    #[error("rollout {0} is not in a state that allows this transition")]
    InvalidTransition(String),
}

/// Starts a rollout for `{tenant_id, baseline_version, candidate_version}`,
/// returning the existing record if one already exists for that triple.
///
/// # Errors
///
/// Returns [`RolloutError::Store`] on backend failure.
pub fn start_rollout(store: &dyn TraceStore, tenant_id: &str, baseline_version: &str, candidate_version: &str, summary: &ReplaySummary, error_rate: f64, budget: CanaryBudget) -> Result<RolloutRecord, RolloutError> {
    let rollout_id = deterministic_rollout_id(tenant_id, baseline_version, candidate_version);
    if let Ok(existing) = store.get_rollout(&rollout_id) {
        return Ok(existing);
    }
    let (verdict, reason, critical_drift, high_drift) = evaluate_canary(summary, error_rate, budget);
    let now = OffsetDateTime::now_utc();
    let status = match verdict {
        CanaryVerdict::Fail => RolloutStatus::RolledBack,
        CanaryVerdict::Pass => RolloutStatus::Promoting,
    };
    let record = RolloutRecord {
        rollout_id,
        tenant_id: tenant_id.to_string(),
        baseline_version: baseline_version.to_string(),
        candidate_version: candidate_version.to_string(),
        status,
        verdict,
        reason,
        critical_drift,
        high_drift,
        rolled_back: verdict == CanaryVerdict::Fail,
        created_at: now,
        updated_at: now,
    };
    store.create_rollout(&record)?;
    Ok(record)
}

fn deterministic_rollout_id(tenant_id: &str, baseline_version: &str, candidate_version: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, format!("{tenant_id}|{baseline_version}|{candidate_version}").as_bytes()).to_string()
}

/// Advances a `promoting` rollout to `completed`.
///
/// # Errors
///
/// Returns [`RolloutError::InvalidTransition`] if the rollout is not
/// currently `promoting`.
pub fn advance_rollout(store: &dyn TraceStore, rollout_id: &str) -> Result<RolloutRecord, RolloutError> {
    let mut rollout = store.get_rollout(rollout_id)?;
    if rollout.status != RolloutStatus::Promoting {
        return Err(RolloutError::InvalidTransition(rollout_id.to_string()));
    }
    rollout.status = RolloutStatus::Completed;
    rollout.updated_at = OffsetDateTime::now_utc();
    store.update_rollout(&rollout)?;
    Ok(rollout)
}

/// Forces a rollout to `rolled_back` with an explicit reason.
///
/// # Errors
///
/// Returns [`RolloutError::Store`] on backend failure.
pub fn rollback_rollout(store: &dyn TraceStore, rollout_id: &str, reason: &str) -> Result<RolloutRecord, RolloutError> {
    let mut rollout = store.get_rollout(rollout_id)?;
    rollout.status = RolloutStatus::RolledBack;
    rollout.rolled_back = true;
    rollout.reason = reason.to_string();
    rollout.updated_at = OffsetDateTime::now_utc();
    store.update_rollout(&rollout)?;
    Ok(rollout)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, reason = "Test-only assertions are permitted.")]
mod tests {
    use std::collections::BTreeMap;

    use agentgate_store_sqlite::SqliteTraceStore;

    use super::*;

    fn summary_with(critical: usize, high: usize) -> ReplaySummary {
        let mut by_severity = BTreeMap::new();
        by_severity.insert("critical".to_string(), critical);
        by_severity.insert("high".to_string(), high);
        ReplaySummary { run_id: "r1".to_string(), total_events: critical + high, drifted_events: critical + high, by_severity, by_root_cause: BTreeMap::new() }
    }

    #[test]
    fn within_budget_passes() {
        let (verdict, ..) = evaluate_canary(&summary_with(0, 1), 0.0, CanaryBudget::default());
        assert_eq!(verdict, CanaryVerdict::Pass);
    }

    #[test]
    fn critical_drift_fails() {
        let (verdict, ..) = evaluate_canary(&summary_with(1, 0), 0.0, CanaryBudget::default());
        assert_eq!(verdict, CanaryVerdict::Fail);
    }

    #[test]
    fn starting_rollout_twice_is_idempotent() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        let summary = summary_with(0, 0);
        let first = start_rollout(&store, "tenant-a", "v1", "v2", &summary, 0.0, CanaryBudget::default()).expect("starts");
        let second = start_rollout(&store, "tenant-a", "v1", "v2", &summary, 0.0, CanaryBudget::default()).expect("starts again");
        assert_eq!(first.rollout_id, second.rollout_id);
    }

    #[test]
    fn failing_canary_rolls_back_immediately() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        let rollout = start_rollout(&store, "tenant-a", "v1", "v2", &summary_with(1, 0), 0.0, CanaryBudget::default()).expect("starts");
        assert_eq!(rollout.status, RolloutStatus::RolledBack);
        assert!(rollout.rolled_back);
    }

    #[test]
    fn advance_then_complete() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        let rollout = start_rollout(&store, "tenant-a", "v1", "v2", &summary_with(0, 0), 0.0, CanaryBudget::default()).expect("starts");
        let completed = advance_rollout(&store, &rollout.rollout_id).expect("advances");
        assert_eq!(completed.status, RolloutStatus::Completed);
    }
}
