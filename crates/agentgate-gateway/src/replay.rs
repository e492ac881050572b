// agentgate-gateway/src/replay.rs
// ============================================================================
// Module: Policy Replay & Invariant Prover
// Description: Baseline-vs-candidate replay over historical traces, plus a
//              pure invariant prover over write-tool and unknown-tool probes.
// Purpose: Diff a candidate policy against recorded history before rollout.
// Dependencies: agentgate-core, agentgate-policy
// ============================================================================

//! ## Overview
//! Replay streams TraceEvents for a run's scope and re-evaluates both the
//! baseline and candidate local evaluator with the recorded
//! `approval_token_present`, persisting one [`ReplayDelta`] per event. The
//! invariant prover is pure — it never touches the trace store — and checks
//! three properties over the union of both evaluators' tool sets.

use agentgate_core::DeltaSeverity;
use agentgate_core::PolicyAction;
use agentgate_core::ReplayDelta;
use agentgate_core::ReplayRun;
use agentgate_core::ReplayRunStatus;
use agentgate_core::ReplaySummary;
use agentgate_core::StoreError;
use agentgate_core::TraceStore;
use agentgate_policy::LocalEvaluator;
use std::collections::BTreeMap;
use time::OffsetDateTime;

fn classify_severity(baseline: PolicyAction, candidate: PolicyAction, is_write_action: bool) -> DeltaSeverity {
    if baseline == candidate {
        return DeltaSeverity::Low;
    }
    match (baseline, candidate) {
        (PolicyAction::Allow, PolicyAction::Deny) => {
            if is_write_action { DeltaSeverity::Critical } else { DeltaSeverity::High }
        }
        (PolicyAction::Deny, PolicyAction::Allow) => {
            if is_write_action { DeltaSeverity::High } else { DeltaSeverity::Medium }
        }
        _ => DeltaSeverity::Medium,
    }
}

fn classify_root_cause(baseline_action: PolicyAction, candidate_action: PolicyAction, baseline_rule: Option<&str>, candidate_rule: Option<&str>, baseline_reason: &str, candidate_reason: &str) -> String {
    let is_allow_deny_pair = matches!(
        (baseline_action, candidate_action),
        (PolicyAction::Allow, PolicyAction::Deny) | (PolicyAction::Deny, PolicyAction::Allow)
    );
    if is_allow_deny_pair {
        return if baseline_action == PolicyAction::Allow { "access_restricted".to_string() } else { "access_expanded".to_string() };
    }
    if (baseline_action == PolicyAction::RequireApproval || candidate_action == PolicyAction::RequireApproval) && baseline_action != candidate_action {
        return "approval_path_changed".to_string();
    }
    if baseline_action == candidate_action && baseline_rule != candidate_rule {
        return "rule_path_changed".to_string();
    }
    if baseline_rule == candidate_rule && baseline_reason != candidate_reason {
        return "reason_changed".to_string();
    }
    "no_change".to_string()
}

/// Runs a replay over `run`'s scoped trace events, persisting one
/// [`ReplayDelta`] per event and marking the run completed.
///
/// # Errors
///
/// Returns [`StoreError`] on backend failure.
pub fn run_replay(store: &dyn TraceStore, run: &ReplayRun, baseline: &LocalEvaluator, candidate: &LocalEvaluator) -> Result<(), StoreError> {
    let events = match &run.session_id {
        Some(session_id) => store.trace_events_for_session(session_id)?,
        None => store.all_trace_events()?,
    };
    for event in events {
        let baseline_decision = baseline.evaluate(&event.tool_name, event.approval_token_present);
        let candidate_decision = candidate.evaluate(&event.tool_name, event.approval_token_present);
        let severity = classify_severity(baseline_decision.action, candidate_decision.action, event.is_write_action);
        let root_cause = classify_root_cause(
            baseline_decision.action,
            candidate_decision.action,
            baseline_decision.matched_rule.as_deref(),
            candidate_decision.matched_rule.as_deref(),
            &baseline_decision.reason,
            &candidate_decision.reason,
        );
        let explanation = format!("{} -> {} ({root_cause})", describe(baseline_decision.action), describe(candidate_decision.action));
        store.append_replay_delta(&ReplayDelta {
            run_id: run.run_id.clone(),
            event_id: event.event_id,
            tool_name: event.tool_name,
            baseline_action: baseline_decision.action,
            candidate_action: candidate_decision.action,
            severity,
            baseline_rule: baseline_decision.matched_rule,
            candidate_rule: candidate_decision.matched_rule,
            baseline_reason: baseline_decision.reason,
            candidate_reason: candidate_decision.reason,
            root_cause,
            explanation,
        })?;
    }
    let mut completed = run.clone();
    completed.status = ReplayRunStatus::Completed;
    completed.completed_at = Some(OffsetDateTime::now_utc());
    store.update_replay_run(&completed)
}

fn describe(action: PolicyAction) -> &'static str {
    match action {
        PolicyAction::Allow => "ALLOW",
        PolicyAction::Deny => "DENY",
        PolicyAction::RequireApproval => "REQUIRE_APPROVAL",
    }
}

/// Aggregates a run's persisted deltas into a [`ReplaySummary`].
///
/// # Errors
///
/// Returns [`StoreError`] on backend failure.
pub fn summarize(store: &dyn TraceStore, run_id: &str) -> Result<ReplaySummary, StoreError> {
    let deltas = store.replay_deltas_for_run(run_id)?;
    let mut by_severity = BTreeMap::new();
    let mut by_root_cause = BTreeMap::new();
    let mut drifted = 0usize;
    for delta in &deltas {
        if delta.baseline_action != delta.candidate_action {
            drifted += 1;
        }
        *by_severity.entry(severity_label(delta.severity).to_string()).or_insert(0) += 1;
        *by_root_cause.entry(delta.root_cause.clone()).or_insert(0) += 1;
    }
    Ok(ReplaySummary { run_id: run_id.to_string(), total_events: deltas.len(), drifted_events: drifted, by_severity, by_root_cause })
}

fn severity_label(severity: DeltaSeverity) -> &'static str {
    match severity {
        DeltaSeverity::Low => "low",
        DeltaSeverity::Medium => "medium",
        DeltaSeverity::High => "high",
        DeltaSeverity::Critical => "critical",
    }
}

/// A counterexample produced by the invariant prover.
#[derive(Debug, Clone)]
pub struct Counterexample {
    /// Invariant name the counterexample violates.
    pub invariant: &'static str,
    /// Tool (or probe name) that violated the invariant.
    pub tool_name: String,
    /// Human-readable detail.
    pub detail: String,
}

/// Proves the three rollout-safety invariants over the union of baseline and
/// candidate tool sets. Pure: performs no trace or store I/O.
#[must_use]
pub fn prove_invariants(baseline: &LocalEvaluator, candidate: &LocalEvaluator) -> Vec<Counterexample> {
    let mut counterexamples = Vec::new();

    for tool in baseline.all_known_tools().union(&candidate_write_tools_union(baseline, candidate)).cloned().collect::<std::collections::BTreeSet<_>>() {
        for has_token in [false, true] {
            let baseline_decision = baseline.evaluate(&tool, has_token);
            let candidate_decision = candidate.evaluate(&tool, has_token);
            let baseline_restricted = matches!(baseline_decision.action, PolicyAction::Deny | PolicyAction::RequireApproval);
            if baseline_restricted && candidate_decision.action == PolicyAction::Allow {
                counterexamples.push(Counterexample {
                    invariant: "no_write_privilege_escalation",
                    tool_name: tool.clone(),
                    detail: format!("baseline={baseline_decision:?} candidate=ALLOW has_token={has_token}", baseline_decision = baseline_decision.action),
                });
            }
        }
    }

    let unknown_probe = "__invariant_probe_unknown_tool__";
    for has_token in [false, true] {
        let baseline_decision = baseline.evaluate(unknown_probe, has_token);
        let candidate_decision = candidate.evaluate(unknown_probe, has_token);
        if baseline_decision.action != PolicyAction::Deny || candidate_decision.action != PolicyAction::Deny {
            counterexamples.push(Counterexample { invariant: "unknown_tools_remain_denied", tool_name: unknown_probe.to_string(), detail: format!("has_token={has_token}") });
        }
    }

    for tool in candidate.all_known_tools() {
        let decision = candidate.evaluate(&tool, false);
        let is_write_tool = candidate.evaluate(&tool, true).is_write_action;
        if is_write_tool && decision.action == PolicyAction::Allow {
            counterexamples.push(Counterexample { invariant: "write_tools_require_approval", tool_name: tool.clone(), detail: "candidate allows a write tool without an approval token".to_string() });
        }
    }

    counterexamples
}

fn candidate_write_tools_union(baseline: &LocalEvaluator, candidate: &LocalEvaluator) -> std::collections::BTreeSet<String> {
    baseline.all_known_tools().union(&candidate.all_known_tools()).cloned().collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, reason = "Test-only assertions are permitted.")]
mod tests {
    use agentgate_store_sqlite::SqliteTraceStore;

    use super::*;

    fn evaluator(read_only: &[&str], write: &[&str]) -> LocalEvaluator {
        LocalEvaluator::new(read_only.iter().map(|t| (*t).to_string()).collect(), write.iter().map(|t| (*t).to_string()).collect())
    }

    #[test]
    fn identical_policies_produce_only_low_severity_deltas() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        let event = agentgate_core::TraceEvent {
            event_id: "e1".to_string(),
            timestamp: OffsetDateTime::now_utc(),
            session_id: "s1".to_string(),
            user_id: None,
            agent_id: None,
            tool_name: "db_query".to_string(),
            arguments_hash: "h".to_string(),
            policy_version: "v1".to_string(),
            policy_decision: PolicyAction::Allow,
            policy_reason: "read_only_tools".to_string(),
            matched_rule: Some("read_only_tools".to_string()),
            executed: true,
            duration_ms: Some(1),
            error: None,
            is_write_action: false,
            approval_token_present: false,
        };
        store.append_trace_event(&event).expect("appends");
        let run = ReplayRun { run_id: "r1".to_string(), baseline_policy_version: "v1".to_string(), candidate_policy_version: "v2".to_string(), session_id: Some("s1".to_string()), status: ReplayRunStatus::Pending, created_at: OffsetDateTime::now_utc(), completed_at: None };
        store.create_replay_run(&run).expect("creates");
        let eval = evaluator(&["db_query"], &[]);
        run_replay(&store, &run, &eval, &eval).expect("replays");
        let summary = summarize(&store, "r1").expect("summarizes");
        assert_eq!(summary.drifted_events, 0);
        assert_eq!(summary.by_severity.get("low"), Some(&1));
    }

    #[test]
    fn restricting_candidate_access_is_caught_by_invariant_prover() {
        let baseline = evaluator(&[], &["db_write"]);
        let candidate = evaluator(&["db_write"], &[]);
        let counterexamples = prove_invariants(&candidate, &baseline);
        assert!(counterexamples.is_empty(), "restricting access should never violate escalation invariants: {counterexamples:?}");
    }

    #[test]
    fn escalating_candidate_access_is_caught() {
        let baseline = evaluator(&[], &["db_write"]);
        let candidate = evaluator(&["db_write"], &[]);
        let counterexamples = prove_invariants(&baseline, &candidate);
        assert!(counterexamples.iter().any(|counterexample| counterexample.invariant == "no_write_privilege_escalation"));
    }

    #[test]
    fn unknown_probe_always_denied() {
        let eval = evaluator(&["db_query"], &["db_write"]);
        let counterexamples = prove_invariants(&eval, &eval);
        assert!(!counterexamples.iter().any(|counterexample| counterexample.invariant == "unknown_tools_remain_denied"));
    }

    #[test]
    fn severity_classification_matches_reference_table() {
        assert_eq!(classify_severity(PolicyAction::Allow, PolicyAction::Deny, true), DeltaSeverity::Critical);
        assert_eq!(classify_severity(PolicyAction::Allow, PolicyAction::Deny, false), DeltaSeverity::High);
        assert_eq!(classify_severity(PolicyAction::Deny, PolicyAction::Allow, true), DeltaSeverity::High);
        assert_eq!(classify_severity(PolicyAction::Deny, PolicyAction::Allow, false), DeltaSeverity::Medium);
        assert_eq!(classify_severity(PolicyAction::Allow, PolicyAction::Allow, false), DeltaSeverity::Low);
    }
}
