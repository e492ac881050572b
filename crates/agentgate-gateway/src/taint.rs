// agentgate-gateway/src/taint.rs
// ============================================================================
// Module: Taint Tracker / DLP Guard
// Description: Per-session taint label accumulation and exfiltration gating.
// Purpose: Deny tool calls that would exfiltrate data tainted with a blocked
//          label.
// Dependencies: agentgate-core
// ============================================================================

//! ## Overview
//! Labels observed on a session's requests accumulate; they never shrink.
//! The accumulated set is persisted in the trace store so it survives a
//! restart, written back only when `observe_context` actually grows it.
//! `block_reason` consults the persisted set only for tools the caller marks
//! as exfiltration-capable, per the blocked-label configuration.

use std::collections::BTreeSet;

use agentgate_core::StoreError;
use agentgate_core::TraceStore;

/// Accumulates per-session taint labels and evaluates DLP blocking.
pub struct TaintTracker {
    blocked_labels: BTreeSet<String>,
    exfiltration_tools: BTreeSet<String>,
}

impl TaintTracker {
    /// Builds a tracker with the given blocked-label and exfiltration-tool
    /// sets.
    #[must_use]
    pub fn new(blocked_labels: BTreeSet<String>, exfiltration_tools: BTreeSet<String>) -> Self {
        Self { blocked_labels, exfiltration_tools }
    }

    /// Merges `taint_labels` (and, if `contains_sensitive_data`, the
    /// `sensitive` label) into the session's persisted set in `store`,
    /// writing back only when the merge actually changes it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    pub fn observe_context(&self, store: &dyn TraceStore, session_id: &str, taint_labels: &[String], contains_sensitive_data: bool) -> Result<(), StoreError> {
        let mut labels = store.taint_labels(session_id)?;
        let before = labels.len();
        labels.extend(taint_labels.iter().cloned());
        if contains_sensitive_data {
            labels.insert("sensitive".to_string());
        }
        if labels.len() != before {
            store.set_taint_labels(session_id, &labels)?;
        }
        Ok(())
    }

    /// Returns a human-readable block reason if `tool_name` is an
    /// exfiltration-capable tool and `session_id`'s persisted labels
    /// intersect the blocked set.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure reading the session's
    /// persisted label set.
    pub fn block_reason(&self, store: &dyn TraceStore, session_id: &str, tool_name: &str) -> Result<Option<String>, StoreError> {
        if !self.exfiltration_tools.contains(tool_name) {
            return Ok(None);
        }
        let labels = store.taint_labels(session_id)?;
        let intersecting: Vec<&str> = self.blocked_labels.iter().filter(|label| labels.contains(*label)).map(String::as_str).collect();
        Ok(if intersecting.is_empty() { None } else { Some(format!("Blocked labels present: {}", intersecting.join(", "))) })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, reason = "Test-only assertions are permitted.")]
mod tests {
    use agentgate_store_sqlite::SqliteTraceStore;

    use super::*;

    fn tracker() -> TaintTracker {
        TaintTracker::new(BTreeSet::from(["pii".to_string()]), BTreeSet::from(["send_email".to_string()]))
    }

    #[test]
    fn non_exfiltration_tool_is_never_blocked() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        let tracker = tracker();
        tracker.observe_context(&store, "s1", &["pii".to_string()], false).expect("observes");
        assert!(tracker.block_reason(&store, "s1", "db_query").expect("checks").is_none());
    }

    #[test]
    fn exfiltration_tool_blocked_when_labels_intersect() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        let tracker = tracker();
        tracker.observe_context(&store, "s1", &["pii".to_string()], false).expect("observes");
        assert!(tracker.block_reason(&store, "s1", "send_email").expect("checks").is_some());
    }

    #[test]
    fn sensitive_flag_adds_sensitive_label() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        let tracker = TaintTracker::new(BTreeSet::from(["sensitive".to_string()]), BTreeSet::from(["send_email".to_string()]));
        tracker.observe_context(&store, "s1", &[], true).expect("observes");
        assert!(tracker.block_reason(&store, "s1", "send_email").expect("checks").is_some());
    }

    #[test]
    fn unseen_session_is_never_blocked() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        let tracker = tracker();
        assert!(tracker.block_reason(&store, "unknown", "send_email").expect("checks").is_none());
    }

    #[test]
    fn labels_persist_across_trackers_sharing_a_store() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        tracker().observe_context(&store, "s1", &["pii".to_string()], false).expect("observes");
        let second = tracker();
        assert!(second.block_reason(&store, "s1", "send_email").expect("checks").is_some());
    }
}
