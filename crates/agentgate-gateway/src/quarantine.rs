// agentgate-gateway/src/quarantine.rs
// ============================================================================
// Module: Quarantine Coordinator
// Description: Risk-score accumulator driving the session incident FSM.
// Purpose: Contain a session once its accumulated risk crosses a threshold,
//          revoking credentials and killing the session.
// Dependencies: agentgate-core, agentgate-broker
// ============================================================================

//! ## Overview
//! Risk per observed outcome: `DENY -> 4`, `REQUIRE_APPROVAL -> 2`, any error
//! `-> 1`, otherwise `0`. Crossing `threshold` (default 6) quarantines the
//! session: revoke credentials, then `revoked` or `failed`, then kill the
//! session's KV key. Release clears the kill-switch key and the in-memory
//! binding. The coordinator's map is a single re-entrant mutex; critical
//! sections never perform I/O — the incident-creating transition below does
//! its I/O (store writes, credential revocation, kill switch) outside the
//! lock, re-entering only to record the final in-memory binding.

use std::collections::HashMap;
use std::sync::Mutex;

use agentgate_core::CredentialProvider;
use agentgate_core::IncidentEvent;
use agentgate_core::IncidentRecord;
use agentgate_core::IncidentStatus;
use agentgate_core::PolicyAction;
use agentgate_core::StoreError;
use agentgate_core::TraceStore;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::kill_switch::KillSwitch;

/// Default risk-score threshold that triggers quarantine.
pub const DEFAULT_THRESHOLD: i64 = 6;

fn risk_delta(action: PolicyAction, had_error: bool) -> i64 {
    if had_error {
        return 1;
    }
    match action {
        PolicyAction::Deny => 4,
        PolicyAction::RequireApproval => 2,
        PolicyAction::Allow => 0,
    }
}

/// Accumulates per-session risk and drives quarantine transitions.
pub struct QuarantineCoordinator {
    threshold: i64,
    scores: Mutex<HashMap<String, i64>>,
    active: Mutex<HashMap<String, String>>,
}

impl QuarantineCoordinator {
    /// Builds a coordinator with `threshold` (use [`DEFAULT_THRESHOLD`] for
    /// the reference default).
    #[must_use]
    pub fn new(threshold: i64) -> Self {
        Self { threshold, scores: Mutex::new(HashMap::new()), active: Mutex::new(HashMap::new()) }
    }

    /// Bootstraps the in-memory active-incident bindings from the store by
    /// scanning all active incidents, keeping the most-recent per session.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    pub fn bootstrap(&self, store: &dyn TraceStore) -> Result<(), StoreError> {
        let mut latest: HashMap<String, IncidentRecord> = HashMap::new();
        for incident in store.active_incidents()? {
            latest
                .entry(incident.session_id.clone())
                .and_modify(|existing| {
                    if incident.updated_at > existing.updated_at {
                        *existing = incident.clone();
                    }
                })
                .or_insert(incident);
        }
        let Ok(mut active) = self.active.lock() else { return Ok(()) };
        for (session_id, incident) in latest {
            active.insert(session_id, incident.incident_id);
        }
        Ok(())
    }

    /// Returns true when `session_id` currently has an active incident
    /// binding.
    #[must_use]
    pub fn is_quarantined(&self, session_id: &str) -> bool {
        self.active.lock().is_ok_and(|active| active.contains_key(session_id))
    }

    /// Records one observed outcome for `session_id`, quarantining it if the
    /// accumulated score crosses the threshold.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure while persisting the
    /// incident.
    #[allow(clippy::too_many_arguments, reason = "Bundles every enforcement-core collaborator this observation needs.")]
    pub fn observe(&self, store: &dyn TraceStore, credentials: &dyn CredentialProvider, kill_switch: &KillSwitch<'_>, session_id: &str, action: PolicyAction, had_error: bool, reason: &str) -> Result<(), StoreError> {
        let crossed = {
            let Ok(mut scores) = self.scores.lock() else { return Ok(()) };
            let entry = scores.entry(session_id.to_string()).or_insert(0);
            *entry += risk_delta(action, had_error);
            *entry >= self.threshold
        };
        if crossed && !self.is_quarantined(session_id) {
            self.quarantine(store, credentials, kill_switch, session_id, reason)?;
        }
        Ok(())
    }

    fn quarantine(&self, store: &dyn TraceStore, credentials: &dyn CredentialProvider, kill_switch: &KillSwitch<'_>, session_id: &str, reason: &str) -> Result<(), StoreError> {
        let now = OffsetDateTime::now_utc();
        let incident = IncidentRecord {
            incident_id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            status: IncidentStatus::Quarantined,
            risk_score: self.threshold,
            reason: reason.to_string(),
            created_at: now,
            updated_at: now,
            released_by: None,
            released_at: None,
        };
        let incident = store.create_or_get_incident(&incident)?;
        if let Ok(mut active) = self.active.lock() {
            active.insert(session_id.to_string(), incident.incident_id.clone());
        }
        store.append_incident_event(&IncidentEvent { incident_id: incident.incident_id.clone(), event_type: "quarantined".to_string(), detail: reason.to_string(), timestamp: now })?;

        let revoke_result = credentials.revoke(session_id);
        let mut incident = incident;
        incident.updated_at = OffsetDateTime::now_utc();
        let (status, event_type, detail) = match revoke_result {
            Ok(()) => (IncidentStatus::Revoked, "revoked", "credentials revoked".to_string()),
            Err(err) => (IncidentStatus::Failed, "revocation_failed", err.to_string()),
        };
        incident.status = status;
        store.update_incident(&incident)?;
        store.append_incident_event(&IncidentEvent { incident_id: incident.incident_id.clone(), event_type: event_type.to_string(), detail, timestamp: incident.updated_at })?;

        let _ = kill_switch.kill_session(session_id, reason);
        Ok(())
    }

    /// Releases `session_id`'s active incident: sets status `released`,
    /// records a `released` event, clears the session kill-switch key, and
    /// drops the in-memory binding.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    pub fn release_incident(&self, store: &dyn TraceStore, kill_switch: &KillSwitch<'_>, session_id: &str, released_by: &str) -> Result<(), StoreError> {
        let incident_id = { self.active.lock().ok().and_then(|active| active.get(session_id).cloned()) };
        if let Some(incident_id) = incident_id {
            let mut incident = store.get_incident(&incident_id)?;
            let now = OffsetDateTime::now_utc();
            incident.status = IncidentStatus::Released;
            incident.released_by = Some(released_by.to_string());
            incident.released_at = Some(now);
            incident.updated_at = now;
            store.update_incident(&incident)?;
            store.append_incident_event(&IncidentEvent { incident_id, event_type: "released".to_string(), detail: format!("released by {released_by}"), timestamp: now })?;
        }
        let _ = kill_switch.release_session(session_id);
        if let Ok(mut active) = self.active.lock() {
            active.remove(session_id);
        }
        if let Ok(mut scores) = self.scores.lock() {
            scores.remove(session_id);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, reason = "Test-only assertions are permitted.")]
mod tests {
    use std::collections::BTreeMap;

    use agentgate_core::BrokeredCredential;
    use agentgate_core::CredentialError;
    use agentgate_core::Kv;
    use agentgate_core::KvError;
    use agentgate_store_sqlite::SqliteTraceStore;

    use super::*;

    #[derive(Default)]
    struct MemKv(Mutex<BTreeMap<String, String>>);
    impl Kv for MemKv {
        fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
            self.0.lock().unwrap().insert(key.to_string(), value.to_string());
            Ok(())
        }
        fn get(&self, key: &str) -> Result<Option<String>, KvError> {
            Ok(self.0.lock().unwrap().get(key).cloned())
        }
        fn delete(&self, key: &str) -> Result<(), KvError> {
            self.0.lock().unwrap().remove(key);
            Ok(())
        }
    }

    #[derive(Default)]
    struct AlwaysRevokes;
    impl CredentialProvider for AlwaysRevokes {
        fn issue(&self, scope: &str, ttl_seconds: u32) -> Result<BrokeredCredential, CredentialError> {
            Ok(BrokeredCredential { token: "t".to_string(), scope: scope.to_string(), ttl_seconds })
        }
        fn revoke(&self, _token: &str) -> Result<(), CredentialError> {
            Ok(())
        }
    }

    #[test]
    fn crossing_threshold_quarantines_session() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        let kv = MemKv::default();
        let switch = KillSwitch::new(&kv);
        let credentials = AlwaysRevokes;
        let coordinator = QuarantineCoordinator::new(DEFAULT_THRESHOLD);

        coordinator.observe(&store, &credentials, &switch, "s1", PolicyAction::Deny, false, "denied").expect("observes");
        coordinator.observe(&store, &credentials, &switch, "s1", PolicyAction::Deny, false, "denied").expect("observes");

        assert!(coordinator.is_quarantined("s1"));
        assert!(matches!(switch.is_blocked("any", "s1"), crate::kill_switch::BlockState::Blocked(_)));
    }

    #[test]
    fn repeated_quarantine_attempts_do_not_duplicate_incidents() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        let kv = MemKv::default();
        let switch = KillSwitch::new(&kv);
        let credentials = AlwaysRevokes;
        let coordinator = QuarantineCoordinator::new(1);

        coordinator.observe(&store, &credentials, &switch, "s1", PolicyAction::Deny, false, "denied").expect("observes");
        coordinator.observe(&store, &credentials, &switch, "s1", PolicyAction::Deny, false, "denied again").expect("observes");

        assert_eq!(store.active_incidents().expect("queries").len(), 1);
    }

    #[test]
    fn release_clears_binding_and_kill_switch() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        let kv = MemKv::default();
        let switch = KillSwitch::new(&kv);
        let credentials = AlwaysRevokes;
        let coordinator = QuarantineCoordinator::new(1);
        coordinator.observe(&store, &credentials, &switch, "s1", PolicyAction::Deny, false, "denied").expect("observes");

        coordinator.release_incident(&store, &switch, "s1", "admin").expect("releases");
        assert!(!coordinator.is_quarantined("s1"));
        assert_eq!(switch.is_blocked("any", "s1"), crate::kill_switch::BlockState::Allowed);
    }
}
