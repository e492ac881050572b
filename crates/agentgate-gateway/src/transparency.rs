// agentgate-gateway/src/transparency.rs
// ============================================================================
// Module: Transparency Log
// Description: Per-session Merkle root/inclusion proofs with optional anchor.
// Purpose: Make the trace store's append-only history independently
//          verifiable, with an optional external anchor of record.
// Dependencies: agentgate-core
// ============================================================================

//! ## Overview
//! Leaf hash: `SHA-256("{event_id}|{timestamp}|{tool}|{arguments_hash}|{decision}")`,
//! ordered by the session's trace events as returned by the store. The root
//! and any requested inclusion proof are recomputed from that ordering.
//! Anchoring is best-effort: the checkpoint is stored in the trace store
//! regardless of whether the external POST succeeds, and a network failure
//! never propagates to the caller.

use std::time::Duration;

use agentgate_core::merkle::build_inclusion_proof;
use agentgate_core::merkle::build_merkle_root;
use agentgate_core::merkle::hash_leaf;
use agentgate_core::EvidenceArchive;
use agentgate_core::EvidenceFormat;
use agentgate_core::StoreError;
use agentgate_core::TraceEvent;
use agentgate_core::TraceStore;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

const ANCHOR_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors raised building or anchoring a transparency checkpoint.
#[derive(Debug, Error)]
pub enum TransparencyError {
    /// The underlying store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The session has no trace events to build a log over.
    #[error("session {0} has no trace events")]
    EmptySession(String),
    /// The requested leaf index is out of range.
    #[error("leaf index {index} out of range for {len} events")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of events in the session.
        len: usize,
    },
}

fn leaf_hash(event: &TraceEvent) -> String {
    hash_leaf(&format!(
        "{}|{}|{}|{}|{}",
        event.event_id,
        event.timestamp.format(&time::format_description::well_known::Rfc3339).unwrap_or_default(),
        event.tool_name,
        event.arguments_hash,
        decision_label(event.policy_decision),
    ))
}

fn decision_label(decision: agentgate_core::PolicyAction) -> &'static str {
    match decision {
        agentgate_core::PolicyAction::Allow => "allow",
        agentgate_core::PolicyAction::Deny => "deny",
        agentgate_core::PolicyAction::RequireApproval => "require_approval",
    }
}

/// Builds the Merkle root for `session_id` over its trace events in store
/// order.
///
/// # Errors
///
/// Returns [`TransparencyError::Store`] on backend failure or
/// [`TransparencyError::EmptySession`] if the session has no events.
pub fn build_session_root(store: &dyn TraceStore, session_id: &str) -> Result<String, TransparencyError> {
    let events = store.trace_events_for_session(session_id)?;
    if events.is_empty() {
        return Err(TransparencyError::EmptySession(session_id.to_string()));
    }
    let leaves: Vec<String> = events.iter().map(leaf_hash).collect();
    Ok(build_merkle_root(&leaves))
}

/// Builds the inclusion proof for the leaf at `index` within `session_id`'s
/// event ordering.
///
/// # Errors
///
/// Returns [`TransparencyError::IndexOutOfRange`] if `index` is out of range.
pub fn build_session_inclusion_proof(store: &dyn TraceStore, session_id: &str, index: usize) -> Result<Vec<String>, TransparencyError> {
    let events = store.trace_events_for_session(session_id)?;
    let leaves: Vec<String> = events.iter().map(leaf_hash).collect();
    build_inclusion_proof(&leaves, index).map_err(|_| TransparencyError::IndexOutOfRange { index, len: leaves.len() })
}

#[derive(Debug, Serialize)]
struct Checkpoint<'a> {
    session_id: &'a str,
    root_hash: &'a str,
    event_count: usize,
    anchored_at: String,
    anchor_source: &'a str,
}

/// Builds a checkpoint for `session_id`, optionally POSTs it to
/// `anchor_url`, and persists the checkpoint (and, if configured, the raw
/// anchor response) as a write-once evidence archive. Returns the archive.
///
/// # Errors
///
/// Returns [`TransparencyError`] if the session has no events or the store
/// write fails; network failures while anchoring never propagate.
pub fn anchor_checkpoint(store: &dyn TraceStore, session_id: &str, anchor_url: Option<&str>) -> Result<EvidenceArchive, TransparencyError> {
    let events = store.trace_events_for_session(session_id)?;
    if events.is_empty() {
        return Err(TransparencyError::EmptySession(session_id.to_string()));
    }
    let root_hash = build_session_root(store, session_id)?;
    let anchored_at = OffsetDateTime::now_utc();
    let anchor_source = anchor_url.unwrap_or("none");
    let checkpoint = Checkpoint {
        session_id,
        root_hash: &root_hash,
        event_count: events.len(),
        anchored_at: anchored_at.format(&time::format_description::well_known::Rfc3339).unwrap_or_default(),
        anchor_source,
    };
    let status = anchor_url.map_or("anchored", |url| if post_checkpoint(url, &checkpoint).is_some() { "anchored" } else { "failed" });
    let body = serde_json::json!({
        "checkpoint": checkpoint,
        "status": status,
    });
    let payload = serde_json::to_vec(&body).unwrap_or_default();
    let integrity_hash = agentgate_core::hash_bytes(&payload);
    let archive = EvidenceArchive {
        archive_id: Uuid::new_v4().to_string(),
        session_id: session_id.to_string(),
        format: EvidenceFormat::Json,
        payload,
        integrity_hash,
        created_at: anchored_at,
    };
    store.create_evidence_archive(&archive)?;
    Ok(archive)
}

fn post_checkpoint(url: &str, checkpoint: &Checkpoint<'_>) -> Option<()> {
    let client = reqwest::blocking::Client::builder().timeout(ANCHOR_TIMEOUT).build().ok()?;
    client.post(url).json(checkpoint).send().ok()?.error_for_status().ok()?;
    Some(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, reason = "Test-only assertions are permitted.")]
mod tests {
    use agentgate_core::merkle::verify_inclusion_proof;
    use agentgate_core::PolicyAction;
    use agentgate_store_sqlite::SqliteTraceStore;

    use super::*;

    fn push_event(store: &SqliteTraceStore, session_id: &str, event_id: &str) {
        store
            .append_trace_event(&TraceEvent {
                event_id: event_id.to_string(),
                timestamp: OffsetDateTime::now_utc(),
                session_id: session_id.to_string(),
                user_id: None,
                agent_id: None,
                tool_name: "read_file".to_string(),
                arguments_hash: "abc".to_string(),
                policy_version: "v1".to_string(),
                policy_decision: PolicyAction::Allow,
                policy_reason: "ok".to_string(),
                matched_rule: None,
                executed: true,
                duration_ms: Some(5),
                error: None,
                is_write_action: false,
                approval_token_present: false,
            })
            .expect("appends");
    }

    #[test]
    fn root_and_proof_verify_for_session_events() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        push_event(&store, "s1", "e1");
        push_event(&store, "s1", "e2");
        push_event(&store, "s1", "e3");
        let events = store.trace_events_for_session("s1").expect("queries");
        let leaves: Vec<String> = events.iter().map(leaf_hash).collect();
        let root = build_session_root(&store, "s1").expect("builds root");
        for (index, leaf) in leaves.iter().enumerate() {
            let proof = build_session_inclusion_proof(&store, "s1", index).expect("builds proof");
            assert!(verify_inclusion_proof(leaf, index, leaves.len(), &proof, &root));
        }
    }

    #[test]
    fn empty_session_is_rejected() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        assert!(matches!(build_session_root(&store, "missing"), Err(TransparencyError::EmptySession(_))));
    }

    #[test]
    fn anchoring_without_url_still_persists_checkpoint() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        push_event(&store, "s1", "e1");
        let archive = anchor_checkpoint(&store, "s1", None).expect("anchors");
        assert_eq!(archive.format, EvidenceFormat::Json);
    }

    #[test]
    fn anchoring_with_unreachable_url_does_not_propagate() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        push_event(&store, "s1", "e1");
        let archive = anchor_checkpoint(&store, "s1", Some("http://127.0.0.1:1/unreachable")).expect("anchors despite network failure");
        let body: serde_json::Value = serde_json::from_slice(&archive.payload).expect("parses payload");
        assert_eq!(body["status"], "failed");
    }
}
