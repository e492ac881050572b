// agentgate-core/src/interfaces.rs
// ============================================================================
// Module: Interface Seams
// Description: Trait boundaries between the enforcement core and its storage,
//              policy, credential, execution, and audit backends.
// Purpose: Let the gateway pipeline stay backend-agnostic and testable.
// Dependencies: crate::model
// ============================================================================

//! ## Overview
//! Every external dependency the enforcement core has is expressed as a
//! trait here. Production backends live in their own crates
//! (`agentgate-store-sqlite`, `agentgate-policy`, `agentgate-broker`);
//! test and in-memory implementations live alongside their consumers.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::model::ApprovalWorkflow;
use crate::model::EvidenceArchive;
use crate::model::IncidentEvent;
use crate::model::IncidentRecord;
use crate::model::PolicyException;
use crate::model::ReplayDelta;
use crate::model::ReplayRun;
use crate::model::RolloutRecord;
use crate::model::TraceEvent;

/// Errors raised by a [`TraceStore`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying backend reported an I/O or connection failure.
    #[error("store backend error: {0}")]
    Backend(String),
    /// The requested record does not exist.
    #[error("record not found: {0}")]
    NotFound(String),
    /// The operation violated a uniqueness or integrity constraint.
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Append-only, queryable persistence for everything the gateway records.
///
/// # Errors
///
/// Every method returns [`StoreError`] on backend failure.
pub trait TraceStore: Send + Sync {
    /// Appends a trace event and returns it unchanged.
    fn append_trace_event(&self, event: &TraceEvent) -> Result<(), StoreError>;
    /// Returns trace events for a session in append order.
    fn trace_events_for_session(&self, session_id: &str) -> Result<Vec<TraceEvent>, StoreError>;
    /// Returns trace events across all sessions, in append order.
    fn all_trace_events(&self) -> Result<Vec<TraceEvent>, StoreError>;

    /// Inserts a new incident, or returns the existing active incident for
    /// the session when one already exists (idempotent creation).
    fn create_or_get_incident(&self, incident: &IncidentRecord) -> Result<IncidentRecord, StoreError>;
    /// Loads an incident by id.
    fn get_incident(&self, incident_id: &str) -> Result<IncidentRecord, StoreError>;
    /// Updates an existing incident record.
    fn update_incident(&self, incident: &IncidentRecord) -> Result<(), StoreError>;
    /// Returns all incidents whose status is still active.
    fn active_incidents(&self) -> Result<Vec<IncidentRecord>, StoreError>;
    /// Appends one lifecycle event to an incident's history.
    fn append_incident_event(&self, event: &IncidentEvent) -> Result<(), StoreError>;

    /// Inserts a new approval workflow.
    fn create_workflow(&self, workflow: &ApprovalWorkflow) -> Result<(), StoreError>;
    /// Loads a workflow by id.
    fn get_workflow(&self, workflow_id: &str) -> Result<ApprovalWorkflow, StoreError>;
    /// Persists an updated workflow (new approvals or delegations).
    fn update_workflow(&self, workflow: &ApprovalWorkflow) -> Result<(), StoreError>;

    /// Inserts a new policy exception.
    fn create_exception(&self, exception: &PolicyException) -> Result<(), StoreError>;
    /// Loads exceptions matching a tool name that are not yet revoked.
    fn exceptions_for_tool(&self, tool_name: &str) -> Result<Vec<PolicyException>, StoreError>;
    /// Returns every exception that has not been revoked, for the expiry sweep.
    fn unrevoked_exceptions(&self) -> Result<Vec<PolicyException>, StoreError>;
    /// Persists a revoked (or auto-expired) exception.
    fn update_exception(&self, exception: &PolicyException) -> Result<(), StoreError>;

    /// Inserts a new replay run.
    fn create_replay_run(&self, run: &ReplayRun) -> Result<(), StoreError>;
    /// Loads a replay run by id.
    fn get_replay_run(&self, run_id: &str) -> Result<ReplayRun, StoreError>;
    /// Persists an updated replay run (e.g. marking it completed).
    fn update_replay_run(&self, run: &ReplayRun) -> Result<(), StoreError>;
    /// Appends one replay delta.
    fn append_replay_delta(&self, delta: &ReplayDelta) -> Result<(), StoreError>;
    /// Returns all deltas recorded for a run.
    fn replay_deltas_for_run(&self, run_id: &str) -> Result<Vec<ReplayDelta>, StoreError>;

    /// Inserts a new rollout record.
    fn create_rollout(&self, rollout: &RolloutRecord) -> Result<(), StoreError>;
    /// Loads a rollout by id.
    fn get_rollout(&self, rollout_id: &str) -> Result<RolloutRecord, StoreError>;
    /// Persists an updated rollout record.
    fn update_rollout(&self, rollout: &RolloutRecord) -> Result<(), StoreError>;

    /// Inserts a write-once evidence archive.
    fn create_evidence_archive(&self, archive: &EvidenceArchive) -> Result<(), StoreError>;
    /// Loads an evidence archive by id.
    fn get_evidence_archive(&self, archive_id: &str) -> Result<EvidenceArchive, StoreError>;

    /// Returns the persisted taint label set for a session, or an empty set
    /// if the session has never been observed.
    fn taint_labels(&self, session_id: &str) -> Result<std::collections::BTreeSet<String>, StoreError>;
    /// Replaces the persisted taint label set for a session.
    fn set_taint_labels(&self, session_id: &str, labels: &std::collections::BTreeSet<String>) -> Result<(), StoreError>;
}

/// Errors raised by a [`Kv`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// The backend is unreachable or returned a transport error.
    #[error("kv backend unavailable: {0}")]
    Unavailable(String),
}

/// A minimal key-value store used for kill-switch flags and rate-limit state.
///
/// # Errors
///
/// Every method returns [`KvError`] when the backend is unreachable; callers
/// that fail closed must treat this as a denial, never a fallback to local
/// defaults.
pub trait Kv: Send + Sync {
    /// Sets `key` to `value`.
    fn set(&self, key: &str, value: &str) -> Result<(), KvError>;
    /// Returns the value of `key`, or `None` if unset.
    fn get(&self, key: &str) -> Result<Option<String>, KvError>;
    /// Removes `key`.
    fn delete(&self, key: &str) -> Result<(), KvError>;
}

/// Errors raised by a [`PolicyClient`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// The policy backend could not be reached or timed out.
    #[error("policy backend unavailable: {0}")]
    Unavailable(String),
    /// The policy backend returned a malformed decision.
    #[error("malformed policy response: {0}")]
    Malformed(String),
}

/// A policy evaluation backend (local rule table, remote OPA-style service).
///
/// # Errors
///
/// Returns [`PolicyError`] on any evaluation failure. Implementations MUST
/// NOT silently fall back to a permissive default on error; the gateway
/// pipeline treats every `Err` as fail-closed deny.
pub trait PolicyClient: Send + Sync {
    /// Evaluates a tool call and returns the action to take.
    fn evaluate(&self, tool_name: &str, arguments: &BTreeMap<String, Value>, context: &BTreeMap<String, Value>) -> Result<crate::model::PolicyDecision, PolicyError>;
    /// Returns the policy version label currently in effect.
    fn policy_version(&self) -> String;
}

/// Errors raised by a [`CredentialProvider`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// The provider could not issue or revoke a credential.
    #[error("credential provider error: {0}")]
    Backend(String),
}

/// A brokered, scoped, time-limited credential.
#[derive(Debug, Clone)]
pub struct BrokeredCredential {
    /// Opaque credential material handed to the tool executor.
    pub token: String,
    /// Scope the credential was issued for.
    pub scope: String,
    /// Seconds until the credential expires.
    pub ttl_seconds: u32,
}

/// Issues and revokes narrowly scoped, time-limited credentials.
///
/// # Errors
///
/// Returns [`CredentialError`] on any backend failure.
pub trait CredentialProvider: Send + Sync {
    /// Issues a credential scoped to `scope` for at most `ttl_seconds`.
    fn issue(&self, scope: &str, ttl_seconds: u32) -> Result<BrokeredCredential, CredentialError>;
    /// Revokes a previously issued credential's token.
    fn revoke(&self, token: &str) -> Result<(), CredentialError>;
}

/// Errors raised by a [`ToolExecutor`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// The tool is not registered with this executor.
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    /// The tool raised an error during execution.
    #[error("tool execution failed: {0}")]
    Failed(String),
}

/// Executes an allowed tool call against its real implementation.
///
/// # Errors
///
/// Returns [`ExecutorError`] when the tool is unknown or fails.
pub trait ToolExecutor: Send + Sync {
    /// Runs `tool_name` with `arguments` using `credential`, returning its
    /// result payload.
    fn execute(&self, tool_name: &str, arguments: &BTreeMap<String, Value>, credential: &BrokeredCredential) -> Result<Value, ExecutorError>;
}

/// A structured audit record emitted by [`AuditSink`].
#[derive(Debug, Clone)]
pub struct AuditRecord<'a> {
    /// Event category, e.g. `tool_call`, `incident`, `approval`.
    pub category: &'a str,
    /// Free-form structured fields, already JSON-serializable.
    pub fields: BTreeMap<String, Value>,
}

/// Errors raised by an [`AuditSink`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// The sink failed to write the record.
    #[error("audit sink write failed: {0}")]
    WriteFailed(String),
}

/// Receives structured audit records. Replaces a global logging facade: every
/// component that needs to emit audit output takes an `Arc<dyn AuditSink>`
/// through its constructor instead of reaching for a process-wide logger.
///
/// # Errors
///
/// Returns [`AuditError`] when the record cannot be written. Callers should
/// treat a sink failure as non-fatal to the request path but surface it.
pub trait AuditSink: Send + Sync {
    /// Writes one audit record.
    fn record(&self, record: &AuditRecord<'_>) -> Result<(), AuditError>;
}
