// agentgate-core/src/model.rs
// ============================================================================
// Module: Data Model
// Description: Request/response, decision, trace, incident, approval, policy
//              exception, replay, rollout, and evidence archive types.
// Purpose: Define the shared vocabulary every enforcement-core component speaks.
// Dependencies: serde, time, uuid
// ============================================================================

//! ## Overview
//! These types are the wire and storage vocabulary of the enforcement core.
//! They carry no behavior beyond constructors and small derived accessors;
//! the pipeline, stores, and coordinators in `agentgate-gateway` and
//! `agentgate-store-sqlite` own the logic that produces and consumes them.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

/// A single agent request to invoke a named tool with arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Session identifier; non-empty, at most 256 characters.
    pub session_id: String,
    /// Tool identifier; non-empty, at most 128 characters, `[A-Za-z0-9_.-]+`.
    pub tool_name: String,
    /// Opaque tool arguments.
    #[serde(default)]
    pub arguments: BTreeMap<String, Value>,
    /// Opaque request context (identity, taint labels, tenant, ...).
    #[serde(default)]
    pub context: BTreeMap<String, Value>,
    /// Approval token, either the shared secret or a `wf:{workflow_id}` token.
    #[serde(default)]
    pub approval_token: Option<String>,
}

impl ToolCallRequest {
    /// Returns the `user_id` string from `context`, if present.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.context.get("user_id").and_then(Value::as_str)
    }

    /// Returns the `agent_id` string from `context`, if present.
    #[must_use]
    pub fn agent_id(&self) -> Option<&str> {
        self.context.get("agent_id").and_then(Value::as_str)
    }

    /// Returns the rate-limit subject: the context `user_id` if set, else the
    /// session id.
    #[must_use]
    pub fn subject_id(&self) -> &str {
        self.user_id().unwrap_or(&self.session_id)
    }
}

/// Action produced by policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyAction {
    /// The call is permitted.
    Allow,
    /// The call is denied.
    Deny,
    /// The call needs a valid approval token before it may proceed.
    RequireApproval,
}

/// The decision produced by policy evaluation for one tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDecision {
    /// Allow, deny, or require-approval.
    pub action: PolicyAction,
    /// Human-readable reason surfaced in the trace and response.
    pub reason: String,
    /// Name of the rule that produced this decision.
    pub matched_rule: Option<String>,
    /// Credential scope to broker; set iff `action == Allow`.
    pub allowed_scope: Option<String>,
    /// Credential TTL in seconds brokered for this call.
    pub credential_ttl_seconds: u32,
    /// Whether the tool performs a write/mutating action.
    pub is_write_action: bool,
}

impl PolicyDecision {
    /// Default credential TTL used when a decision does not set one.
    pub const DEFAULT_CREDENTIAL_TTL_SECONDS: u32 = 300;

    /// Builds an `ALLOW` decision.
    #[must_use]
    pub fn allow(reason: impl Into<String>, matched_rule: impl Into<String>, scope: impl Into<String>, is_write_action: bool) -> Self {
        Self {
            action: PolicyAction::Allow,
            reason: reason.into(),
            matched_rule: Some(matched_rule.into()),
            allowed_scope: Some(scope.into()),
            credential_ttl_seconds: Self::DEFAULT_CREDENTIAL_TTL_SECONDS,
            is_write_action,
        }
    }

    /// Builds a `DENY` decision.
    #[must_use]
    pub fn deny(reason: impl Into<String>, matched_rule: impl Into<String>) -> Self {
        Self {
            action: PolicyAction::Deny,
            reason: reason.into(),
            matched_rule: Some(matched_rule.into()),
            allowed_scope: None,
            credential_ttl_seconds: Self::DEFAULT_CREDENTIAL_TTL_SECONDS,
            is_write_action: false,
        }
    }

    /// Builds a `REQUIRE_APPROVAL` decision.
    #[must_use]
    pub fn require_approval(reason: impl Into<String>, matched_rule: impl Into<String>) -> Self {
        Self {
            action: PolicyAction::RequireApproval,
            reason: reason.into(),
            matched_rule: Some(matched_rule.into()),
            allowed_scope: None,
            credential_ttl_seconds: Self::DEFAULT_CREDENTIAL_TTL_SECONDS,
            is_write_action: true,
        }
    }
}

/// Response returned from a `call_tool` invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResponse {
    /// Whether the tool call executed successfully.
    pub success: bool,
    /// Tool result payload, present only on success.
    pub result: Option<Value>,
    /// Error message, present only on failure.
    pub error: Option<String>,
    /// Identifier of the trace event recorded for this call.
    pub trace_id: String,
}

/// One append-only audit record for a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    /// UUIDv4 event identifier; doubles as the trace id returned to callers.
    pub event_id: String,
    /// UTC timestamp of the request.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Session the call belongs to.
    pub session_id: String,
    /// Caller's user identifier, if known.
    pub user_id: Option<String>,
    /// Caller's agent identifier, if known.
    pub agent_id: Option<String>,
    /// Tool the call targeted.
    pub tool_name: String,
    /// SHA-256 over canonical JSON of the call's arguments.
    pub arguments_hash: String,
    /// Policy snapshot version in effect for this decision.
    pub policy_version: String,
    /// Action taken by policy evaluation.
    pub policy_decision: PolicyAction,
    /// Reason text from the policy decision.
    pub policy_reason: String,
    /// Rule name that produced the decision, if any.
    pub matched_rule: Option<String>,
    /// Whether the tool actually executed.
    pub executed: bool,
    /// Wall-clock execution duration in milliseconds, present iff executed.
    pub duration_ms: Option<u64>,
    /// Error message, present iff the call failed.
    pub error: Option<String>,
    /// Whether the tool is a write/mutating action.
    pub is_write_action: bool,
    /// Whether the request carried a non-empty approval token.
    pub approval_token_present: bool,
}

/// Status of a quarantine incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    /// The session is contained; credential revocation in progress or retried.
    Quarantined,
    /// Credentials were revoked successfully.
    Revoked,
    /// Credential revocation failed.
    Failed,
    /// An administrator released the incident.
    Released,
}

impl IncidentStatus {
    /// Returns true for statuses that keep a session quarantined.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Quarantined | Self::Revoked | Self::Failed)
    }
}

/// A quarantine incident for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentRecord {
    /// Incident identifier.
    pub incident_id: String,
    /// Session the incident applies to.
    pub session_id: String,
    /// Current lifecycle status.
    pub status: IncidentStatus,
    /// Accumulated risk score that triggered (or updated) the incident.
    pub risk_score: i64,
    /// Human-readable reason.
    pub reason: String,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last-update timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// Administrator who released the incident, if released.
    pub released_by: Option<String>,
    /// Release timestamp, if released.
    #[serde(with = "time::serde::rfc3339::option")]
    pub released_at: Option<OffsetDateTime>,
}

/// One transition event in an incident's lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentEvent {
    /// Incident the event belongs to.
    pub incident_id: String,
    /// Event type: `quarantined`, `revoked`, `revocation_failed`, `released`.
    pub event_type: String,
    /// Free-form detail text.
    pub detail: String,
    /// Event timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Derived status of an approval workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Enough approvals have been collected.
    Approved,
    /// The workflow's expiry has passed without enough approvals.
    Expired,
    /// Still collecting approvals.
    Pending,
}

/// A multi-step, optionally delegated approval workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalWorkflow {
    /// Workflow identifier.
    pub workflow_id: String,
    /// Session the workflow gates.
    pub session_id: String,
    /// Tool the workflow gates.
    pub tool_name: String,
    /// Number of distinct approval slots required.
    pub required_steps: u32,
    /// Normalized (case-folded, trimmed, deduplicated) required approver identities.
    pub required_approvers: Vec<String>,
    /// Identity that requested the workflow, if known.
    pub requested_by: Option<String>,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Expiry timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    /// Last-update timestamp.
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
    /// Approved slot identities.
    pub approvals: Vec<String>,
    /// Delegate identity -> source slot identity.
    pub delegations: BTreeMap<String, String>,
}

impl ApprovalWorkflow {
    /// Default workflow expiry in seconds when none is specified.
    pub const DEFAULT_EXPIRES_IN_SECONDS: i64 = 900;

    /// Token string that authorizes this workflow's calls.
    #[must_use]
    pub fn token(&self) -> String {
        format!("wf:{}", self.workflow_id)
    }

    /// Derives this workflow's current status at `now`.
    #[must_use]
    pub fn status(&self, now: OffsetDateTime) -> WorkflowStatus {
        if self.approvals.len() >= self.required_steps as usize {
            WorkflowStatus::Approved
        } else if now >= self.expires_at {
            WorkflowStatus::Expired
        } else {
            WorkflowStatus::Pending
        }
    }
}

/// A time-bound policy exception scoped to a session or tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyException {
    /// Exception identifier.
    pub exception_id: String,
    /// Tool the exception applies to.
    pub tool_name: String,
    /// Human-readable reason.
    pub reason: String,
    /// Identity that created the exception.
    pub created_by: String,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Expiry timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    /// Session scope, if any. At least one of `session_id`/`tenant_id` is set.
    pub session_id: Option<String>,
    /// Tenant scope, if any.
    pub tenant_id: Option<String>,
    /// Identity that revoked the exception, if revoked.
    pub revoked_by: Option<String>,
    /// Revocation timestamp, if revoked.
    #[serde(with = "time::serde::rfc3339::option")]
    pub revoked_at: Option<OffsetDateTime>,
}

impl PolicyException {
    /// Identity used when the auto-expiry sweep revokes an exception.
    pub const AUTO_EXPIRED_BY: &'static str = "system:auto-expired";

    /// Returns `active`, `revoked`, or `expired`.
    #[must_use]
    pub fn status(&self) -> &'static str {
        match &self.revoked_by {
            None => "active",
            Some(by) if by == Self::AUTO_EXPIRED_BY => "expired",
            Some(_) => "revoked",
        }
    }

    /// Returns true when the exception is neither revoked nor expired as of
    /// `now`.
    #[must_use]
    pub fn is_active(&self, now: OffsetDateTime) -> bool {
        self.revoked_by.is_none() && self.expires_at > now
    }
}

/// Severity of a single baseline-vs-candidate replay delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaSeverity {
    /// No material change.
    Low,
    /// Access expanded without a write implication, or a non-write restriction.
    Medium,
    /// A write-relevant access change.
    High,
    /// A write action's access was restricted to denied.
    Critical,
}

/// The per-event diff between a baseline and candidate policy evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayDelta {
    /// Run the delta belongs to.
    pub run_id: String,
    /// Source trace event id.
    pub event_id: String,
    /// Tool the event called.
    pub tool_name: String,
    /// Action the baseline policy would have taken.
    pub baseline_action: PolicyAction,
    /// Action the candidate policy would have taken.
    pub candidate_action: PolicyAction,
    /// Severity classification of the drift.
    pub severity: DeltaSeverity,
    /// Baseline matched rule.
    pub baseline_rule: Option<String>,
    /// Candidate matched rule.
    pub candidate_rule: Option<String>,
    /// Baseline reason text.
    pub baseline_reason: String,
    /// Candidate reason text.
    pub candidate_reason: String,
    /// Root-cause classification for the drift.
    pub root_cause: String,
    /// Human-readable explanation of the drift.
    pub explanation: String,
}

/// Lifecycle status of a replay run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayRunStatus {
    /// The run has been created but not yet evaluated.
    Pending,
    /// The run has produced deltas for every in-scope event.
    Completed,
}

/// A replay run binding a baseline and candidate policy version to a scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayRun {
    /// Run identifier.
    pub run_id: String,
    /// Baseline policy version label.
    pub baseline_policy_version: String,
    /// Candidate policy version label.
    pub candidate_policy_version: String,
    /// Session scope, or `None` for all sessions.
    pub session_id: Option<String>,
    /// Lifecycle status.
    pub status: ReplayRunStatus,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Completion timestamp, once completed.
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

/// Aggregated counts over a set of replay deltas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaySummary {
    /// Run the summary was computed for.
    pub run_id: String,
    /// Total events replayed.
    pub total_events: usize,
    /// Events whose action differed between baseline and candidate.
    pub drifted_events: usize,
    /// Count of deltas by severity label.
    pub by_severity: BTreeMap<String, usize>,
    /// Count of deltas by root-cause label.
    pub by_root_cause: BTreeMap<String, usize>,
}

/// Canary verdict for a candidate policy rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanaryVerdict {
    /// The candidate stayed within the drift and error budget.
    Pass,
    /// The candidate exceeded the drift or error budget.
    Fail,
}

/// Status of a tenant policy rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutStatus {
    /// Canary passed; promotion in progress.
    Promoting,
    /// Rollout completed successfully.
    Completed,
    /// Rollout was rolled back.
    RolledBack,
}

/// A tenant policy rollout record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutRecord {
    /// Rollout identifier.
    pub rollout_id: String,
    /// Tenant the rollout applies to.
    pub tenant_id: String,
    /// Baseline policy version.
    pub baseline_version: String,
    /// Candidate policy version.
    pub candidate_version: String,
    /// Lifecycle status.
    pub status: RolloutStatus,
    /// Canary verdict that produced this rollout's current state.
    pub verdict: CanaryVerdict,
    /// Human-readable reason for the verdict.
    pub reason: String,
    /// Count of `critical`-severity deltas observed.
    pub critical_drift: u64,
    /// Count of `high`-severity deltas observed.
    pub high_drift: u64,
    /// Whether the rollout has been rolled back.
    pub rolled_back: bool,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last-update timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Export format for an evidence archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceFormat {
    /// Structured JSON payload.
    Json,
    /// Rendered HTML report.
    Html,
    /// Rendered PDF report (requires a probed `Renderer` capability).
    Pdf,
}

/// A write-once evidence export for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceArchive {
    /// Archive identifier.
    pub archive_id: String,
    /// Session the archive was exported for.
    pub session_id: String,
    /// Export format.
    pub format: EvidenceFormat,
    /// Archive payload bytes.
    pub payload: Vec<u8>,
    /// SHA-256 integrity hash of `payload`.
    pub integrity_hash: String,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
