// agentgate-gateway/src/approval.rs
// ============================================================================
// Module: Approval Workflow Engine
// Description: Multi-step approval workflows with delegation and expiry.
// Purpose: Gate write-tool calls on a configurable number of distinct
//          approvals, with delegate-target matching.
// Dependencies: agentgate-core
// ============================================================================

//! ## Overview
//! Approver identities are normalized (case-folded, trimmed) at creation
//! time, deduplicated preserving first-seen order. `approve` is idempotent
//! per slot. `delegate` moves a slot's approval right to another identity,
//! clearing any delegation that previously targeted the delegator.

use agentgate_core::ApprovalWorkflow;
use agentgate_core::StoreError;
use agentgate_core::TraceStore;
use agentgate_core::WorkflowStatus;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// Errors raised by approval workflow operations.
#[derive(Debug, Error)]
pub enum ApprovalError {
    /// The underlying store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The workflow has expired.
    #[error("workflow {0} has expired")]
    Expired(String),
    /// The approver does not match any required or delegated slot.
    #[error("{approver} does not match any required slot for workflow {workflow_id}")]
    NotAnApprover { workflow_id: String, approver: String },
    /// The delegator is not a required approver.
    #[error("{from} is not a required approver for workflow {workflow_id}")]
    UnknownDelegator { workflow_id: String, from: String },
    /// The delegator's slot is already approved.
    #[error("{from}'s slot is already approved for workflow {workflow_id}")]
    AlreadyApproved { workflow_id: String, from: String },
    /// `from` and `to` are the same identity.
    #[error("cannot delegate {from} to themselves")]
    SelfDelegation { from: String },
}

fn normalize(identity: &str) -> String {
    identity.trim().to_lowercase()
}

/// Normalizes and deduplicates approver identities, preserving first-seen
/// order.
#[must_use]
pub fn normalize_approvers(approvers: &[String]) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    let mut result = Vec::new();
    for approver in approvers {
        let normalized = normalize(approver);
        if seen.insert(normalized.clone()) {
            result.push(normalized);
        }
    }
    result
}

/// Creates a new workflow, returning its id.
///
/// # Errors
///
/// Returns [`ApprovalError::Store`] on backend failure.
#[allow(clippy::too_many_arguments, reason = "Mirrors the workflow record's required fields one-for-one.")]
pub fn create_workflow(store: &dyn TraceStore, session_id: &str, tool_name: &str, required_steps: u32, required_approvers: &[String], requested_by: Option<&str>, expires_in_seconds: Option<i64>, expires_at: Option<OffsetDateTime>) -> Result<String, ApprovalError> {
    let now = OffsetDateTime::now_utc();
    let expires_at = expires_at.unwrap_or_else(|| now + time::Duration::seconds(expires_in_seconds.unwrap_or(ApprovalWorkflow::DEFAULT_EXPIRES_IN_SECONDS)));
    let workflow = ApprovalWorkflow {
        workflow_id: Uuid::new_v4().to_string(),
        session_id: session_id.to_string(),
        tool_name: tool_name.to_string(),
        required_steps,
        required_approvers: normalize_approvers(required_approvers),
        requested_by: requested_by.map(str::to_string),
        created_at: now,
        expires_at,
        updated_at: None,
        approvals: Vec::new(),
        delegations: std::collections::BTreeMap::new(),
    };
    store.create_workflow(&workflow)?;
    Ok(workflow.workflow_id)
}

fn resolve_slot(workflow: &ApprovalWorkflow, approver: &str) -> Option<String> {
    let approver = normalize(approver);
    if workflow.required_approvers.contains(&approver) {
        return Some(approver);
    }
    workflow.delegations.get(&approver).cloned()
}

/// Approves `workflow_id` on behalf of `approver_id`, matching either a
/// required slot directly or as a delegate-target.
///
/// # Errors
///
/// Returns [`ApprovalError::Expired`] if the workflow has expired, or
/// [`ApprovalError::NotAnApprover`] if `approver_id` matches no slot.
pub fn approve(store: &dyn TraceStore, workflow_id: &str, approver_id: &str) -> Result<ApprovalWorkflow, ApprovalError> {
    let mut workflow = store.get_workflow(workflow_id)?;
    let now = OffsetDateTime::now_utc();
    if workflow.status(now) == WorkflowStatus::Expired {
        return Err(ApprovalError::Expired(workflow_id.to_string()));
    }
    let Some(slot) = resolve_slot(&workflow, approver_id) else {
        return Err(ApprovalError::NotAnApprover { workflow_id: workflow_id.to_string(), approver: approver_id.to_string() });
    };
    if !workflow.approvals.contains(&slot) {
        workflow.approvals.push(slot);
        workflow.updated_at = Some(now);
        store.update_workflow(&workflow)?;
    }
    Ok(workflow)
}

/// Delegates `from`'s approval slot to `to`.
///
/// # Errors
///
/// Returns [`ApprovalError::UnknownDelegator`], [`ApprovalError::AlreadyApproved`],
/// or [`ApprovalError::SelfDelegation`] as applicable.
pub fn delegate(store: &dyn TraceStore, workflow_id: &str, from: &str, to: &str) -> Result<ApprovalWorkflow, ApprovalError> {
    let mut workflow = store.get_workflow(workflow_id)?;
    let from = normalize(from);
    let to = normalize(to);
    if from == to {
        return Err(ApprovalError::SelfDelegation { from });
    }
    if !workflow.required_approvers.contains(&from) {
        return Err(ApprovalError::UnknownDelegator { workflow_id: workflow_id.to_string(), from });
    }
    if workflow.approvals.contains(&from) {
        return Err(ApprovalError::AlreadyApproved { workflow_id: workflow_id.to_string(), from });
    }
    workflow.delegations.retain(|_, source| *source != from);
    workflow.delegations.insert(to, from);
    workflow.updated_at = Some(OffsetDateTime::now_utc());
    store.update_workflow(&workflow)?;
    Ok(workflow)
}

/// Verifies an approval token presented on a `/tools/call` request: must
/// start with `wf:`, reference a known, non-expired workflow matching
/// `session_id`/`tool_name`, with enough approvals collected.
///
/// # Errors
///
/// Returns [`StoreError`] only if the store lookup itself fails for a reason
/// other than "not found" (not-found is treated as an invalid token, `Ok(false)`).
pub fn verify_workflow_token(store: &dyn TraceStore, token: &str, session_id: &str, tool_name: &str) -> Result<bool, StoreError> {
    let Some(workflow_id) = token.strip_prefix("wf:") else { return Ok(false) };
    let workflow = match store.get_workflow(workflow_id) {
        Ok(workflow) => workflow,
        Err(StoreError::NotFound(_)) => return Ok(false),
        Err(err) => return Err(err),
    };
    let now = OffsetDateTime::now_utc();
    Ok(workflow.session_id == session_id
        && workflow.tool_name == tool_name
        && workflow.status(now) != WorkflowStatus::Expired
        && workflow.approvals.len() >= workflow.required_steps as usize)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, reason = "Test-only assertions are permitted.")]
mod tests {
    use agentgate_store_sqlite::SqliteTraceStore;

    use super::*;

    #[test]
    fn approvers_are_normalized_and_deduplicated() {
        let approvers = normalize_approvers(&[" Alice ".to_string(), "alice".to_string(), "Bob".to_string()]);
        assert_eq!(approvers, vec!["alice".to_string(), "bob".to_string()]);
    }

    #[test]
    fn workflow_reaches_approved_status_and_validates_token() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        let workflow_id = create_workflow(&store, "s1", "db_write", 2, &["alice".to_string(), "bob".to_string()], None, None, None).expect("creates");
        approve(&store, &workflow_id, "alice").expect("approves");
        assert!(!verify_workflow_token(&store, &format!("wf:{workflow_id}"), "s1", "db_write").expect("checks"));
        approve(&store, &workflow_id, "bob").expect("approves");
        assert!(verify_workflow_token(&store, &format!("wf:{workflow_id}"), "s1", "db_write").expect("checks"));
    }

    #[test]
    fn reapproving_same_slot_is_idempotent() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        let workflow_id = create_workflow(&store, "s1", "db_write", 2, &["alice".to_string(), "bob".to_string()], None, None, None).expect("creates");
        approve(&store, &workflow_id, "alice").expect("approves");
        let workflow = approve(&store, &workflow_id, "alice").expect("approves again");
        assert_eq!(workflow.approvals.len(), 1);
    }

    #[test]
    fn delegate_target_can_approve_the_slot() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        let workflow_id = create_workflow(&store, "s1", "db_write", 1, &["alice".to_string()], None, None, None).expect("creates");
        delegate(&store, &workflow_id, "alice", "carol").expect("delegates");
        let workflow = approve(&store, &workflow_id, "carol").expect("approves");
        assert_eq!(workflow.approvals, vec!["alice".to_string()]);
    }

    #[test]
    fn delegating_already_approved_slot_fails() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        let workflow_id = create_workflow(&store, "s1", "db_write", 1, &["alice".to_string()], None, None, None).expect("creates");
        approve(&store, &workflow_id, "alice").expect("approves");
        let result = delegate(&store, &workflow_id, "alice", "carol");
        assert!(matches!(result, Err(ApprovalError::AlreadyApproved { .. })));
    }

    #[test]
    fn unknown_token_prefix_is_invalid() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        assert!(!verify_workflow_token(&store, "not-a-workflow-token", "s1", "db_write").expect("checks"));
    }
}
