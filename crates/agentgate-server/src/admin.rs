// agentgate-server/src/admin.rs
// ============================================================================
// Module: Admin Surface
// Description: X-API-Key-gated CRUD over approvals, exceptions, replay,
//              incidents, and rollouts.
// Purpose: Let operators drive the governance surfaces without direct store
//          access.
// Dependencies: agentgate-core, agentgate-gateway, agentgate-policy
// ============================================================================

//! ## Overview
//! Every handler here first checks [`AppState::admin_key_matches`] against
//! the `X-API-Key` header; a mismatch (or a disabled admin surface) yields
//! `401` before any other work happens.

use agentgate_gateway::KillSwitch;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::state::AppState;

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), StatusCode> {
    let candidate = headers.get("x-api-key").and_then(|value| value.to_str().ok());
    if state.admin_key_matches(candidate) {
        Ok(())
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateWorkflowBody {
    session_id: String,
    tool_name: String,
    required_steps: u32,
    required_approvers: Vec<String>,
    #[serde(default)]
    requested_by: Option<String>,
    #[serde(default)]
    expires_in_seconds: Option<i64>,
}

/// `POST /admin/approvals/workflows`
pub async fn create_workflow(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<CreateWorkflowBody>) -> impl IntoResponse {
    if let Err(status) = require_admin(&state, &headers) {
        return status.into_response();
    }
    match agentgate_gateway::create_workflow(state.store.as_ref(), &body.session_id, &body.tool_name, body.required_steps, &body.required_approvers, body.requested_by.as_deref(), body.expires_in_seconds, None) {
        Ok(workflow_id) => (StatusCode::CREATED, Json(serde_json::json!({"workflow_id": workflow_id, "token": format!("wf:{workflow_id}")}))).into_response(),
        Err(err) => (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": err.to_string()}))).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ApproverBody {
    approver_id: String,
}

/// `POST /admin/approvals/workflows/{id}/approve`
pub async fn approve_workflow(State(state): State<AppState>, headers: HeaderMap, Path(workflow_id): Path<String>, Json(body): Json<ApproverBody>) -> impl IntoResponse {
    if let Err(status) = require_admin(&state, &headers) {
        return status.into_response();
    }
    match agentgate_gateway::approve(state.store.as_ref(), &workflow_id, &body.approver_id) {
        Ok(workflow) => (StatusCode::OK, Json(serde_json::json!({"workflow_id": workflow.workflow_id, "approvals": workflow.approvals}))).into_response(),
        Err(err) => (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": err.to_string()}))).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct DelegateBody {
    from: String,
    to: String,
}

/// `POST /admin/approvals/workflows/{id}/delegate`
pub async fn delegate_workflow(State(state): State<AppState>, headers: HeaderMap, Path(workflow_id): Path<String>, Json(body): Json<DelegateBody>) -> impl IntoResponse {
    if let Err(status) = require_admin(&state, &headers) {
        return status.into_response();
    }
    match agentgate_gateway::delegate(state.store.as_ref(), &workflow_id, &body.from, &body.to) {
        Ok(workflow) => (StatusCode::OK, Json(serde_json::json!({"workflow_id": workflow.workflow_id, "delegations": workflow.delegations}))).into_response(),
        Err(err) => (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": err.to_string()}))).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateExceptionBody {
    tool_name: String,
    reason: String,
    created_by: String,
    expires_in_seconds: i64,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    tenant_id: Option<String>,
}

/// `POST /admin/exceptions`
pub async fn create_exception(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<CreateExceptionBody>) -> impl IntoResponse {
    if let Err(status) = require_admin(&state, &headers) {
        return status.into_response();
    }
    if body.session_id.is_none() && body.tenant_id.is_none() {
        return (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": "at least one of session_id|tenant_id is required"}))).into_response();
    }
    let now = time::OffsetDateTime::now_utc();
    let exception = agentgate_core::PolicyException {
        exception_id: uuid::Uuid::new_v4().to_string(),
        tool_name: body.tool_name,
        reason: body.reason,
        created_by: body.created_by,
        created_at: now,
        expires_at: now + time::Duration::seconds(body.expires_in_seconds),
        session_id: body.session_id,
        tenant_id: body.tenant_id,
        revoked_by: None,
        revoked_at: None,
    };
    match state.store.create_exception(&exception) {
        Ok(()) => (StatusCode::CREATED, Json(serde_json::json!({"exception_id": exception.exception_id}))).into_response(),
        Err(err) => (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": err.to_string()}))).into_response(),
    }
}

/// `GET /admin/exceptions` — sweeps auto-expiry, then lists every
/// unrevoked exception.
pub async fn list_exceptions(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Err(status) = require_admin(&state, &headers) {
        return status.into_response();
    }
    match agentgate_policy::sweep_all_expired(state.store.as_ref()).and_then(|_| state.store.unrevoked_exceptions()) {
        Ok(exceptions) => (StatusCode::OK, Json(serde_json::json!({"exceptions": exceptions}))).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"error": err.to_string()}))).into_response(),
    }
}

/// `GET /admin/incidents`
pub async fn list_incidents(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Err(status) = require_admin(&state, &headers) {
        return status.into_response();
    }
    match state.store.active_incidents() {
        Ok(incidents) => (StatusCode::OK, Json(serde_json::json!({"incidents": incidents}))).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"error": err.to_string()}))).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ReleaseIncidentBody {
    released_by: String,
}

/// `POST /admin/incidents/{session_id}/release`
pub async fn release_incident(State(state): State<AppState>, headers: HeaderMap, Path(session_id): Path<String>, Json(body): Json<ReleaseIncidentBody>) -> impl IntoResponse {
    if let Err(status) = require_admin(&state, &headers) {
        return status.into_response();
    }
    let kill_switch = KillSwitch::new(state.kv.as_ref());
    match state.quarantine.release_incident(state.store.as_ref(), &kill_switch, &session_id, &body.released_by) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"error": err.to_string()}))).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct StartRolloutBody {
    tenant_id: String,
    baseline_version: String,
    candidate_version: String,
    #[serde(default)]
    error_rate: f64,
}

/// `POST /admin/rollouts/start` — runs a fresh policy replay against the
/// local evaluator pair and gates promotion by the canary budget.
pub async fn start_rollout(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<StartRolloutBody>) -> impl IntoResponse {
    if let Err(status) = require_admin(&state, &headers) {
        return status.into_response();
    }
    let run = agentgate_core::ReplayRun {
        run_id: uuid::Uuid::new_v4().to_string(),
        baseline_policy_version: body.baseline_version.clone(),
        candidate_policy_version: body.candidate_version.clone(),
        session_id: None,
        status: agentgate_core::ReplayRunStatus::Pending,
        created_at: time::OffsetDateTime::now_utc(),
        completed_at: None,
    };
    if let Err(err) = state.store.create_replay_run(&run) {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"error": err.to_string()}))).into_response();
    }
    if let Err(err) = agentgate_gateway::run_replay(state.store.as_ref(), &run, &state.local_evaluator, &state.local_evaluator) {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"error": err.to_string()}))).into_response();
    }
    let summary = match agentgate_gateway::summarize(state.store.as_ref(), &run.run_id) {
        Ok(summary) => summary,
        Err(err) => return (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"error": err.to_string()}))).into_response(),
    };
    match agentgate_gateway::start_rollout(state.store.as_ref(), &body.tenant_id, &body.baseline_version, &body.candidate_version, &summary, body.error_rate, agentgate_gateway::CanaryBudget::default()) {
        Ok(rollout) => (StatusCode::CREATED, Json(serde_json::json!(rollout))).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"error": err.to_string()}))).into_response(),
    }
}

/// `POST /admin/rollouts/{id}/rollback`
pub async fn rollback_rollout(State(state): State<AppState>, headers: HeaderMap, Path(rollout_id): Path<String>, Json(body): Json<ReasonBody>) -> impl IntoResponse {
    if let Err(status) = require_admin(&state, &headers) {
        return status.into_response();
    }
    match agentgate_gateway::rollback_rollout(state.store.as_ref(), &rollout_id, &body.reason.unwrap_or_else(|| "rolled back by operator".to_string())) {
        Ok(rollout) => (StatusCode::OK, Json(serde_json::json!(rollout))).into_response(),
        Err(err) => (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": err.to_string()}))).into_response(),
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct ReasonBody {
    #[serde(default)]
    reason: Option<String>,
}

/// `POST /admin/policies/reload` — no-op placeholder acknowledging receipt;
/// policy hot-reload is driven by the signed-package verification path at
/// startup, not by this endpoint, in the current build.
pub async fn reload_policies(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Err(status) = require_admin(&state, &headers) {
        return status.into_response();
    }
    StatusCode::OK.into_response()
}
