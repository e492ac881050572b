// agentgate-server/src/routes.rs
// ============================================================================
// Module: Stable HTTP Routes
// Description: call_tool, tool listing, session/tool administration, and
//              evidence/health/metrics endpoints.
// Purpose: Implement the public, unauthenticated verb surface.
// Dependencies: agentgate-core, agentgate-gateway
// ============================================================================

//! ## Overview
//! Handlers borrow everything they need from [`AppState`] and build a fresh
//! [`agentgate_gateway::Orchestrator`] per call; the orchestrator itself is
//! stateless over the components it borrows.

use std::collections::BTreeMap;

use agentgate_core::EvidenceArchive;
use agentgate_core::EvidenceFormat;
use agentgate_core::ToolCallRequest;
use agentgate_gateway::KillSwitch;
use agentgate_gateway::Orchestrator;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::state::AppState;

/// Persists `payload` as a write-once evidence archive keyed by
/// `(session_id, format, integrity_hash)`, ignoring (but not masking from the
/// caller) a write failure — the export itself still succeeds.
fn persist_evidence_archive(state: &AppState, session_id: &str, format: EvidenceFormat, payload: Vec<u8>) {
    let integrity_hash = agentgate_core::hash_bytes(&payload);
    let archive = EvidenceArchive { archive_id: Uuid::new_v4().to_string(), session_id: session_id.to_string(), format, payload, integrity_hash, created_at: OffsetDateTime::now_utc() };
    let _ = state.store.create_evidence_archive(&archive);
}

fn decision_label(decision: agentgate_core::PolicyAction) -> &'static str {
    match decision {
        agentgate_core::PolicyAction::Allow => "allow",
        agentgate_core::PolicyAction::Deny => "deny",
        agentgate_core::PolicyAction::RequireApproval => "require_approval",
    }
}

/// `POST /tools/call`.
pub async fn call_tool(State(state): State<AppState>, Json(request): Json<ToolCallRequest>) -> impl IntoResponse {
    let orchestrator = Orchestrator {
        store: state.store.as_ref(),
        kv: state.kv.as_ref(),
        policy: state.policy.as_ref(),
        quarantine: state.quarantine.as_ref(),
        rate_limiter: state.rate_limiter.as_ref(),
        taint: state.taint.as_ref(),
        credentials: state.credentials.as_ref(),
        executor: state.executor.as_ref(),
        audit: state.audit.as_ref(),
        approval_token: state.approval_token.as_deref(),
    };
    match orchestrator.call_tool(&request) {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"error": err.to_string()}))).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListToolsQuery {
    #[serde(default)]
    #[allow(dead_code, reason = "Accepted for forward compatibility with per-session tool scoping; not yet applied to the listing.")]
    session_id: Option<String>,
}

/// `GET /tools/list?session_id=...`
pub async fn list_tools(State(state): State<AppState>, Query(_query): Query<ListToolsQuery>) -> impl IntoResponse {
    Json(serde_json::json!({ "tools": state.listable_tools() }))
}

/// `GET /sessions`
pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.all_trace_events() {
        Ok(events) => {
            let sessions: std::collections::BTreeSet<String> = events.into_iter().map(|event| event.session_id).collect();
            (StatusCode::OK, Json(serde_json::json!({ "sessions": sessions }))).into_response()
        }
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"error": err.to_string()}))).into_response(),
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct ReasonBody {
    #[serde(default)]
    reason: Option<String>,
}

fn default_reason(body: &ReasonBody, default: &str) -> String {
    body.reason.clone().unwrap_or_else(|| default.to_string())
}

/// `POST /sessions/{id}/kill`
pub async fn kill_session(State(state): State<AppState>, Path(session_id): Path<String>, body: Option<Json<ReasonBody>>) -> impl IntoResponse {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let kill_switch = KillSwitch::new(state.kv.as_ref());
    match kill_switch.kill_session(&session_id, &default_reason(&body, "killed by operator")) {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// `POST /tools/{name}/kill`
pub async fn kill_tool(State(state): State<AppState>, Path(tool_name): Path<String>, body: Option<Json<ReasonBody>>) -> impl IntoResponse {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let kill_switch = KillSwitch::new(state.kv.as_ref());
    match kill_switch.kill_tool(&tool_name, &default_reason(&body, "killed by operator")) {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// `POST /system/pause`
pub async fn system_pause(State(state): State<AppState>, body: Option<Json<ReasonBody>>) -> impl IntoResponse {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let kill_switch = KillSwitch::new(state.kv.as_ref());
    match kill_switch.global_pause(&default_reason(&body, "paused by operator")) {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// `POST /system/resume`
pub async fn system_resume(State(state): State<AppState>) -> impl IntoResponse {
    let kill_switch = KillSwitch::new(state.kv.as_ref());
    match kill_switch.resume() {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[derive(Debug, Deserialize)]
pub struct EvidenceQuery {
    format: String,
    #[serde(default)]
    #[allow(dead_code, reason = "Accepted for forward compatibility with themed HTML export; not yet rendered.")]
    theme: Option<String>,
}

/// `GET /sessions/{id}/evidence?format=json|html|pdf`
pub async fn session_evidence(State(state): State<AppState>, Path(session_id): Path<String>, Query(query): Query<EvidenceQuery>) -> impl IntoResponse {
    match query.format.as_str() {
        "json" => match state.store.trace_events_for_session(&session_id) {
            Ok(events) => {
                let body = serde_json::json!({ "session_id": session_id, "events": events });
                let payload = serde_json::to_vec(&body).unwrap_or_default();
                persist_evidence_archive(&state, &session_id, EvidenceFormat::Json, payload);
                (StatusCode::OK, Json(body)).into_response()
            }
            Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"error": err.to_string()}))).into_response(),
        },
        "html" => match state.store.trace_events_for_session(&session_id) {
            Ok(events) => {
                let rows: String = events.iter().map(|event| format!("<tr><td>{}</td><td>{}</td><td>{}</td></tr>", event.event_id, event.tool_name, decision_label(event.policy_decision))).collect();
                let html = format!("<table>{rows}</table>");
                persist_evidence_archive(&state, &session_id, EvidenceFormat::Html, html.clone().into_bytes());
                (StatusCode::OK, axum::response::Html(html)).into_response()
            }
            Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"error": err.to_string()}))).into_response(),
        },
        "pdf" => StatusCode::NOT_IMPLEMENTED.into_response(),
        other => (StatusCode::UNPROCESSABLE_ENTITY, Json(serde_json::json!({"error": format!("unsupported format {other}")}))).into_response(),
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    opa: bool,
    redis: bool,
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let opa = state.policy.evaluate("__health_probe__", &BTreeMap::new(), &BTreeMap::new()).is_ok();
    let response = HealthResponse { status: if opa { "ok" } else { "degraded" }, version: env!("CARGO_PKG_VERSION"), opa, redis: false };
    Json(response)
}

/// `GET /metrics` — Prometheus text exposition.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let event_count = state.store.all_trace_events().map(|events| events.len()).unwrap_or(0);
    let body = format!(
        "# HELP agentgate_trace_events_total Total trace events recorded.\n\
         # TYPE agentgate_trace_events_total counter\n\
         agentgate_trace_events_total {event_count}\n"
    );
    ([(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}
