// agentgate-server/src/lib.rs
// ============================================================================
// Module: AgentGate HTTP Server
// Description: Axum HTTP surface binding the enforcement core to REST.
// Purpose: Expose call_tool, session/tool administration, evidence export,
//          health, and Prometheus metrics over HTTP.
// Dependencies: agentgate-core, agentgate-gateway, agentgate-policy, axum
// ============================================================================

//! ## Overview
//! `agentgate-server` wires the gateway crate's orchestrator and enforcement
//! components into an axum [`axum::Router`]. Routes mirror the stable verb
//! surface: `/tools/call`, `/tools/list`, `/sessions*`, `/system/*`,
//! `/sessions/{id}/evidence`, `/health`, `/metrics`, and an `X-API-Key`-gated
//! `/admin/*` tree.

pub mod admin;
pub mod build;
pub mod executor;
pub mod middleware;
pub mod routes;
pub mod state;

pub use build::build_router;
pub use build::ServerError;
pub use state::AppState;
