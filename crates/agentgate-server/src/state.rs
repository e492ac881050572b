// agentgate-server/src/state.rs
// ============================================================================
// Module: Application State
// Description: Shared handles the HTTP layer needs for every request.
// Purpose: Bundle the enforcement core's components into axum's State.
// Dependencies: agentgate-core, agentgate-gateway, agentgate-policy
// ============================================================================

//! ## Overview
//! [`AppState`] is cloned cheaply (every field is an `Arc`) into each axum
//! handler. It owns no request-scoped data; the orchestrator is built fresh
//! per call from borrowed references into these `Arc`s.

use std::collections::BTreeSet;
use std::sync::Arc;

use agentgate_core::AuditSink;
use agentgate_core::CredentialProvider;
use agentgate_core::Kv;
use agentgate_core::PolicyClient;
use agentgate_core::ToolExecutor;
use agentgate_core::TraceStore;
use agentgate_gateway::QuarantineCoordinator;
use agentgate_gateway::RateLimiter;
use agentgate_gateway::TaintTracker;
use agentgate_policy::LocalEvaluator;

/// Shared application state handed to every axum handler.
#[derive(Clone)]
pub struct AppState {
    /// Append-only trace/incident/workflow/exception storage.
    pub store: Arc<dyn TraceStore>,
    /// Kill-switch KV backend.
    pub kv: Arc<dyn Kv>,
    /// Remote policy evaluation backend consulted by the orchestrator.
    pub policy: Arc<dyn PolicyClient>,
    /// Local evaluator used only for `/tools/list` and replay/shadow analysis.
    pub local_evaluator: Arc<LocalEvaluator>,
    /// Risk-score accumulator driving session quarantine.
    pub quarantine: Arc<QuarantineCoordinator>,
    /// Sliding-window rate limiter.
    pub rate_limiter: Arc<RateLimiter>,
    /// Taint/DLP guard.
    pub taint: Arc<TaintTracker>,
    /// Credential broker.
    pub credentials: Arc<dyn CredentialProvider>,
    /// Tool execution backend.
    pub executor: Arc<dyn ToolExecutor>,
    /// Structured audit sink.
    pub audit: Arc<dyn AuditSink>,
    /// `X-API-Key` value required on `/admin/*`. `None` disables the admin
    /// surface entirely.
    pub admin_api_key: Option<String>,
    /// URL transparency checkpoints are optionally anchored to.
    pub transparency_anchor_url: Option<String>,
    /// Configured shared-secret approval token (`AGENTGATE_APPROVAL_TOKEN`),
    /// accepted alongside per-workflow tokens at stage 7.
    pub approval_token: Option<String>,
}

impl AppState {
    /// Returns true when `candidate` matches the configured admin API key.
    #[must_use]
    pub fn admin_key_matches(&self, candidate: Option<&str>) -> bool {
        match (&self.admin_api_key, candidate) {
            (Some(expected), Some(candidate)) => {
                use subtle::ConstantTimeEq;
                expected.as_bytes().ct_eq(candidate.as_bytes()).into()
            }
            _ => false,
        }
    }

    /// Tools whose local evaluation is `ALLOW` with no approval token
    /// required, for `/tools/list`.
    #[must_use]
    pub fn listable_tools(&self) -> BTreeSet<String> {
        self.local_evaluator
            .all_known_tools()
            .into_iter()
            .filter(|tool_name| matches!(self.local_evaluator.evaluate(tool_name.as_str(), false).action, agentgate_core::PolicyAction::Allow))
            .collect()
    }
}
