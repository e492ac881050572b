// agentgate-server/src/build.rs
// ============================================================================
// Module: Router Assembly
// Description: Wires configuration into AppState and builds the axum Router.
// Purpose: Provide the single entry point a binary needs to start serving.
// Dependencies: agentgate-config, agentgate-policy, agentgate-store-sqlite
// ============================================================================

//! ## Overview
//! [`build_router`] loads [`GatewayConfig`], opens the trace store, builds
//! the policy and credential backends it points at, and assembles the full
//! route table behind the correlation-id and body-size middleware. The
//! remote policy engine is mandatory: the local evaluator is never an
//! automatic fallback for it, so a missing `AGENTGATE_OPA_URL` fails startup
//! outright rather than silently downgrading enforcement.

use std::fs;
use std::sync::Arc;

use agentgate_broker::StubCredentialProvider;
use agentgate_config::ConfigError;
use agentgate_config::GatewayConfig;
use agentgate_core::PolicyError;
use agentgate_core::StoreError;
use agentgate_gateway::InMemoryKv;
use agentgate_gateway::QuarantineCoordinator;
use agentgate_gateway::RateLimiter;
use agentgate_gateway::TaintTracker;
use agentgate_gateway::DEFAULT_THRESHOLD;
use agentgate_policy::LocalEvaluator;
use agentgate_policy::RemotePolicyClient;
use agentgate_policy::SignedPolicyError;
use agentgate_store_sqlite::SqliteTraceStore;
use axum::middleware;
use axum::routing::get;
use axum::routing::post;
use axum::Router;
use thiserror::Error;

use crate::admin;
use crate::executor::EchoToolExecutor;
use crate::middleware::correlation_id;
use crate::middleware::limit_body_size;
use crate::routes;
use crate::state::AppState;

/// Calls permitted per `(subject, tool)` bucket per window. Not yet exposed
/// as its own `AGENTGATE_*` variable; revisit alongside
/// `AGENTGATE_RATE_WINDOW_SECONDS` if per-deployment tuning is needed.
const DEFAULT_RATE_LIMIT_PER_WINDOW: u32 = 100;

/// Errors raised while assembling the server from its configuration.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration could not be loaded from the environment.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// The trace store could not be opened.
    #[error("trace store error: {0}")]
    Store(#[from] StoreError),
    /// The remote policy engine is not configured; the gateway cannot start
    /// without one.
    #[error("AGENTGATE_OPA_URL is required to start the gateway")]
    MissingPolicyEngine,
    /// The remote policy client could not be constructed.
    #[error("policy client error: {0}")]
    Policy(#[from] PolicyError),
    /// The signed policy package at `AGENTGATE_POLICY_PATH` could not be
    /// read or parsed.
    #[error("failed to read policy package at {path}: {detail}")]
    PolicyPackageUnreadable {
        /// Configured path.
        path: String,
        /// Underlying I/O or JSON error.
        detail: String,
    },
    /// The signed policy package failed verification setup.
    #[error("policy package verification error: {0}")]
    SignedPolicy(#[from] SignedPolicyError),
}

/// Builds the [`LocalEvaluator`] from the configured signed policy package,
/// or an empty (deny-all) evaluator if none is configured.
fn load_local_evaluator(config: &GatewayConfig) -> Result<LocalEvaluator, ServerError> {
    let Some(path) = &config.policy_path else {
        return Ok(LocalEvaluator::new(Default::default(), Default::default()));
    };
    let raw = fs::read_to_string(path).map_err(|err| ServerError::PolicyPackageUnreadable { path: path.clone(), detail: err.to_string() })?;
    let package: agentgate_policy::SignedPolicyPackage =
        serde_json::from_str(&raw).map_err(|err| ServerError::PolicyPackageUnreadable { path: path.clone(), detail: err.to_string() })?;
    let secret = config.policy_package_secret.as_deref().unwrap_or_default();
    let bundle = agentgate_policy::load_verified_bundle(&package, secret.as_bytes())?;
    Ok(LocalEvaluator::new(bundle.read_only_tools.into_iter().collect(), bundle.write_tools.into_iter().collect()))
}

/// Loads configuration, builds every backend it names, and assembles the
/// full axum [`Router`].
///
/// # Errors
///
/// Returns [`ServerError`] if configuration is invalid, the trace store
/// cannot be opened, the policy package cannot be read/verified, or no
/// remote policy engine is configured.
pub fn build_router() -> Result<Router, ServerError> {
    let config = GatewayConfig::from_env()?;
    let store = Arc::new(SqliteTraceStore::open(&config.trace_db)?);
    let opa_url = config.opa_url.clone().ok_or(ServerError::MissingPolicyEngine)?;
    let policy = Arc::new(RemotePolicyClient::new(opa_url, "unversioned")?);
    let local_evaluator = Arc::new(load_local_evaluator(&config)?);
    let state = AppState {
        store,
        kv: Arc::new(InMemoryKv::default()),
        policy,
        local_evaluator,
        quarantine: Arc::new(QuarantineCoordinator::new(DEFAULT_THRESHOLD)),
        rate_limiter: Arc::new(RateLimiter::new(i64::try_from(config.rate_window_seconds).unwrap_or(i64::MAX), DEFAULT_RATE_LIMIT_PER_WINDOW)),
        taint: Arc::new(TaintTracker::new(config.dlp_blocked_labels, config.dlp_exfiltration_tools)),
        credentials: Arc::new(StubCredentialProvider::new()),
        executor: Arc::new(EchoToolExecutor::new()),
        audit: Arc::new(agentgate_gateway::StderrAuditSink),
        admin_api_key: config.admin_api_key,
        transparency_anchor_url: config.transparency_anchor_url,
        approval_token: config.approval_token,
    };

    Ok(Router::new()
        .route("/tools/call", post(routes::call_tool))
        .route("/tools/list", get(routes::list_tools))
        .route("/tools/{name}/kill", post(routes::kill_tool))
        .route("/sessions", get(routes::list_sessions))
        .route("/sessions/{id}/kill", post(routes::kill_session))
        .route("/sessions/{id}/evidence", get(routes::session_evidence))
        .route("/system/pause", post(routes::system_pause))
        .route("/system/resume", post(routes::system_resume))
        .route("/health", get(routes::health))
        .route("/metrics", get(routes::metrics))
        .route("/admin/policies/reload", post(admin::reload_policies))
        .route("/admin/approvals/workflows", post(admin::create_workflow))
        .route("/admin/approvals/workflows/{id}/approve", post(admin::approve_workflow))
        .route("/admin/approvals/workflows/{id}/delegate", post(admin::delegate_workflow))
        .route("/admin/exceptions", post(admin::create_exception).get(admin::list_exceptions))
        .route("/admin/incidents", get(admin::list_incidents))
        .route("/admin/incidents/{session_id}/release", post(admin::release_incident))
        .route("/admin/rollouts/start", post(admin::start_rollout))
        .route("/admin/rollouts/{id}/rollback", post(admin::rollback_rollout))
        .layer(middleware::from_fn(limit_body_size))
        .layer(middleware::from_fn(correlation_id))
        .with_state(state))
}
