// agentgate-policy/src/remote.rs
// ============================================================================
// Module: Remote Policy Client
// Description: Fail-closed HTTP client for an OPA-style policy engine.
// Purpose: Evaluate tool calls against a remote policy engine with a hard
//          5-second timeout and no automatic local fallback.
// Dependencies: agentgate-core, reqwest
// ============================================================================

//! ## Overview
//! Any transport error, non-2xx status, or malformed response body is
//! reported as `DENY (opa_unavailable)` — the fail-closed contract named in
//! the policy subsystem. The local evaluator is never consulted as a
//! fallback from here.

use std::collections::BTreeMap;
use std::time::Duration;

use agentgate_core::PolicyAction;
use agentgate_core::PolicyClient;
use agentgate_core::PolicyDecision;
use agentgate_core::PolicyError;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// Timeout applied to every outbound policy-engine call.
const POLICY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct EvaluateRequest<'a> {
    input: EvaluateInput<'a>,
}

#[derive(Debug, Serialize)]
struct EvaluateInput<'a> {
    tool_name: &'a str,
    arguments: &'a BTreeMap<String, Value>,
    session_id: &'a str,
    context: &'a BTreeMap<String, Value>,
    has_approval_token: bool,
    approval_token: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EvaluateResponse {
    action: PolicyAction,
    reason: String,
    matched_rule: Option<String>,
    allowed_scope: Option<String>,
    #[serde(default)]
    credential_ttl_seconds: Option<u32>,
    #[serde(default)]
    is_write_action: bool,
}

/// Policy client backed by a remote OPA-style HTTP engine.
pub struct RemotePolicyClient {
    base_url: String,
    policy_version: String,
    client: Client,
}

impl RemotePolicyClient {
    /// Builds a client targeting `base_url`, reporting `policy_version` as
    /// the version currently in effect.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Unavailable`] if the HTTP client cannot be
    /// constructed.
    pub fn new(base_url: impl Into<String>, policy_version: impl Into<String>) -> Result<Self, PolicyError> {
        let client = Client::builder()
            .timeout(POLICY_TIMEOUT)
            .build()
            .map_err(|err| PolicyError::Unavailable(err.to_string()))?;
        Ok(Self { base_url: base_url.into(), policy_version: policy_version.into(), client })
    }
}

impl PolicyClient for RemotePolicyClient {
    fn evaluate(&self, tool_name: &str, arguments: &BTreeMap<String, Value>, context: &BTreeMap<String, Value>) -> Result<PolicyDecision, PolicyError> {
        let has_approval_token = context.get("approval_token").and_then(Value::as_str).is_some_and(|token| !token.is_empty());
        let approval_token = context.get("approval_token").and_then(Value::as_str);
        let session_id = context.get("session_id").and_then(Value::as_str).unwrap_or_default();
        let body = EvaluateRequest {
            input: EvaluateInput { tool_name, arguments, session_id, context, has_approval_token, approval_token },
        };
        let response = self
            .client
            .post(format!("{}/v1/evaluate", self.base_url))
            .json(&body)
            .send()
            .map_err(|err| PolicyError::Unavailable(err.to_string()))?;
        if !response.status().is_success() {
            return Err(PolicyError::Unavailable(format!("policy engine returned status {}", response.status())));
        }
        let decoded: EvaluateResponse = response.json().map_err(|err| PolicyError::Malformed(err.to_string()))?;
        Ok(PolicyDecision {
            action: decoded.action,
            reason: decoded.reason,
            matched_rule: decoded.matched_rule,
            allowed_scope: decoded.allowed_scope,
            credential_ttl_seconds: decoded.credential_ttl_seconds.unwrap_or(PolicyDecision::DEFAULT_CREDENTIAL_TTL_SECONDS),
            is_write_action: decoded.is_write_action,
        })
    }

    fn policy_version(&self) -> String {
        self.policy_version.clone()
    }
}

/// Wraps any evaluation failure from a [`PolicyClient`] into the fail-closed
/// `opa_unavailable` denial, for callers that hold a `dyn PolicyClient` and
/// must never let a transport error escape as an exception.
#[must_use]
pub fn fail_closed_deny() -> PolicyDecision {
    PolicyDecision::deny("Policy denied: Policy engine unavailable", "opa_unavailable")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;

    #[test]
    fn fail_closed_deny_has_expected_shape() {
        let decision = fail_closed_deny();
        assert_eq!(decision.action, PolicyAction::Deny);
        assert_eq!(decision.matched_rule.as_deref(), Some("opa_unavailable"));
    }

    #[test]
    fn unreachable_host_reports_unavailable() {
        let client = RemotePolicyClient::new("http://127.0.0.1:1", "v1").expect("builds");
        let result = client.evaluate("db_query", &BTreeMap::new(), &BTreeMap::new());
        assert!(matches!(result, Err(PolicyError::Unavailable(_))));
    }
}
