// agentgate-gateway/src/orchestrator.rs
// ============================================================================
// Module: Call Orchestrator
// Description: The ten-stage enforcement pipeline behind `call_tool`.
// Purpose: Bind validation, kill switch, quarantine, rate limiting, policy,
//          taint, approval, brokered execution, risk scoring, and tracing
//          into the single entry point the gateway exposes.
// Dependencies: agentgate-core, agentgate-broker, agentgate-policy
// ============================================================================

//! ## Overview
//! The orchestrator is the only writer of [`agentgate_core::TraceEvent`].
//! Every call appends exactly one, regardless of which stage terminated it.
//! Stages run in strict order; none of them is retried or reordered.

use std::time::Instant;

use agentgate_core::AuditRecord;
use agentgate_core::AuditSink;
use agentgate_core::CredentialProvider;
use agentgate_core::Kv;
use agentgate_core::PolicyAction;
use agentgate_core::PolicyClient;
use agentgate_core::PolicyDecision;
use agentgate_core::ToolCallRequest;
use agentgate_core::ToolCallResponse;
use agentgate_core::ToolExecutor;
use agentgate_core::TraceEvent;
use agentgate_core::TraceStore;
use agentgate_policy::match_exception;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::kill_switch::BlockState;
use crate::kill_switch::KillSwitch;
use crate::quarantine::QuarantineCoordinator;
use crate::rate_limiter::RateLimiter;
use crate::taint::TaintTracker;
use crate::validation::is_valid_session_id;
use crate::validation::is_valid_tool_name;

/// Everything the orchestrator needs to enforce and trace one tool call.
pub struct Orchestrator<'a> {
    /// Append-only trace/incident/workflow/exception storage.
    pub store: &'a dyn TraceStore,
    /// Kill-switch KV backend.
    pub kv: &'a dyn Kv,
    /// Remote policy evaluation backend.
    pub policy: &'a dyn PolicyClient,
    /// Risk-score accumulator driving session quarantine.
    pub quarantine: &'a QuarantineCoordinator,
    /// Sliding-window rate limiter.
    pub rate_limiter: &'a RateLimiter,
    /// Taint/DLP guard.
    pub taint: &'a TaintTracker,
    /// Credential broker.
    pub credentials: &'a dyn CredentialProvider,
    /// Tool execution backend.
    pub executor: &'a dyn ToolExecutor,
    /// Structured audit sink.
    pub audit: &'a dyn AuditSink,
    /// Configured shared-secret approval token (`AGENTGATE_APPROVAL_TOKEN`),
    /// accepted alongside per-workflow tokens at stage 7.
    pub approval_token: Option<&'a str>,
}

struct Outcome {
    decision: PolicyDecision,
    executed: bool,
    result: Option<serde_json::Value>,
    error: Option<String>,
    duration_ms: Option<u64>,
}

impl Outcome {
    fn denied(decision: PolicyDecision) -> Self {
        let error = Some(decision.reason.clone());
        Self { decision, executed: false, result: None, error, duration_ms: None }
    }
}

impl<'a> Orchestrator<'a> {
    /// Runs the full pipeline for `request`, appending exactly one trace
    /// event and returning the response the caller sees.
    ///
    /// # Errors
    ///
    /// Returns [`agentgate_core::StoreError`] only when the final trace
    /// append itself fails; every other failure is converted into a
    /// `success=false` response plus a trace event.
    #[allow(clippy::too_many_lines, reason = "Single linear pipeline mirroring the ten enforcement stages.")]
    pub fn call_tool(&self, request: &ToolCallRequest) -> Result<ToolCallResponse, agentgate_core::StoreError> {
        let event_id = Uuid::new_v4().to_string();
        let timestamp = OffsetDateTime::now_utc();

        // Stage 1: identity + validation.
        let arguments_hash = agentgate_core::hash_arguments_safe(&request.arguments);
        if !is_valid_session_id(&request.session_id) || !is_valid_tool_name(&request.tool_name) {
            let decision = PolicyDecision::deny("Policy denied: Invalid tool name", "invalid_tool_name");
            return self.finish(request, &event_id, timestamp, arguments_hash, Outcome::denied(decision));
        }

        // Stage 2: kill switch.
        let kill_switch = KillSwitch::new(self.kv);
        match kill_switch.is_blocked(&request.tool_name, &request.session_id) {
            BlockState::Blocked(reason) => {
                let decision = PolicyDecision::deny(format!("Policy denied: {reason}"), "kill_switch");
                return self.finish(request, &event_id, timestamp, arguments_hash, Outcome::denied(decision));
            }
            BlockState::Unavailable => {
                let decision = PolicyDecision::deny("Policy denied: Kill switch unavailable", "kill_switch");
                return self.finish(request, &event_id, timestamp, arguments_hash, Outcome::denied(decision));
            }
            BlockState::Allowed => {}
        }

        // Stage 3: quarantine.
        if self.quarantine.is_quarantined(&request.session_id) {
            let decision = PolicyDecision::deny("Policy denied: Session quarantined", "quarantine");
            return self.finish(request, &event_id, timestamp, arguments_hash, Outcome::denied(decision));
        }

        // Stage 4: rate limit.
        let subject_id = request.subject_id().to_string();
        if !self.rate_limiter.allow(&subject_id, &request.tool_name, timestamp) {
            let decision = PolicyDecision::deny("Policy denied: Rate limit exceeded", "rate_limit");
            return self.finish(request, &event_id, timestamp, arguments_hash, Outcome::denied(decision));
        }

        // Stage 5: policy evaluation, short-circuited by a matching exception.
        let tenant_id = request.context.get("tenant_id").and_then(serde_json::Value::as_str);
        let exception = match_exception(self.store, &request.tool_name, Some(&request.session_id), tenant_id)?;
        let mut decision = if let Some(exception) = exception {
            PolicyDecision::allow(format!("Policy exception: {}", exception.reason), "policy_exception", "exception", false)
        } else {
            let mut policy_context = request.context.clone();
            policy_context.insert("session_id".to_string(), serde_json::Value::String(request.session_id.clone()));
            if let Some(token) = request.approval_token.as_deref().filter(|token| !token.is_empty()) {
                policy_context.insert("approval_token".to_string(), serde_json::Value::String(token.to_string()));
            }
            match self.policy.evaluate(&request.tool_name, &request.arguments, &policy_context) {
                Ok(decision) => decision,
                Err(_) => agentgate_policy::fail_closed_deny(),
            }
        };

        // Stage 6: taint / DLP guard.
        let taint_labels: Vec<String> = request
            .context
            .get("taint_labels")
            .and_then(serde_json::Value::as_array)
            .map(|values| values.iter().filter_map(|value| value.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let contains_sensitive_data = request.context.get("contains_sensitive_data").and_then(serde_json::Value::as_bool).unwrap_or(false);
        match self.taint.observe_context(self.store, &request.session_id, &taint_labels, contains_sensitive_data) {
            Ok(()) => match self.taint.block_reason(self.store, &request.session_id, &request.tool_name) {
                Ok(Some(reason)) => decision = PolicyDecision::deny(format!("Policy denied: {reason}"), "dlp_taint"),
                Ok(None) => {}
                Err(_) => decision = PolicyDecision::deny("Policy denied: Taint tracker unavailable", "dlp_taint"),
            },
            Err(_) => decision = PolicyDecision::deny("Policy denied: Taint tracker unavailable", "dlp_taint"),
        }

        if decision.action == PolicyAction::Deny {
            return self.finish(request, &event_id, timestamp, arguments_hash, Outcome::denied(decision));
        }

        // Stage 7: approval.
        if decision.action == PolicyAction::RequireApproval {
            let presented = request.approval_token.as_deref();
            let workflow_ok = match presented {
                Some(token) if !token.is_empty() => crate::approval::verify_workflow_token(self.store, token, &request.session_id, &request.tool_name).unwrap_or(false),
                _ => false,
            };
            let shared_secret_ok = agentgate_policy::is_valid_approval_token(presented, self.approval_token.unwrap_or(""), None);
            let approved = workflow_ok || shared_secret_ok;
            if !approved {
                let outcome = Outcome {
                    decision: decision.clone(),
                    executed: false,
                    result: None,
                    error: Some(format!("Approval required: {}", decision.reason)),
                    duration_ms: None,
                };
                return self.finish(request, &event_id, timestamp, arguments_hash, outcome);
            }
            decision.action = PolicyAction::Allow;
        }

        // Stage 8: credential brokering + execution.
        let scope = decision.allowed_scope.clone().unwrap_or_else(|| "default".to_string());
        let start = Instant::now();
        let outcome = match self.credentials.issue(&scope, decision.credential_ttl_seconds) {
            Ok(credential) => match self.executor.execute(&request.tool_name, &request.arguments, &credential) {
                Ok(result) => Outcome { decision: decision.clone(), executed: true, result: Some(result), error: None, duration_ms: Some(elapsed_ms(start)) },
                Err(err) => Outcome { decision: decision.clone(), executed: false, result: None, error: Some(format!("Tool execution failed: {err}")), duration_ms: Some(elapsed_ms(start)) },
            },
            Err(err) => Outcome { decision: decision.clone(), executed: false, result: None, error: Some(format!("Tool execution failed: {err}")), duration_ms: Some(elapsed_ms(start)) },
        };

        self.finish(request, &event_id, timestamp, arguments_hash, outcome)
    }

    fn finish(&self, request: &ToolCallRequest, event_id: &str, timestamp: OffsetDateTime, arguments_hash: String, outcome: Outcome) -> Result<ToolCallResponse, agentgate_core::StoreError> {
        let event = TraceEvent {
            event_id: event_id.to_string(),
            timestamp,
            session_id: request.session_id.clone(),
            user_id: request.user_id().map(str::to_string),
            agent_id: request.agent_id().map(str::to_string),
            tool_name: request.tool_name.clone(),
            arguments_hash,
            policy_version: self.policy.policy_version(),
            policy_decision: outcome.decision.action,
            policy_reason: outcome.decision.reason.clone(),
            matched_rule: outcome.decision.matched_rule.clone(),
            executed: outcome.executed,
            duration_ms: outcome.duration_ms,
            error: outcome.error.clone(),
            is_write_action: outcome.decision.is_write_action,
            approval_token_present: request.approval_token.as_deref().is_some_and(|token| !token.is_empty()),
        };

        // Stage 9: observe (risk scoring). Must not block the response on
        // anything beyond the coordinator's own trace writes.
        let kill_switch = KillSwitch::new(self.kv);
        let _ = self.quarantine.observe(self.store, self.credentials, &kill_switch, &request.session_id, outcome.decision.action, outcome.error.is_some(), &outcome.decision.reason);

        // Stage 10: trace. Synchronous so `trace_id` is always retrievable.
        self.store.append_trace_event(&event)?;

        let mut fields = std::collections::BTreeMap::new();
        fields.insert("trace_id".to_string(), serde_json::Value::String(event_id.to_string()));
        fields.insert("tool_name".to_string(), serde_json::Value::String(request.tool_name.clone()));
        fields.insert("decision".to_string(), serde_json::to_value(outcome.decision.action).unwrap_or(serde_json::Value::Null));
        let _ = self.audit.record(&AuditRecord { category: "tool_call", fields });

        Ok(ToolCallResponse { success: outcome.executed && outcome.error.is_none(), result: outcome.result, error: outcome.error, trace_id: event_id.to_string() })
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, reason = "Test-only assertions are permitted.")]
mod tests {
    use std::collections::BTreeMap;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    use agentgate_core::BrokeredCredential;
    use agentgate_core::CredentialError;
    use agentgate_core::ExecutorError;
    use agentgate_core::KvError;
    use agentgate_core::PolicyError;
    use agentgate_store_sqlite::SqliteTraceStore;

    use super::*;
    use crate::audit::NoopAuditSink;
    use crate::quarantine::DEFAULT_THRESHOLD;

    #[derive(Default)]
    struct MemKv(Mutex<BTreeMap<String, String>>);
    impl Kv for MemKv {
        fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
            self.0.lock().unwrap().insert(key.to_string(), value.to_string());
            Ok(())
        }
        fn get(&self, key: &str) -> Result<Option<String>, KvError> {
            Ok(self.0.lock().unwrap().get(key).cloned())
        }
        fn delete(&self, key: &str) -> Result<(), KvError> {
            self.0.lock().unwrap().remove(key);
            Ok(())
        }
    }

    struct AlwaysAllow;
    impl PolicyClient for AlwaysAllow {
        fn evaluate(&self, _tool_name: &str, _arguments: &BTreeMap<String, serde_json::Value>, _context: &BTreeMap<String, serde_json::Value>) -> Result<PolicyDecision, PolicyError> {
            Ok(PolicyDecision::allow("ok", "read_only_tools", "read", false))
        }
        fn policy_version(&self) -> String {
            "v1".to_string()
        }
    }

    struct AlwaysDeny;
    impl PolicyClient for AlwaysDeny {
        fn evaluate(&self, _tool_name: &str, _arguments: &BTreeMap<String, serde_json::Value>, _context: &BTreeMap<String, serde_json::Value>) -> Result<PolicyDecision, PolicyError> {
            Ok(PolicyDecision::deny("not allowed", "deny_all"))
        }
        fn policy_version(&self) -> String {
            "v1".to_string()
        }
    }

    struct StubCredentials;
    impl CredentialProvider for StubCredentials {
        fn issue(&self, scope: &str, ttl_seconds: u32) -> Result<BrokeredCredential, CredentialError> {
            Ok(BrokeredCredential { token: "t".to_string(), scope: scope.to_string(), ttl_seconds })
        }
        fn revoke(&self, _token: &str) -> Result<(), CredentialError> {
            Ok(())
        }
    }

    struct EchoExecutor;
    impl ToolExecutor for EchoExecutor {
        fn execute(&self, _tool_name: &str, _arguments: &BTreeMap<String, serde_json::Value>, _credential: &BrokeredCredential) -> Result<serde_json::Value, ExecutorError> {
            Ok(serde_json::json!({"ok": true}))
        }
    }

    struct FailingExecutor;
    impl ToolExecutor for FailingExecutor {
        fn execute(&self, _tool_name: &str, _arguments: &BTreeMap<String, serde_json::Value>, _credential: &BrokeredCredential) -> Result<serde_json::Value, ExecutorError> {
            Err(ExecutorError::Failed("boom".to_string()))
        }
    }

    fn request(session_id: &str, tool_name: &str) -> ToolCallRequest {
        ToolCallRequest { session_id: session_id.to_string(), tool_name: tool_name.to_string(), arguments: BTreeMap::new(), context: BTreeMap::new(), approval_token: None }
    }

    #[test]
    fn allowed_call_executes_and_traces() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        let kv = MemKv::default();
        let policy = AlwaysAllow;
        let quarantine = QuarantineCoordinator::new(DEFAULT_THRESHOLD);
        let rate_limiter = RateLimiter::new(60, 100);
        let taint = TaintTracker::new(Default::default(), Default::default());
        let credentials = StubCredentials;
        let executor = EchoExecutor;
        let audit = NoopAuditSink;
        let orchestrator = Orchestrator {
            store: &store,
            kv: &kv,
            policy: &policy,
            quarantine: &quarantine,
            rate_limiter: &rate_limiter,
            taint: &taint,
            credentials: &credentials,
            executor: &executor,
            audit: &audit,
            approval_token: None,
        };
        let response = orchestrator.call_tool(&request("s1", "db_query")).expect("call succeeds");
        assert!(response.success);
        assert_eq!(store.trace_events_for_session("s1").expect("queries").len(), 1);
    }

    #[test]
    fn invalid_tool_name_denies_without_touching_policy() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        let kv = MemKv::default();
        let policy = AlwaysAllow;
        let quarantine = QuarantineCoordinator::new(DEFAULT_THRESHOLD);
        let rate_limiter = RateLimiter::new(60, 100);
        let taint = TaintTracker::new(Default::default(), Default::default());
        let credentials = StubCredentials;
        let executor = EchoExecutor;
        let audit = NoopAuditSink;
        let orchestrator = Orchestrator {
            store: &store,
            kv: &kv,
            policy: &policy,
            quarantine: &quarantine,
            rate_limiter: &rate_limiter,
            taint: &taint,
            credentials: &credentials,
            executor: &executor,
            audit: &audit,
            approval_token: None,
        };
        let response = orchestrator.call_tool(&request("s1", "../etc")).expect("call succeeds");
        assert!(!response.success);
        let events = store.trace_events_for_session("s1").expect("queries");
        assert_eq!(events[0].matched_rule.as_deref(), Some("invalid_tool_name"));
    }

    #[test]
    fn kill_switch_blocks_before_policy() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        let kv = MemKv::default();
        kv.set("prefix:session:s1", "operator paused").expect("sets");
        let policy = AlwaysAllow;
        let quarantine = QuarantineCoordinator::new(DEFAULT_THRESHOLD);
        let rate_limiter = RateLimiter::new(60, 100);
        let taint = TaintTracker::new(Default::default(), Default::default());
        let credentials = StubCredentials;
        let executor = EchoExecutor;
        let audit = NoopAuditSink;
        let orchestrator = Orchestrator {
            store: &store,
            kv: &kv,
            policy: &policy,
            quarantine: &quarantine,
            rate_limiter: &rate_limiter,
            taint: &taint,
            credentials: &credentials,
            executor: &executor,
            audit: &audit,
            approval_token: None,
        };
        let response = orchestrator.call_tool(&request("s1", "db_query")).expect("call succeeds");
        assert!(!response.success);
        assert!(response.error.unwrap_or_default().contains("operator paused"));
    }

    #[test]
    fn denied_policy_does_not_execute() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        let kv = MemKv::default();
        let policy = AlwaysDeny;
        let quarantine = QuarantineCoordinator::new(DEFAULT_THRESHOLD);
        let rate_limiter = RateLimiter::new(60, 100);
        let taint = TaintTracker::new(Default::default(), Default::default());
        let credentials = StubCredentials;
        let executor = EchoExecutor;
        let audit = NoopAuditSink;
        let orchestrator = Orchestrator {
            store: &store,
            kv: &kv,
            policy: &policy,
            quarantine: &quarantine,
            rate_limiter: &rate_limiter,
            taint: &taint,
            credentials: &credentials,
            executor: &executor,
            audit: &audit,
            approval_token: None,
        };
        let response = orchestrator.call_tool(&request("s1", "db_query")).expect("call succeeds");
        assert!(!response.success);
        let events = store.trace_events_for_session("s1").expect("queries");
        assert!(!events[0].executed);
    }

    #[test]
    fn executor_failure_is_traced_with_error() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        let kv = MemKv::default();
        let policy = AlwaysAllow;
        let quarantine = QuarantineCoordinator::new(DEFAULT_THRESHOLD);
        let rate_limiter = RateLimiter::new(60, 100);
        let taint = TaintTracker::new(Default::default(), Default::default());
        let credentials = StubCredentials;
        let executor = FailingExecutor;
        let audit = NoopAuditSink;
        let orchestrator = Orchestrator {
            store: &store,
            kv: &kv,
            policy: &policy,
            quarantine: &quarantine,
            rate_limiter: &rate_limiter,
            taint: &taint,
            credentials: &credentials,
            executor: &executor,
            audit: &audit,
            approval_token: None,
        };
        let response = orchestrator.call_tool(&request("s1", "db_query")).expect("call succeeds");
        assert!(!response.success);
        assert!(response.error.unwrap_or_default().contains("Tool execution failed"));
    }

    struct RequireApproval;
    impl PolicyClient for RequireApproval {
        fn evaluate(&self, _tool_name: &str, _arguments: &BTreeMap<String, serde_json::Value>, _context: &BTreeMap<String, serde_json::Value>) -> Result<PolicyDecision, PolicyError> {
            Ok(PolicyDecision::require_approval("needs approval", "write_tools"))
        }
        fn policy_version(&self) -> String {
            "v1".to_string()
        }
    }

    #[test]
    fn configured_shared_secret_satisfies_approval_requirement() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        let kv = MemKv::default();
        let policy = RequireApproval;
        let quarantine = QuarantineCoordinator::new(DEFAULT_THRESHOLD);
        let rate_limiter = RateLimiter::new(60, 100);
        let taint = TaintTracker::new(Default::default(), Default::default());
        let credentials = StubCredentials;
        let executor = EchoExecutor;
        let audit = NoopAuditSink;
        let orchestrator = Orchestrator {
            store: &store,
            kv: &kv,
            policy: &policy,
            quarantine: &quarantine,
            rate_limiter: &rate_limiter,
            taint: &taint,
            credentials: &credentials,
            executor: &executor,
            audit: &audit,
            approval_token: Some("approved"),
        };
        let mut call = request("s1", "db_write");
        call.approval_token = Some("approved".to_string());
        let response = orchestrator.call_tool(&call).expect("call succeeds");
        assert!(response.success);
    }

    #[test]
    fn wrong_shared_secret_still_requires_approval() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        let kv = MemKv::default();
        let policy = RequireApproval;
        let quarantine = QuarantineCoordinator::new(DEFAULT_THRESHOLD);
        let rate_limiter = RateLimiter::new(60, 100);
        let taint = TaintTracker::new(Default::default(), Default::default());
        let credentials = StubCredentials;
        let executor = EchoExecutor;
        let audit = NoopAuditSink;
        let orchestrator = Orchestrator {
            store: &store,
            kv: &kv,
            policy: &policy,
            quarantine: &quarantine,
            rate_limiter: &rate_limiter,
            taint: &taint,
            credentials: &credentials,
            executor: &executor,
            audit: &audit,
            approval_token: Some("approved"),
        };
        let mut call = request("s1", "db_write");
        call.approval_token = Some("wrong".to_string());
        let response = orchestrator.call_tool(&call).expect("call succeeds");
        assert!(!response.success);
        assert!(response.error.unwrap_or_default().contains("Approval required"));
    }

    #[test]
    fn taint_labels_observed_on_one_call_block_exfiltration_on_the_next() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        let kv = MemKv::default();
        let policy = AlwaysAllow;
        let quarantine = QuarantineCoordinator::new(DEFAULT_THRESHOLD);
        let rate_limiter = RateLimiter::new(60, 100);
        let taint = TaintTracker::new(BTreeSet::from(["pii".to_string()]), BTreeSet::from(["send_email".to_string()]));
        let credentials = StubCredentials;
        let executor = EchoExecutor;
        let audit = NoopAuditSink;
        let orchestrator = Orchestrator {
            store: &store,
            kv: &kv,
            policy: &policy,
            quarantine: &quarantine,
            rate_limiter: &rate_limiter,
            taint: &taint,
            credentials: &credentials,
            executor: &executor,
            audit: &audit,
            approval_token: None,
        };

        let mut tainting_call = request("s1", "db_query");
        tainting_call.context.insert("taint_labels".to_string(), serde_json::json!(["pii"]));
        let tainting_response = orchestrator.call_tool(&tainting_call).expect("call succeeds");
        assert!(tainting_response.success);

        let exfiltration_response = orchestrator.call_tool(&request("s1", "send_email")).expect("call succeeds");
        assert!(!exfiltration_response.success);
        assert!(exfiltration_response.error.unwrap_or_default().contains("Blocked labels present"));
    }

    struct CapturingPolicy {
        seen_context: Mutex<Option<BTreeMap<String, serde_json::Value>>>,
    }
    impl PolicyClient for CapturingPolicy {
        fn evaluate(&self, _tool_name: &str, _arguments: &BTreeMap<String, serde_json::Value>, context: &BTreeMap<String, serde_json::Value>) -> Result<PolicyDecision, PolicyError> {
            *self.seen_context.lock().unwrap() = Some(context.clone());
            Ok(PolicyDecision::allow("ok", "read_only_tools", "read", false))
        }
        fn policy_version(&self) -> String {
            "v1".to_string()
        }
    }

    #[test]
    fn policy_evaluation_receives_session_id_and_approval_token_in_context() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        let kv = MemKv::default();
        let policy = CapturingPolicy { seen_context: Mutex::new(None) };
        let quarantine = QuarantineCoordinator::new(DEFAULT_THRESHOLD);
        let rate_limiter = RateLimiter::new(60, 100);
        let taint = TaintTracker::new(Default::default(), Default::default());
        let credentials = StubCredentials;
        let executor = EchoExecutor;
        let audit = NoopAuditSink;
        let orchestrator = Orchestrator {
            store: &store,
            kv: &kv,
            policy: &policy,
            quarantine: &quarantine,
            rate_limiter: &rate_limiter,
            taint: &taint,
            credentials: &credentials,
            executor: &executor,
            audit: &audit,
            approval_token: None,
        };
        let mut call = request("s1", "db_query");
        call.approval_token = Some("wf:abc".to_string());
        orchestrator.call_tool(&call).expect("call succeeds");

        let captured = policy.seen_context.lock().unwrap().clone().expect("policy was called");
        assert_eq!(captured.get("session_id").and_then(serde_json::Value::as_str), Some("s1"));
        assert_eq!(captured.get("approval_token").and_then(serde_json::Value::as_str), Some("wf:abc"));
    }
}
