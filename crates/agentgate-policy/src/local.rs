// agentgate-policy/src/local.rs
// ============================================================================
// Module: Local Policy Evaluator
// Description: Deny-by-default, declarative-list policy evaluator.
// Purpose: Evaluate tool calls against read-only/write tool lists and serve
//          tool listing for replay/shadow analysis.
// Dependencies: agentgate-core
// ============================================================================

//! ## Overview
//! [`LocalEvaluator`] is the reference decision surface: tools are
//! partitioned into `read_only_tools` and `write_tools`; anything outside
//! either set is unknown. It never performs I/O and is never used as an
//! automatic fallback for a live remote-evaluator failure — only for
//! `/tools/list` and replay/shadow analysis.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use agentgate_core::PolicyAction;
use agentgate_core::PolicyDecision;
use serde_json::Value;
use subtle::ConstantTimeEq;

/// Declarative tool lists the local evaluator decides against.
#[derive(Debug, Clone, Default)]
pub struct LocalEvaluator {
    read_only_tools: BTreeSet<String>,
    write_tools: BTreeSet<String>,
}

impl LocalEvaluator {
    /// Builds an evaluator from explicit read-only and write tool sets.
    #[must_use]
    pub fn new(read_only_tools: BTreeSet<String>, write_tools: BTreeSet<String>) -> Self {
        Self { read_only_tools, write_tools }
    }

    /// Returns every tool name this evaluator knows about.
    #[must_use]
    pub fn all_known_tools(&self) -> BTreeSet<String> {
        self.read_only_tools.iter().chain(self.write_tools.iter()).cloned().collect()
    }

    /// Evaluates one tool call against the local tool lists.
    ///
    /// `has_approval_token` must already reflect constant-time validation
    /// against the configured secret or an active workflow token.
    #[must_use]
    pub fn evaluate(&self, tool_name: &str, has_approval_token: bool) -> PolicyDecision {
        if self.read_only_tools.contains(tool_name) {
            return PolicyDecision::allow("read_only_tools", "read_only_tools", "read", false);
        }
        if self.write_tools.contains(tool_name) {
            return if has_approval_token {
                PolicyDecision::allow("write_with_approval", "write_with_approval", "write", true)
            } else {
                PolicyDecision::require_approval("write_requires_approval", "write_requires_approval")
            };
        }
        if self.all_known_tools().contains(tool_name) {
            PolicyDecision::deny("default_deny", "default_deny")
        } else {
            PolicyDecision::deny("unknown_tool", "unknown_tool")
        }
    }

    /// Returns `{tool_name: action}` for every known tool, evaluated with
    /// `has_approval_token=false`, the reference semantics for `/tools/list`.
    #[must_use]
    pub fn allowed_tools(&self) -> BTreeMap<String, PolicyAction> {
        self.all_known_tools().into_iter().map(|tool| {
            let action = self.evaluate(&tool, false).action;
            (tool, action)
        }).collect()
    }
}

/// Validates an approval token in constant time against the configured
/// shared secret or an active workflow token (`wf:{workflow_id}`).
///
/// Empty or missing tokens are always invalid.
#[must_use]
pub fn is_valid_approval_token(presented: Option<&str>, expected_shared_secret: &str, expected_workflow_token: Option<&str>) -> bool {
    let Some(presented) = presented.filter(|token| !token.is_empty()) else {
        return false;
    };
    let matches_secret = !expected_shared_secret.is_empty()
        && presented.len() == expected_shared_secret.len()
        && bool::from(presented.as_bytes().ct_eq(expected_shared_secret.as_bytes()));
    let matches_workflow = expected_workflow_token.is_some_and(|workflow_token| {
        presented.len() == workflow_token.len() && bool::from(presented.as_bytes().ct_eq(workflow_token.as_bytes()))
    });
    matches_secret || matches_workflow
}

/// Arguments accepted by [`LocalEvaluator::evaluate`] when used purely for
/// listing, kept separate so shadow/replay callers can pass recorded
/// arguments without the evaluator needing to interpret them.
#[derive(Debug, Clone, Default)]
pub struct EvaluationInput {
    /// Tool arguments (unused by the local evaluator; carried for parity
    /// with the remote evaluator's request shape).
    pub arguments: BTreeMap<String, Value>,
    /// Request context (unused by the local evaluator).
    pub context: BTreeMap<String, Value>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;

    fn evaluator() -> LocalEvaluator {
        LocalEvaluator::new(
            BTreeSet::from(["db_query".to_string()]),
            BTreeSet::from(["db_write".to_string()]),
        )
    }

    #[test]
    fn read_only_tool_is_allowed() {
        let decision = evaluator().evaluate("db_query", false);
        assert_eq!(decision.action, PolicyAction::Allow);
        assert_eq!(decision.matched_rule.as_deref(), Some("read_only_tools"));
        assert!(!decision.is_write_action);
    }

    #[test]
    fn write_tool_without_token_requires_approval() {
        let decision = evaluator().evaluate("db_write", false);
        assert_eq!(decision.action, PolicyAction::RequireApproval);
    }

    #[test]
    fn write_tool_with_token_is_allowed() {
        let decision = evaluator().evaluate("db_write", true);
        assert_eq!(decision.action, PolicyAction::Allow);
        assert_eq!(decision.allowed_scope.as_deref(), Some("write"));
    }

    #[test]
    fn unknown_tool_is_denied_as_unknown() {
        let decision = evaluator().evaluate("rm_rf", false);
        assert_eq!(decision.action, PolicyAction::Deny);
        assert_eq!(decision.matched_rule.as_deref(), Some("unknown_tool"));
    }

    #[test]
    fn empty_token_is_never_valid() {
        assert!(!is_valid_approval_token(Some(""), "secret", None));
        assert!(!is_valid_approval_token(None, "secret", None));
    }

    #[test]
    fn matching_shared_secret_is_valid() {
        assert!(is_valid_approval_token(Some("secret"), "secret", None));
    }

    #[test]
    fn matching_workflow_token_is_valid() {
        assert!(is_valid_approval_token(Some("wf:abc"), "secret", Some("wf:abc")));
    }
}
