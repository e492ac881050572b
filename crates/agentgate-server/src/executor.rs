// agentgate-server/src/executor.rs
// ============================================================================
// Module: Echo Tool Executor
// Description: Local, no-network tool executor for dev and tests.
// Purpose: Exercise the full orchestrator pipeline without a real tool
//          backend wired in.
// Dependencies: agentgate-core
// ============================================================================

//! ## Overview
//! Mirrors `agentgate-broker`'s stub credential provider: every call
//! succeeds and echoes its arguments back as the result payload. A real
//! deployment replaces this with an executor that dispatches to the actual
//! tool implementations over whatever transport they speak.

use std::collections::BTreeMap;

use agentgate_core::BrokeredCredential;
use agentgate_core::ExecutorError;
use agentgate_core::ToolExecutor;
use serde_json::Value;

/// [`ToolExecutor`] that echoes its arguments back under the issued
/// credential's scope, performing no real work.
#[derive(Debug, Default)]
pub struct EchoToolExecutor;

impl EchoToolExecutor {
    /// Creates a new echo executor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ToolExecutor for EchoToolExecutor {
    fn execute(&self, tool_name: &str, arguments: &BTreeMap<String, Value>, credential: &BrokeredCredential) -> Result<Value, ExecutorError> {
        Ok(serde_json::json!({
            "tool_name": tool_name,
            "arguments": arguments,
            "credential_scope": credential.scope,
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;

    #[test]
    fn echoes_arguments_back() {
        let executor = EchoToolExecutor::new();
        let credential = BrokeredCredential { token: "t".to_string(), scope: "read".to_string(), ttl_seconds: 60 };
        let mut arguments = BTreeMap::new();
        arguments.insert("path".to_string(), Value::String("/tmp/x".to_string()));
        let result = executor.execute("read_file", &arguments, &credential).expect("executes");
        assert_eq!(result["tool_name"], "read_file");
        assert_eq!(result["credential_scope"], "read");
    }
}
