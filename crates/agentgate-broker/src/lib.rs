// agentgate-broker/src/lib.rs
// ============================================================================
// Module: AgentGate Broker Library
// Description: Credential provider implementations for the gateway pipeline.
// Purpose: Issue and revoke narrowly-scoped, time-limited tool credentials.
// Dependencies: agentgate-core, reqwest
// ============================================================================

//! ## Overview
//! The broker issues the short-lived, narrowly scoped credentials the
//! orchestrator hands to a [`agentgate_core::ToolExecutor`] after an `ALLOW`
//! decision. Two implementations ship here: [`stub::StubCredentialProvider`]
//! for local/dev use and tests, and [`http::HttpCredentialProvider`] for a
//! remote secrets-broker service. OAuth/STS-style providers are intentionally
//! not implemented — see the workspace root `DESIGN.md` for why.

pub mod http;
pub mod stub;

pub use http::HttpCredentialProvider;
pub use stub::StubCredentialProvider;

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions are permitted."
)]
mod tests {
    use agentgate_core::CredentialProvider;

    use crate::stub::StubCredentialProvider;

    #[test]
    fn stub_issues_and_revokes() {
        let provider = StubCredentialProvider::new();
        let credential = provider.issue("read", 300).expect("issue succeeds");
        assert_eq!(credential.scope, "read");
        assert_eq!(credential.ttl_seconds, 300);
        provider.revoke(&credential.token).expect("revoke succeeds");
    }
}
