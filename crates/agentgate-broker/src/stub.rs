// agentgate-broker/src/stub.rs
// ============================================================================
// Module: Stub Credential Provider
// Description: Local, no-network credential provider for dev and tests.
// Purpose: Issue opaque UUID-keyed tokens without contacting a real broker.
// Dependencies: agentgate-core, uuid
// ============================================================================

//! ## Overview
//! Mints an opaque token per issue call and tracks revoked tokens in memory.
//! Suitable for local development and for tests that do not exercise a real
//! secrets backend.

use std::collections::HashSet;
use std::sync::Mutex;

use agentgate_core::BrokeredCredential;
use agentgate_core::CredentialError;
use agentgate_core::CredentialProvider;
use uuid::Uuid;

/// In-memory [`CredentialProvider`] that mints UUID tokens with no backing
/// secret material.
#[derive(Debug, Default)]
pub struct StubCredentialProvider {
    revoked: Mutex<HashSet<String>>,
}

impl StubCredentialProvider {
    /// Creates an empty stub provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when `token` has been revoked.
    #[must_use]
    pub fn is_revoked(&self, token: &str) -> bool {
        self.revoked.lock().is_ok_and(|set| set.contains(token))
    }
}

impl CredentialProvider for StubCredentialProvider {
    fn issue(&self, scope: &str, ttl_seconds: u32) -> Result<BrokeredCredential, CredentialError> {
        Ok(BrokeredCredential {
            token: format!("stub:{}", Uuid::new_v4()),
            scope: scope.to_string(),
            ttl_seconds,
        })
    }

    fn revoke(&self, token: &str) -> Result<(), CredentialError> {
        let mut revoked = self
            .revoked
            .lock()
            .map_err(|_| CredentialError::Backend("stub provider lock poisoned".to_string()))?;
        revoked.insert(token.to_string());
        Ok(())
    }
}
