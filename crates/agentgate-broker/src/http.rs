// agentgate-broker/src/http.rs
// ============================================================================
// Module: HTTP Credential Provider
// Description: Remote credential broker client over a blocking HTTP call.
// Purpose: Issue and revoke credentials against a real secrets-broker service.
// Dependencies: agentgate-core, reqwest
// ============================================================================

//! ## Overview
//! [`HttpCredentialProvider`] POSTs an issue/revoke request to a configured
//! broker endpoint with a fixed 5-second timeout, matching the outbound-call
//! timeout budget used for the policy engine and credential broker elsewhere
//! in the pipeline. Any transport, status, or decoding error is surfaced as
//! [`CredentialError::Backend`]; callers must treat that as fail-closed.

use std::time::Duration;

use agentgate_core::BrokeredCredential;
use agentgate_core::CredentialError;
use agentgate_core::CredentialProvider;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde::Serialize;

/// Timeout applied to every outbound broker call.
const BROKER_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct IssueRequest<'a> {
    scope: &'a str,
    ttl_seconds: u32,
}

#[derive(Debug, Deserialize)]
struct IssueResponse {
    token: String,
}

#[derive(Debug, Serialize)]
struct RevokeRequest<'a> {
    token: &'a str,
}

/// Credential provider backed by a remote HTTP secrets-broker service.
pub struct HttpCredentialProvider {
    base_url: String,
    client: Client,
}

impl HttpCredentialProvider {
    /// Builds a provider targeting `base_url` (no trailing slash expected).
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Backend`] if the HTTP client cannot be
    /// constructed.
    pub fn new(base_url: impl Into<String>) -> Result<Self, CredentialError> {
        let client = Client::builder()
            .timeout(BROKER_TIMEOUT)
            .build()
            .map_err(|err| CredentialError::Backend(err.to_string()))?;
        Ok(Self { base_url: base_url.into(), client })
    }
}

impl CredentialProvider for HttpCredentialProvider {
    fn issue(&self, scope: &str, ttl_seconds: u32) -> Result<BrokeredCredential, CredentialError> {
        let url = format!("{}/credentials/issue", self.base_url);
        let response = self
            .client
            .post(url)
            .json(&IssueRequest { scope, ttl_seconds })
            .send()
            .map_err(|err| CredentialError::Backend(err.to_string()))?;
        if !response.status().is_success() {
            return Err(CredentialError::Backend(format!("broker returned status {}", response.status())));
        }
        let body: IssueResponse = response.json().map_err(|err| CredentialError::Backend(err.to_string()))?;
        Ok(BrokeredCredential { token: body.token, scope: scope.to_string(), ttl_seconds })
    }

    fn revoke(&self, token: &str) -> Result<(), CredentialError> {
        let url = format!("{}/credentials/revoke", self.base_url);
        let response = self
            .client
            .post(url)
            .json(&RevokeRequest { token })
            .send()
            .map_err(|err| CredentialError::Backend(err.to_string()))?;
        if !response.status().is_success() {
            return Err(CredentialError::Backend(format!("broker returned status {}", response.status())));
        }
        Ok(())
    }
}
