// agentgate-policy/src/signed.rs
// ============================================================================
// Module: Signed Policy Packages
// Description: Verification of HMAC-signed policy bundles.
// Purpose: Load a policy bundle only when its hash and signature both verify;
//          otherwise fall back to the empty (deny-by-default) bundle.
// Dependencies: agentgate-core, hmac, sha2, subtle
// ============================================================================

//! ## Overview
//! A signed package is `{tenant_id, version, signer, bundle_hash, bundle,
//! signature}`. `bundle_hash` is SHA-256 over canonical JSON of `bundle`;
//! `signature` is HMAC-SHA256 over canonical JSON of
//! `{tenant_id, version, bundle_hash, signer}` under a pre-shared secret.
//! Verification is constant-time; any mismatch yields the empty bundle, and
//! in "require signed" mode an unsigned bundle is treated the same way.

use agentgate_core::HashError;
use agentgate_core::canonical_json_bytes;
use hmac::Hmac;
use hmac::Mac;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Errors raised while verifying a signed policy package.
#[derive(Debug, Error)]
pub enum SignedPolicyError {
    /// The bundle could not be canonicalized for hashing.
    #[error("policy bundle canonicalization failed: {0}")]
    Canonicalization(#[from] HashError),
    /// The pre-shared secret key is invalid for HMAC (never for a
    /// correctly-sized key).
    #[error("policy signing key rejected: {0}")]
    InvalidKey(String),
}

/// A tool list bundle: the declarative policy data a signed package carries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyBundle {
    /// Tools evaluated as read-only.
    pub read_only_tools: Vec<String>,
    /// Tools evaluated as write/mutating, requiring approval.
    pub write_tools: Vec<String>,
}

/// A signed policy package as distributed to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedPolicyPackage {
    /// Tenant the package applies to.
    pub tenant_id: String,
    /// Package version label.
    pub version: String,
    /// Identity that signed the package.
    pub signer: String,
    /// SHA-256 hex digest of the canonical JSON of `bundle`.
    pub bundle_hash: String,
    /// The tool-list bundle.
    pub bundle: PolicyBundle,
    /// HMAC-SHA256 hex digest over canonical JSON of the header fields.
    pub signature: String,
}

#[derive(Serialize)]
struct SignedHeader<'a> {
    tenant_id: &'a str,
    version: &'a str,
    bundle_hash: &'a str,
    signer: &'a str,
}

/// Verifies `package` against `secret` and returns its bundle, or the empty
/// bundle if verification fails.
///
/// When `require_signed` is true, a package whose signature does not verify
/// is always treated as empty, even if it would otherwise be usable; this
/// function already treats every verification failure this way, so the flag
/// only changes caller-side messaging, not behavior here.
///
/// # Errors
///
/// Returns [`SignedPolicyError`] only for canonicalization or key-setup
/// failures, never for a verification mismatch (that yields `Ok` with the
/// empty bundle).
pub fn load_verified_bundle(package: &SignedPolicyPackage, secret: &[u8]) -> Result<PolicyBundle, SignedPolicyError> {
    let bundle_bytes = canonical_json_bytes(&package.bundle)?;
    let computed_hash = hex::encode(Sha256::digest(&bundle_bytes));
    let hash_matches = computed_hash.len() == package.bundle_hash.len()
        && bool::from(computed_hash.as_bytes().ct_eq(package.bundle_hash.as_bytes()));
    if !hash_matches {
        return Ok(PolicyBundle::default());
    }

    let header = SignedHeader {
        tenant_id: &package.tenant_id,
        version: &package.version,
        bundle_hash: &package.bundle_hash,
        signer: &package.signer,
    };
    let header_bytes = canonical_json_bytes(&header)?;
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|err| SignedPolicyError::InvalidKey(err.to_string()))?;
    mac.update(&header_bytes);
    let expected_signature = hex::encode(mac.finalize().into_bytes());
    let signature_matches = expected_signature.len() == package.signature.len()
        && bool::from(expected_signature.as_bytes().ct_eq(package.signature.as_bytes()));

    if signature_matches { Ok(package.bundle.clone()) } else { Ok(PolicyBundle::default()) }
}

/// Signs `bundle` for `tenant_id`/`version`/`signer` with `secret`, producing
/// a package that [`load_verified_bundle`] will accept. Used by tests and by
/// the admin CLI's package-signing helper.
///
/// # Errors
///
/// Returns [`SignedPolicyError`] on canonicalization or key-setup failure.
pub fn sign_bundle(bundle: PolicyBundle, tenant_id: impl Into<String>, version: impl Into<String>, signer: impl Into<String>, secret: &[u8]) -> Result<SignedPolicyPackage, SignedPolicyError> {
    let tenant_id = tenant_id.into();
    let version = version.into();
    let signer = signer.into();
    let bundle_bytes = canonical_json_bytes(&bundle)?;
    let bundle_hash = hex::encode(Sha256::digest(&bundle_bytes));
    let header = SignedHeader { tenant_id: &tenant_id, version: &version, bundle_hash: &bundle_hash, signer: &signer };
    let header_bytes = canonical_json_bytes(&header)?;
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|err| SignedPolicyError::InvalidKey(err.to_string()))?;
    mac.update(&header_bytes);
    let signature = hex::encode(mac.finalize().into_bytes());
    Ok(SignedPolicyPackage { tenant_id, version, signer, bundle_hash, bundle, signature })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;

    fn sample_bundle() -> PolicyBundle {
        PolicyBundle { read_only_tools: vec!["db_query".to_string()], write_tools: vec!["db_write".to_string()] }
    }

    #[test]
    fn correctly_signed_package_verifies() {
        let package = sign_bundle(sample_bundle(), "tenant-a", "v1", "ci", b"secret").expect("signs");
        let bundle = load_verified_bundle(&package, b"secret").expect("verifies");
        assert_eq!(bundle.read_only_tools, vec!["db_query".to_string()]);
    }

    #[test]
    fn altered_signature_yields_empty_bundle() {
        let mut package = sign_bundle(sample_bundle(), "tenant-a", "v1", "ci", b"secret").expect("signs");
        package.signature.replace_range(0..1, if package.signature.starts_with('0') { "1" } else { "0" });
        let bundle = load_verified_bundle(&package, b"secret").expect("verifies");
        assert!(bundle.read_only_tools.is_empty() && bundle.write_tools.is_empty());
    }

    #[test]
    fn altered_bundle_hash_yields_empty_bundle() {
        let mut package = sign_bundle(sample_bundle(), "tenant-a", "v1", "ci", b"secret").expect("signs");
        package.bundle_hash.replace_range(0..1, if package.bundle_hash.starts_with('0') { "1" } else { "0" });
        let bundle = load_verified_bundle(&package, b"secret").expect("verifies");
        assert!(bundle.read_only_tools.is_empty());
    }

    #[test]
    fn wrong_secret_yields_empty_bundle() {
        let package = sign_bundle(sample_bundle(), "tenant-a", "v1", "ci", b"secret").expect("signs");
        let bundle = load_verified_bundle(&package, b"wrong-secret").expect("verifies");
        assert!(bundle.read_only_tools.is_empty());
    }
}
