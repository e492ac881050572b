// agentgate-config/src/config.rs
// ============================================================================
// Module: Gateway Configuration
// Description: Environment-variable driven configuration loading and validation.
// Purpose: Provide strict, fail-closed config parsing for the AgentGate server.
// Dependencies: std::env
// ============================================================================

//! ## Overview
//! Configuration is loaded entirely from environment variables. Missing or
//! malformed values either fall back to a documented default or, for
//! security-relevant settings, fail config loading outright.

use std::collections::BTreeSet;
use std::env;
use std::env::VarError;

use thiserror::Error;

/// Errors raised while loading or validating [`GatewayConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held a value that could not be parsed.
    #[error("environment variable {name} has an invalid value: {detail}")]
    InvalidValue {
        /// Name of the offending variable.
        name: &'static str,
        /// Parse or validation failure detail.
        detail: String,
    },
    /// A mandatory secret was missing while strict mode was requested.
    #[error("missing mandatory secret: {0}")]
    MissingSecret(&'static str),
}

/// Data-loss-prevention handling mode for logged/exported PII.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PiiMode {
    /// No PII handling; values pass through unchanged.
    #[default]
    Off,
    /// Replace PII values with a fixed redaction marker.
    Redact,
    /// Replace PII values with a salted, non-reversible token.
    Tokenize,
}

impl PiiMode {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw {
            "off" => Ok(Self::Off),
            "redact" => Ok(Self::Redact),
            "tokenize" => Ok(Self::Tokenize),
            other => Err(ConfigError::InvalidValue {
                name: "AGENTGATE_PII_MODE",
                detail: format!("expected one of off|redact|tokenize, got {other:?}"),
            }),
        }
    }
}

/// Top-level AgentGate server configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the remote policy engine (OPA-style), if configured.
    pub opa_url: Option<String>,
    /// Connection URL for the shared KV backend, if configured.
    pub redis_url: Option<String>,
    /// Filesystem path to the signed policy package.
    pub policy_path: Option<String>,
    /// Pre-shared HMAC secret used to verify policy package signatures.
    pub policy_package_secret: Option<String>,
    /// Whether unsigned policy bundles are rejected (treated as empty).
    pub require_signed_policy: bool,
    /// Shared-secret approval token accepted alongside workflow tokens.
    pub approval_token: Option<String>,
    /// Sliding window width, in seconds, for the rate limiter.
    pub rate_window_seconds: u64,
    /// `X-API-Key` value required on admin endpoints.
    pub admin_api_key: Option<String>,
    /// Filesystem path to the `SQLite` trace database.
    pub trace_db: String,
    /// Minimum audit record severity to emit.
    pub log_level: String,
    /// PII handling mode applied to audit output.
    pub pii_mode: PiiMode,
    /// Salt used when `pii_mode=tokenize`.
    pub pii_token_salt: Option<String>,
    /// Endpoint transparency-log checkpoints are POSTed to, if configured.
    pub transparency_anchor_url: Option<String>,
    /// Whether OpenTelemetry export is enabled.
    pub otel_enabled: bool,
    /// Taint labels that trip the DLP guard when present on a session.
    pub dlp_blocked_labels: BTreeSet<String>,
    /// Tool names the DLP guard treats as exfiltration-capable.
    pub dlp_exfiltration_tools: BTreeSet<String>,
}

/// Default sliding-window width, in seconds, for the rate limiter.
pub const DEFAULT_RATE_WINDOW_SECONDS: u64 = 60;
/// Default path for the `SQLite` trace database.
pub const DEFAULT_TRACE_DB: &str = "agentgate.sqlite3";
/// Default minimum audit log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

impl GatewayConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable is present but malformed, or
    /// when `AGENTGATE_REQUIRE_SIGNED_POLICY=true` and
    /// `AGENTGATE_POLICY_PACKAGE_SECRET` is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let require_signed_policy = parse_bool_env("AGENTGATE_REQUIRE_SIGNED_POLICY")?.unwrap_or(false);
        let policy_package_secret = optional_var("AGENTGATE_POLICY_PACKAGE_SECRET")?;
        if require_signed_policy && policy_package_secret.is_none() {
            return Err(ConfigError::MissingSecret("AGENTGATE_POLICY_PACKAGE_SECRET"));
        }

        let rate_window_seconds = match optional_var("AGENTGATE_RATE_WINDOW_SECONDS")? {
            Some(raw) => raw.parse::<u64>().map_err(|err| ConfigError::InvalidValue {
                name: "AGENTGATE_RATE_WINDOW_SECONDS",
                detail: err.to_string(),
            })?,
            None => DEFAULT_RATE_WINDOW_SECONDS,
        };
        if rate_window_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                name: "AGENTGATE_RATE_WINDOW_SECONDS",
                detail: "must be greater than zero".to_string(),
            });
        }

        let pii_mode = match optional_var("AGENTGATE_PII_MODE")? {
            Some(raw) => PiiMode::parse(&raw)?,
            None => PiiMode::default(),
        };
        let pii_token_salt = optional_var("AGENTGATE_PII_TOKEN_SALT")?;
        if pii_mode == PiiMode::Tokenize && pii_token_salt.is_none() {
            return Err(ConfigError::MissingSecret("AGENTGATE_PII_TOKEN_SALT"));
        }

        Ok(Self {
            opa_url: optional_var("AGENTGATE_OPA_URL")?,
            redis_url: optional_var("AGENTGATE_REDIS_URL")?,
            policy_path: optional_var("AGENTGATE_POLICY_PATH")?,
            policy_package_secret,
            require_signed_policy,
            approval_token: optional_var("AGENTGATE_APPROVAL_TOKEN")?,
            rate_window_seconds,
            admin_api_key: optional_var("AGENTGATE_ADMIN_API_KEY")?,
            trace_db: optional_var("AGENTGATE_TRACE_DB")?.unwrap_or_else(|| DEFAULT_TRACE_DB.to_string()),
            log_level: optional_var("AGENTGATE_LOG_LEVEL")?.unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            pii_mode,
            pii_token_salt,
            transparency_anchor_url: optional_var("AGENTGATE_TRANSPARENCY_ANCHOR_URL")?,
            otel_enabled: parse_bool_env("AGENTGATE_OTEL_ENABLED")?.unwrap_or(false),
            dlp_blocked_labels: parse_set_env("AGENTGATE_DLP_BLOCKED_LABELS")?,
            dlp_exfiltration_tools: parse_set_env("AGENTGATE_DLP_EXFILTRATION_TOOLS")?,
        })
    }
}

/// Parses a comma-separated environment variable into a set of trimmed,
/// non-empty entries.
fn parse_set_env(name: &'static str) -> Result<BTreeSet<String>, ConfigError> {
    Ok(optional_var(name)?.map(|raw| raw.split(',').map(str::trim).filter(|entry| !entry.is_empty()).map(str::to_string).collect()).unwrap_or_default())
}

/// Reads an optional environment variable, treating non-UTF-8 values as errors.
fn optional_var(name: &'static str) -> Result<Option<String>, ConfigError> {
    match env::var(name) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue {
            name,
            detail: "value is not valid UTF-8".to_string(),
        }),
    }
}

/// Parses a boolean environment variable (`true`/`false`, case-insensitive).
fn parse_bool_env(name: &'static str) -> Result<Option<bool>, ConfigError> {
    match optional_var(name)? {
        None => Ok(None),
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(Some(true)),
            "false" | "0" => Ok(Some(false)),
            other => Err(ConfigError::InvalidValue {
                name,
                detail: format!("expected true/false, got {other:?}"),
            }),
        },
    }
}

#[cfg(test)]
#[allow(
    unsafe_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions are permitted; env mutation requires unsafe and is serialized by ENV_LOCK."
)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_all() {
        for name in [
            "AGENTGATE_OPA_URL",
            "AGENTGATE_REDIS_URL",
            "AGENTGATE_POLICY_PATH",
            "AGENTGATE_POLICY_PACKAGE_SECRET",
            "AGENTGATE_REQUIRE_SIGNED_POLICY",
            "AGENTGATE_APPROVAL_TOKEN",
            "AGENTGATE_RATE_WINDOW_SECONDS",
            "AGENTGATE_ADMIN_API_KEY",
            "AGENTGATE_TRACE_DB",
            "AGENTGATE_LOG_LEVEL",
            "AGENTGATE_PII_MODE",
            "AGENTGATE_PII_TOKEN_SALT",
            "AGENTGATE_TRANSPARENCY_ANCHOR_URL",
            "AGENTGATE_OTEL_ENABLED",
            "AGENTGATE_DLP_BLOCKED_LABELS",
            "AGENTGATE_DLP_EXFILTRATION_TOOLS",
        ] {
            // SAFETY: single-threaded under `ENV_LOCK`; no other test reads env concurrently.
            unsafe { env::remove_var(name) };
        }
    }

    #[test]
    fn defaults_apply_when_unset() {
        let _guard = ENV_LOCK.lock().expect("lock poisoned");
        clear_all();
        let config = GatewayConfig::from_env().expect("loads with defaults");
        assert_eq!(config.rate_window_seconds, DEFAULT_RATE_WINDOW_SECONDS);
        assert_eq!(config.trace_db, DEFAULT_TRACE_DB);
        assert_eq!(config.pii_mode, PiiMode::Off);
    }

    #[test]
    fn require_signed_policy_without_secret_fails() {
        let _guard = ENV_LOCK.lock().expect("lock poisoned");
        clear_all();
        // SAFETY: serialized by `ENV_LOCK`.
        unsafe { env::set_var("AGENTGATE_REQUIRE_SIGNED_POLICY", "true") };
        let result = GatewayConfig::from_env();
        // SAFETY: serialized by `ENV_LOCK`.
        unsafe { env::remove_var("AGENTGATE_REQUIRE_SIGNED_POLICY") };
        assert!(matches!(result, Err(ConfigError::MissingSecret(_))));
    }

    #[test]
    fn tokenize_without_salt_fails() {
        let _guard = ENV_LOCK.lock().expect("lock poisoned");
        clear_all();
        // SAFETY: serialized by `ENV_LOCK`.
        unsafe { env::set_var("AGENTGATE_PII_MODE", "tokenize") };
        let result = GatewayConfig::from_env();
        // SAFETY: serialized by `ENV_LOCK`.
        unsafe { env::remove_var("AGENTGATE_PII_MODE") };
        assert!(matches!(result, Err(ConfigError::MissingSecret(_))));
    }

    #[test]
    fn dlp_label_list_is_parsed_and_trimmed() {
        let _guard = ENV_LOCK.lock().expect("lock poisoned");
        clear_all();
        // SAFETY: serialized by `ENV_LOCK`.
        unsafe { env::set_var("AGENTGATE_DLP_BLOCKED_LABELS", "pii, secret ,, pii") };
        let config = GatewayConfig::from_env().expect("loads");
        // SAFETY: serialized by `ENV_LOCK`.
        unsafe { env::remove_var("AGENTGATE_DLP_BLOCKED_LABELS") };
        assert_eq!(config.dlp_blocked_labels, BTreeSet::from(["pii".to_string(), "secret".to_string()]));
    }

    #[test]
    fn invalid_pii_mode_is_rejected() {
        let _guard = ENV_LOCK.lock().expect("lock poisoned");
        clear_all();
        // SAFETY: serialized by `ENV_LOCK`.
        unsafe { env::set_var("AGENTGATE_PII_MODE", "bogus") };
        let result = GatewayConfig::from_env();
        // SAFETY: serialized by `ENV_LOCK`.
        unsafe { env::remove_var("AGENTGATE_PII_MODE") };
        assert!(matches!(result, Err(ConfigError::InvalidValue { name: "AGENTGATE_PII_MODE", .. })));
    }
}
