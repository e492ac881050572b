// agentgate-config/src/lib.rs
// ============================================================================
// Module: AgentGate Config Library
// Description: Public API surface for environment-driven server configuration.
// Purpose: Expose GatewayConfig and its loading/validation errors.
// Dependencies: crate::config
// ============================================================================

//! ## Overview
//! Environment-variable driven configuration for the AgentGate server, loaded
//! once at startup into a typed [`GatewayConfig`].

pub mod config;

pub use config::ConfigError;
pub use config::DEFAULT_LOG_LEVEL;
pub use config::DEFAULT_RATE_WINDOW_SECONDS;
pub use config::DEFAULT_TRACE_DB;
pub use config::GatewayConfig;
pub use config::PiiMode;
