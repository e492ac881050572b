// agentgate-gateway/src/lib.rs
// ============================================================================
// Module: AgentGate Gateway Library
// Description: Public API surface for the enforcement core's gateway crate.
// Purpose: Export the orchestrator and every enforcement component it binds.
// Dependencies: agentgate-core, agentgate-broker, agentgate-policy
// ============================================================================

//! ## Overview
//! This crate hosts the enforcement core's gateway: kill switch, rate
//! limiter, taint/DLP guard, quarantine coordinator, approval workflow
//! engine, policy replay/invariant-proving, canary/rollout controller,
//! transparency log, request validation, audit sinks, and the orchestrator
//! that binds them into `call_tool`.

pub mod approval;
pub mod audit;
pub mod kill_switch;
pub mod orchestrator;
pub mod quarantine;
pub mod rate_limiter;
pub mod replay;
pub mod rollout;
pub mod taint;
pub mod transparency;
pub mod validation;

pub use approval::approve;
pub use approval::create_workflow;
pub use approval::delegate;
pub use approval::normalize_approvers;
pub use approval::verify_workflow_token;
pub use approval::ApprovalError;

pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;

pub use kill_switch::BlockState;
pub use kill_switch::InMemoryKv;
pub use kill_switch::KillSwitch;

pub use orchestrator::Orchestrator;

pub use quarantine::QuarantineCoordinator;
pub use quarantine::DEFAULT_THRESHOLD;

pub use rate_limiter::RateLimiter;
pub use rate_limiter::RateStatus;

pub use replay::prove_invariants;
pub use replay::run_replay;
pub use replay::summarize;
pub use replay::Counterexample;

pub use rollout::advance_rollout;
pub use rollout::evaluate_canary;
pub use rollout::rollback_rollout;
pub use rollout::start_rollout;
pub use rollout::CanaryBudget;
pub use rollout::RolloutError;

pub use taint::TaintTracker;

pub use transparency::anchor_checkpoint;
pub use transparency::build_session_inclusion_proof;
pub use transparency::build_session_root;
pub use transparency::TransparencyError;

pub use validation::is_valid_session_id;
pub use validation::is_valid_tool_name;
