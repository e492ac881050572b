// agentgate-policy/src/lib.rs
// ============================================================================
// Module: AgentGate Policy Library
// Description: Public API surface for policy evaluation and governance.
// Purpose: Expose local/remote evaluators, signed packages, exceptions, and
//          the revision lifecycle registry.
// Dependencies: agentgate-core
// ============================================================================

//! ## Overview
//! This crate is the policy subsystem named in the enforcement core: a
//! local deny-by-default evaluator, a fail-closed remote evaluator client,
//! HMAC-signed policy package verification, the time-bound exception
//! registry, and the draft/in_review/published/rolled_back revision FSM.

pub mod exceptions;
pub mod lifecycle;
pub mod local;
pub mod remote;
pub mod signed;

pub use exceptions::match_exception;
pub use exceptions::sweep_all_expired;

pub use lifecycle::LifecycleError;
pub use lifecycle::LifecycleRegistry;
pub use lifecycle::PolicyRevision;
pub use lifecycle::RevisionStatus;

pub use local::EvaluationInput;
pub use local::LocalEvaluator;
pub use local::is_valid_approval_token;

pub use remote::RemotePolicyClient;
pub use remote::fail_closed_deny;

pub use signed::PolicyBundle;
pub use signed::SignedPolicyError;
pub use signed::SignedPolicyPackage;
pub use signed::load_verified_bundle;
pub use signed::sign_bundle;
