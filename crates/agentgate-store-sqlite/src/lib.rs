// agentgate-store-sqlite/src/lib.rs
// ============================================================================
// Module: AgentGate SQLite Store Library
// Description: Public API surface for the SQLite-backed trace store.
// Purpose: Provide a durable agentgate_core::TraceStore implementation.
// Dependencies: agentgate-core, rusqlite
// ============================================================================

//! ## Overview
//! [`SqliteTraceStore`] is the production [`agentgate_core::TraceStore`]
//! backend: a single SQLite file (or in-memory database for tests) holding
//! trace events and the gateway's typed registries, with numbered migrations
//! applied transactionally at startup.

pub mod store;

pub use store::SqliteTraceStore;
