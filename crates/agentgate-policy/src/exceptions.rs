// agentgate-policy/src/exceptions.rs
// ============================================================================
// Module: Policy Exception Registry
// Description: Time-bound policy override matching with lazy auto-expiry.
// Purpose: Let the orchestrator short-circuit to ALLOW for an active
//          exception before consulting the policy evaluator.
// Dependencies: agentgate-core
// ============================================================================

//! ## Overview
//! Exceptions are persisted through [`agentgate_core::TraceStore`]; this
//! module only implements the matching and auto-expiry semantics the
//! orchestrator needs. Auto-expiry is swept lazily on every list or match
//! call, mutating `revoked_by` to [`agentgate_core::PolicyException::AUTO_EXPIRED_BY`]
//! rather than via a background task, following the original quarantine
//! sweep's approach.

use agentgate_core::PolicyException;
use agentgate_core::StoreError;
use agentgate_core::TraceStore;
use time::OffsetDateTime;

/// Sweeps `tool_name`'s exceptions for expiry, then returns the
/// most-recently-created active exception matching `session_id`/`tenant_id`,
/// if any.
///
/// A request matches at most one exception: the most recent (by
/// `created_at`) still-active one scoped to the given session or tenant.
///
/// # Errors
///
/// Returns [`StoreError`] on any store failure.
pub fn match_exception(store: &dyn TraceStore, tool_name: &str, session_id: Option<&str>, tenant_id: Option<&str>) -> Result<Option<PolicyException>, StoreError> {
    let now = OffsetDateTime::now_utc();
    let exceptions = store.exceptions_for_tool(tool_name)?;
    for exception in &exceptions {
        if !exception.is_active(now) && exception.revoked_by.is_none() {
            let mut expired = exception.clone();
            expired.revoked_by = Some(PolicyException::AUTO_EXPIRED_BY.to_string());
            expired.revoked_at = Some(now);
            store.update_exception(&expired)?;
        }
    }

    let mut candidates: Vec<PolicyException> = exceptions
        .into_iter()
        .filter(|exception| exception.is_active(now))
        .filter(|exception| {
            let session_match = session_id.is_some() && exception.session_id.as_deref() == session_id;
            let tenant_match = tenant_id.is_some() && exception.tenant_id.as_deref() == tenant_id;
            session_match || tenant_match
        })
        .collect();
    candidates.sort_by_key(|exception| std::cmp::Reverse(exception.created_at));
    Ok(candidates.into_iter().next())
}

/// Sweeps every unrevoked exception in the store for expiry, auto-revoking
/// any whose `expires_at` has passed. Intended for the admin "list all
/// exceptions" surface, so the listing never shows a stale-but-unmarked
/// expiry.
///
/// # Errors
///
/// Returns [`StoreError`] on any store failure.
pub fn sweep_all_expired(store: &dyn TraceStore) -> Result<usize, StoreError> {
    let now = OffsetDateTime::now_utc();
    let mut swept = 0usize;
    for exception in store.unrevoked_exceptions()? {
        if exception.expires_at <= now {
            let mut expired = exception;
            expired.revoked_by = Some(PolicyException::AUTO_EXPIRED_BY.to_string());
            expired.revoked_at = Some(now);
            store.update_exception(&expired)?;
            swept += 1;
        }
    }
    Ok(swept)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, reason = "Test-only assertions are permitted.")]
mod tests {
    use agentgate_store_sqlite::SqliteTraceStore;
    use time::Duration;

    use super::*;

    fn exception(id: &str, tool: &str, session_id: Option<&str>, expires_in: Duration) -> PolicyException {
        let now = OffsetDateTime::now_utc();
        PolicyException {
            exception_id: id.to_string(),
            tool_name: tool.to_string(),
            reason: "incident follow-up".to_string(),
            created_by: "admin".to_string(),
            created_at: now,
            expires_at: now + expires_in,
            session_id: session_id.map(str::to_string),
            tenant_id: None,
            revoked_by: None,
            revoked_at: None,
        }
    }

    #[test]
    fn active_exception_matches_session() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        store.create_exception(&exception("e1", "db_write", Some("s1"), Duration::minutes(5))).expect("creates");
        let matched = match_exception(&store, "db_write", Some("s1"), None).expect("matches");
        assert_eq!(matched.expect("found").exception_id, "e1");
    }

    #[test]
    fn expired_exception_is_auto_revoked_and_not_matched() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        store.create_exception(&exception("e1", "db_write", Some("s1"), Duration::seconds(-5))).expect("creates");
        let matched = match_exception(&store, "db_write", Some("s1"), None).expect("matches");
        assert!(matched.is_none());
        let persisted = store.exceptions_for_tool("db_write").expect("queries");
        assert!(persisted.is_empty(), "auto-expired exception should no longer be unrevoked");
    }

    #[test]
    fn most_recent_active_exception_wins() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        let mut older = exception("e1", "db_write", Some("s1"), Duration::minutes(5));
        older.created_at -= Duration::minutes(1);
        store.create_exception(&older).expect("creates");
        store.create_exception(&exception("e2", "db_write", Some("s1"), Duration::minutes(5))).expect("creates");
        let matched = match_exception(&store, "db_write", Some("s1"), None).expect("matches");
        assert_eq!(matched.expect("found").exception_id, "e2");
    }
}
