// agentgate-gateway/src/rate_limiter.rs
// ============================================================================
// Module: Rate Limiter
// Description: In-memory sliding-window rate limiter keyed by subject+tool.
// Purpose: Bound per-subject tool-call throughput within a rolling window.
// Dependencies: time
// ============================================================================

//! ## Overview
//! Single-process, in-memory: a `VecDeque<OffsetDateTime>` per `(subject,
//! tool)` bucket, all guarded by one mutex. A multi-replica deployment must
//! replace this with a KV-backed implementation preserving the same
//! contract.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;

use time::Duration;
use time::OffsetDateTime;

/// Current rate-limit status for a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateStatus {
    /// Calls remaining in the current window.
    pub remaining: u32,
    /// When the oldest call in the window will age out.
    pub reset_at: OffsetDateTime,
}

/// Sliding-window rate limiter over `(subject, tool)` buckets.
pub struct RateLimiter {
    window: Duration,
    limit: u32,
    buckets: Mutex<HashMap<(String, String), VecDeque<OffsetDateTime>>>,
}

impl RateLimiter {
    /// Builds a limiter with a `window_seconds`-wide window and `limit`
    /// calls per bucket.
    #[must_use]
    pub fn new(window_seconds: i64, limit: u32) -> Self {
        Self { window: Duration::seconds(window_seconds), limit, buckets: Mutex::new(HashMap::new()) }
    }

    fn trim(entries: &mut VecDeque<OffsetDateTime>, now: OffsetDateTime, window: Duration) {
        while entries.front().is_some_and(|oldest| *oldest <= now - window) {
            entries.pop_front();
        }
    }

    /// Checks admission for `(subject, tool)` at `now`, recording the call if
    /// admitted.
    #[must_use]
    pub fn allow(&self, subject: &str, tool: &str, now: OffsetDateTime) -> bool {
        let Ok(mut buckets) = self.buckets.lock() else { return false };
        let entries = buckets.entry((subject.to_string(), tool.to_string())).or_default();
        Self::trim(entries, now, self.window);
        if entries.len() >= self.limit as usize {
            return false;
        }
        entries.push_back(now);
        true
    }

    /// Returns the current status for `(subject, tool)` at `now`, without
    /// recording a call.
    #[must_use]
    pub fn status(&self, subject: &str, tool: &str, now: OffsetDateTime) -> RateStatus {
        let Ok(mut buckets) = self.buckets.lock() else {
            return RateStatus { remaining: 0, reset_at: now };
        };
        let entries = buckets.entry((subject.to_string(), tool.to_string())).or_default();
        Self::trim(entries, now, self.window);
        let remaining = self.limit.saturating_sub(u32::try_from(entries.len()).unwrap_or(u32::MAX));
        let reset_at = entries.front().map_or(now, |oldest| *oldest + self.window);
        RateStatus { remaining, reset_at }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;

    #[test]
    fn admits_calls_up_to_limit() {
        let limiter = RateLimiter::new(60, 2);
        let now = OffsetDateTime::now_utc();
        assert!(limiter.allow("s1", "db_query", now));
        assert!(limiter.allow("s1", "db_query", now));
        assert!(!limiter.allow("s1", "db_query", now));
    }

    #[test]
    fn window_expiry_frees_capacity() {
        let limiter = RateLimiter::new(60, 1);
        let now = OffsetDateTime::now_utc();
        assert!(limiter.allow("s1", "db_query", now));
        assert!(!limiter.allow("s1", "db_query", now));
        assert!(limiter.allow("s1", "db_query", now + Duration::seconds(61)));
    }

    #[test]
    fn buckets_are_independent_per_subject_and_tool() {
        let limiter = RateLimiter::new(60, 1);
        let now = OffsetDateTime::now_utc();
        assert!(limiter.allow("s1", "db_query", now));
        assert!(limiter.allow("s2", "db_query", now));
        assert!(limiter.allow("s1", "db_write", now));
    }

    #[test]
    fn status_reports_remaining_and_reset() {
        let limiter = RateLimiter::new(60, 2);
        let now = OffsetDateTime::now_utc();
        assert!(limiter.allow("s1", "db_query", now));
        let status = limiter.status("s1", "db_query", now);
        assert_eq!(status.remaining, 1);
        assert_eq!(status.reset_at, now + Duration::seconds(60));
    }
}
