// agentgate-gateway/src/kill_switch.rs
// ============================================================================
// Module: Kill Switch
// Description: Three-namespace, fail-closed kill switch over a KV backend.
// Purpose: Let operators pause the system globally, per-tool, or per-session.
// Dependencies: agentgate-core
// ============================================================================

//! ## Overview
//! Precedence is strict: `global > tool > session`. Every KV call retries
//! once on transient failure (disconnect-and-retry is modeled as "call
//! again"; the `Kv` trait is externally synchronized, so the client only
//! retries, never reconnects itself). A persistent failure is fail-closed:
//! the call is treated as blocked.

use agentgate_core::Kv;
use agentgate_core::KvError;

const GLOBAL_KEY: &str = "prefix:global";

fn tool_key(tool_name: &str) -> String {
    format!("prefix:tool:{tool_name}")
}

fn session_key(session_id: &str) -> String {
    format!("prefix:session:{session_id}")
}

/// Outcome of a kill-switch check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockState {
    /// No kill switch is active for this call.
    Allowed,
    /// A kill switch is active; carries the stored reason.
    Blocked(String),
    /// The KV backend is unavailable; fail-closed.
    Unavailable,
}

/// Kill switch backed by a [`Kv`] implementation.
pub struct KillSwitch<'a> {
    kv: &'a dyn Kv,
}

impl<'a> KillSwitch<'a> {
    /// Wraps `kv` as a kill switch.
    #[must_use]
    pub fn new(kv: &'a dyn Kv) -> Self {
        Self { kv }
    }

    fn get_with_retry(&self, key: &str) -> Result<Option<String>, KvError> {
        match self.kv.get(key) {
            Ok(value) => Ok(value),
            Err(_) => self.kv.get(key),
        }
    }

    fn set_with_retry(&self, key: &str, value: &str) -> Result<(), KvError> {
        match self.kv.set(key, value) {
            Ok(()) => Ok(()),
            Err(_) => self.kv.set(key, value),
        }
    }

    fn delete_with_retry(&self, key: &str) -> Result<(), KvError> {
        match self.kv.delete(key) {
            Ok(()) => Ok(()),
            Err(_) => self.kv.delete(key),
        }
    }

    /// Checks whether `tool_name` in `session_id` is currently blocked.
    #[must_use]
    pub fn is_blocked(&self, tool_name: &str, session_id: &str) -> BlockState {
        for key in [GLOBAL_KEY.to_string(), tool_key(tool_name), session_key(session_id)] {
            match self.get_with_retry(&key) {
                Ok(Some(reason)) => return BlockState::Blocked(reason),
                Ok(None) => {}
                Err(_) => return BlockState::Unavailable,
            }
        }
        BlockState::Allowed
    }

    /// Blocks `session_id` with `reason`.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] on persistent backend failure.
    pub fn kill_session(&self, session_id: &str, reason: &str) -> Result<(), KvError> {
        self.set_with_retry(&session_key(session_id), reason)
    }

    /// Blocks `tool_name` with `reason`.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] on persistent backend failure.
    pub fn kill_tool(&self, tool_name: &str, reason: &str) -> Result<(), KvError> {
        self.set_with_retry(&tool_key(tool_name), reason)
    }

    /// Pauses the entire system with `reason`.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] on persistent backend failure.
    pub fn global_pause(&self, reason: &str) -> Result<(), KvError> {
        self.set_with_retry(GLOBAL_KEY, reason)
    }

    /// Resumes the entire system.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] on persistent backend failure.
    pub fn resume(&self) -> Result<(), KvError> {
        self.delete_with_retry(GLOBAL_KEY)
    }

    /// Clears a session's kill-switch key. Used by incident release.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] on persistent backend failure.
    pub fn release_session(&self, session_id: &str) -> Result<(), KvError> {
        self.delete_with_retry(&session_key(session_id))
    }
}

/// Single-process, in-memory [`Kv`] backend. A multi-replica deployment
/// needs a shared backend (e.g. Redis) behind the same trait; this
/// implementation is correct for one gateway instance.
#[derive(Debug, Default)]
pub struct InMemoryKv {
    entries: std::sync::Mutex<std::collections::HashMap<String, String>>,
}

impl Kv for InMemoryKv {
    fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        let Ok(mut entries) = self.entries.lock() else { return Err(KvError::Unavailable("poisoned lock".to_string())) };
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let Ok(entries) = self.entries.lock() else { return Err(KvError::Unavailable("poisoned lock".to_string())) };
        Ok(entries.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<(), KvError> {
        let Ok(mut entries) = self.entries.lock() else { return Err(KvError::Unavailable("poisoned lock".to_string())) };
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, reason = "Test-only assertions are permitted.")]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct MemKv(Mutex<BTreeMap<String, String>>);

    impl Kv for MemKv {
        fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
            self.0.lock().unwrap().insert(key.to_string(), value.to_string());
            Ok(())
        }
        fn get(&self, key: &str) -> Result<Option<String>, KvError> {
            Ok(self.0.lock().unwrap().get(key).cloned())
        }
        fn delete(&self, key: &str) -> Result<(), KvError> {
            self.0.lock().unwrap().remove(key);
            Ok(())
        }
    }

    #[test]
    fn global_pause_blocks_everything() {
        let kv = MemKv::default();
        let switch = KillSwitch::new(&kv);
        switch.global_pause("maintenance").expect("pauses");
        assert_eq!(switch.is_blocked("db_query", "s1"), BlockState::Blocked("maintenance".to_string()));
    }

    #[test]
    fn session_kill_does_not_block_other_sessions() {
        let kv = MemKv::default();
        let switch = KillSwitch::new(&kv);
        switch.kill_session("s1", "quarantined").expect("kills");
        assert_eq!(switch.is_blocked("db_query", "s1"), BlockState::Blocked("quarantined".to_string()));
        assert_eq!(switch.is_blocked("db_query", "s2"), BlockState::Allowed);
    }

    #[test]
    fn global_precedes_tool_and_session() {
        let kv = MemKv::default();
        let switch = KillSwitch::new(&kv);
        switch.kill_tool("db_query", "tool paused").expect("kills tool");
        switch.global_pause("global").expect("pauses");
        assert_eq!(switch.is_blocked("db_query", "s1"), BlockState::Blocked("global".to_string()));
    }

    #[test]
    fn release_session_clears_only_session_key() {
        let kv = MemKv::default();
        let switch = KillSwitch::new(&kv);
        switch.kill_session("s1", "quarantined").expect("kills");
        switch.release_session("s1").expect("releases");
        assert_eq!(switch.is_blocked("db_query", "s1"), BlockState::Allowed);
    }
}
