// agentgate-gateway/src/audit.rs
// ============================================================================
// Module: Audit Sinks
// Description: Noop, Stderr, and File implementations of AuditSink.
// Purpose: Emit structured audit records without a global logging facade.
// Dependencies: agentgate-core, serde_json
// ============================================================================

//! ## Overview
//! Every component that needs to emit audit output takes an
//! `Arc<dyn AuditSink>` through its constructor. These three implementations
//! cover local development (`Stderr`), tests (`Noop`), and durable
//! append-only output (`File`).

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;

use agentgate_core::AuditError;
use agentgate_core::AuditRecord;
use agentgate_core::AuditSink;

/// Discards every record. Used in tests and where audit output is not
/// otherwise configured.
#[derive(Debug, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _record: &AuditRecord<'_>) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Writes each record as one JSON line to stderr.
#[derive(Debug, Default)]
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn record(&self, record: &AuditRecord<'_>) -> Result<(), AuditError> {
        let line = serde_json::json!({ "category": record.category, "fields": record.fields });
        // Audit output is data, not a debug trace; clippy::print_stderr is
        // disallowed workspace-wide, so write through `std::io::Stderr` directly.
        writeln!(std::io::stderr(), "{line}").map_err(|err| AuditError::WriteFailed(err.to_string()))
    }
}

/// Appends each record as one JSON line to a file, guarded by a mutex so
/// concurrent writers never interleave a line.
pub struct FileAuditSink {
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens (creating/appending to) the audit log at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::WriteFailed`] if the file cannot be opened.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, AuditError> {
        let file = OpenOptions::new().create(true).append(true).open(path).map_err(|err| AuditError::WriteFailed(err.to_string()))?;
        Ok(Self { file: Mutex::new(file) })
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, record: &AuditRecord<'_>) -> Result<(), AuditError> {
        let line = serde_json::json!({ "category": record.category, "fields": record.fields });
        let mut file = self.file.lock().map_err(|_| AuditError::WriteFailed("audit file lock poisoned".to_string()))?;
        writeln!(file, "{line}").map_err(|err| AuditError::WriteFailed(err.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, reason = "Test-only assertions are permitted.")]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn file_sink_appends_json_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("audit.log");
        let sink = FileAuditSink::open(&path).expect("opens");
        let mut fields = BTreeMap::new();
        fields.insert("tool_name".to_string(), serde_json::json!("db_query"));
        sink.record(&AuditRecord { category: "tool_call", fields }).expect("writes");
        let contents = std::fs::read_to_string(&path).expect("reads");
        assert!(contents.contains("db_query"));
    }
}
