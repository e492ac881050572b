// agentgate-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Trace Store
// Description: Durable TraceStore backed by SQLite with numbered migrations.
// Purpose: Persist trace events and the gateway's typed registries, enforcing
//          write-once evidence archives at the database layer.
// Dependencies: agentgate-core, rusqlite, serde_json, time
// ============================================================================

//! ## Overview
//! Schema changes are expressed as an ordered list of numbered migrations
//! recorded in a `schema_migrations(version, applied_at)` ledger. All
//! migrations run inside one transaction at startup; any failure aborts the
//! transaction and leaves the ledger untouched, so a half-applied schema
//! never persists. Evidence archives are protected from `UPDATE`/`DELETE` by
//! database triggers, not application logic.

use std::path::Path;
use std::sync::Mutex;

use agentgate_core::ApprovalWorkflow;
use agentgate_core::EvidenceArchive;
use agentgate_core::EvidenceFormat;
use agentgate_core::IncidentEvent;
use agentgate_core::IncidentRecord;
use agentgate_core::IncidentStatus;
use agentgate_core::PolicyAction;
use agentgate_core::PolicyException;
use agentgate_core::ReplayDelta;
use agentgate_core::ReplayRun;
use agentgate_core::ReplayRunStatus;
use agentgate_core::RolloutRecord;
use agentgate_core::RolloutStatus;
use agentgate_core::StoreError;
use agentgate_core::TraceEvent;
use agentgate_core::TraceStore;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Default busy timeout applied to every connection.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Ordered schema migrations; index 0 is version 1.
const MIGRATIONS: &[&str] = &[
    // version 1: trace events
    "CREATE TABLE trace_events (
        event_id TEXT PRIMARY KEY,
        timestamp TEXT NOT NULL,
        session_id TEXT NOT NULL,
        user_id TEXT,
        agent_id TEXT,
        tool_name TEXT NOT NULL,
        arguments_hash TEXT NOT NULL,
        policy_version TEXT NOT NULL,
        policy_decision TEXT NOT NULL,
        policy_reason TEXT NOT NULL,
        matched_rule TEXT,
        executed INTEGER NOT NULL,
        duration_ms INTEGER,
        error TEXT,
        is_write_action INTEGER NOT NULL,
        approval_token_present INTEGER NOT NULL
    );
    CREATE INDEX idx_trace_events_session ON trace_events (session_id, timestamp ASC);",
    // version 2: incidents
    "CREATE TABLE incidents (
        incident_id TEXT PRIMARY KEY,
        session_id TEXT NOT NULL,
        status TEXT NOT NULL,
        risk_score INTEGER NOT NULL,
        reason TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        released_by TEXT,
        released_at TEXT
    );
    CREATE UNIQUE INDEX idx_incidents_active_session ON incidents (session_id)
        WHERE status IN ('quarantined', 'revoked', 'failed');
    CREATE TABLE incident_events (
        incident_id TEXT NOT NULL,
        event_type TEXT NOT NULL,
        detail TEXT NOT NULL,
        timestamp TEXT NOT NULL
    );",
    // version 3: approval workflows
    "CREATE TABLE workflows (
        workflow_id TEXT PRIMARY KEY,
        session_id TEXT NOT NULL,
        tool_name TEXT NOT NULL,
        required_steps INTEGER NOT NULL,
        required_approvers_json TEXT NOT NULL,
        requested_by TEXT,
        created_at TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        updated_at TEXT,
        approvals_json TEXT NOT NULL,
        delegations_json TEXT NOT NULL
    );",
    // version 4: policy exceptions
    "CREATE TABLE exceptions (
        exception_id TEXT PRIMARY KEY,
        tool_name TEXT NOT NULL,
        reason TEXT NOT NULL,
        created_by TEXT NOT NULL,
        created_at TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        session_id TEXT,
        tenant_id TEXT,
        revoked_by TEXT,
        revoked_at TEXT
    );
    CREATE INDEX idx_exceptions_tool ON exceptions (tool_name);",
    // version 5: replay runs and deltas
    "CREATE TABLE replay_runs (
        run_id TEXT PRIMARY KEY,
        baseline_policy_version TEXT NOT NULL,
        candidate_policy_version TEXT NOT NULL,
        session_id TEXT,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        completed_at TEXT
    );
    CREATE TABLE replay_deltas (
        run_id TEXT NOT NULL,
        event_id TEXT NOT NULL,
        tool_name TEXT NOT NULL,
        baseline_action TEXT NOT NULL,
        candidate_action TEXT NOT NULL,
        severity TEXT NOT NULL,
        baseline_rule TEXT,
        candidate_rule TEXT,
        baseline_reason TEXT NOT NULL,
        candidate_reason TEXT NOT NULL,
        root_cause TEXT NOT NULL,
        explanation TEXT NOT NULL
    );
    CREATE INDEX idx_replay_deltas_run ON replay_deltas (run_id);",
    // version 6: rollouts
    "CREATE TABLE rollouts (
        rollout_id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        baseline_version TEXT NOT NULL,
        candidate_version TEXT NOT NULL,
        status TEXT NOT NULL,
        verdict TEXT NOT NULL,
        reason TEXT NOT NULL,
        critical_drift INTEGER NOT NULL,
        high_drift INTEGER NOT NULL,
        rolled_back INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE UNIQUE INDEX idx_rollouts_triple
        ON rollouts (tenant_id, baseline_version, candidate_version);",
    // version 7: write-once evidence archives
    "CREATE TABLE evidence_archives (
        archive_id TEXT PRIMARY KEY,
        session_id TEXT NOT NULL,
        format TEXT NOT NULL,
        payload BLOB NOT NULL,
        integrity_hash TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (session_id, format, integrity_hash)
    );
    CREATE TRIGGER trg_evidence_archives_no_update
        BEFORE UPDATE ON evidence_archives
        BEGIN
            SELECT RAISE(ABORT, 'sqlite_error: immutable');
        END;
    CREATE TRIGGER trg_evidence_archives_no_delete
        BEFORE DELETE ON evidence_archives
        BEGIN
            SELECT RAISE(ABORT, 'sqlite_error: immutable');
        END;",
    // version 8: per-session taint labels
    "CREATE TABLE session_taint_labels (
        session_id TEXT NOT NULL,
        label TEXT NOT NULL,
        PRIMARY KEY (session_id, label)
    );",
];

/// Opens (creating if absent) a `SQLite`-backed [`TraceStore`] and applies any
/// pending migrations.
pub struct SqliteTraceStore {
    connection: Mutex<Connection>,
}

impl SqliteTraceStore {
    /// Opens the database at `path`, creating it and applying migrations if
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the connection cannot be opened or
    /// a migration fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let mut connection = Connection::open(path).map_err(|err| StoreError::Backend(err.to_string()))?;
        apply_pragmas(&connection)?;
        run_migrations(&mut connection)?;
        Ok(Self { connection: Mutex::new(connection) })
    }

    /// Opens an in-memory database. Intended for tests.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the connection or migrations fail.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let mut connection = Connection::open_in_memory().map_err(|err| StoreError::Backend(err.to_string()))?;
        apply_pragmas(&connection)?;
        run_migrations(&mut connection)?;
        Ok(Self { connection: Mutex::new(connection) })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.connection.lock().map_err(|_| StoreError::Backend("trace store lock poisoned".to_string()))
    }
}

fn apply_pragmas(connection: &Connection) -> Result<(), StoreError> {
    connection
        .execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL; PRAGMA synchronous = FULL;")
        .map_err(|err| StoreError::Backend(err.to_string()))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
        .map_err(|err| StoreError::Backend(err.to_string()))?;
    Ok(())
}

fn run_migrations(connection: &mut Connection) -> Result<(), StoreError> {
    let tx = connection.transaction().map_err(|err| StoreError::Backend(err.to_string()))?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (version INTEGER PRIMARY KEY, applied_at TEXT NOT NULL);",
    )
    .map_err(|err| StoreError::Backend(err.to_string()))?;
    let current: i64 = tx
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", params![], |row| row.get(0))
        .map_err(|err| StoreError::Backend(err.to_string()))?;
    let applied_at = now_rfc3339()?;
    for (index, migration) in MIGRATIONS.iter().enumerate() {
        let version = (index as i64) + 1;
        if version <= current {
            continue;
        }
        tx.execute_batch(migration).map_err(|err| StoreError::Backend(format!("migration {version} failed: {err}")))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![version, applied_at],
        )
        .map_err(|err| StoreError::Backend(err.to_string()))?;
    }
    tx.commit().map_err(|err| StoreError::Backend(err.to_string()))
}

fn now_rfc3339() -> Result<String, StoreError> {
    OffsetDateTime::now_utc().format(&Rfc3339).map_err(|err| StoreError::Backend(err.to_string()))
}

/// Reads column `idx`, mapping a decode failure to [`StoreError::Backend`]
/// instead of the crate-local `rusqlite::Error`.
fn get_col<T: rusqlite::types::FromSql>(row: &rusqlite::Row<'_>, idx: usize) -> Result<T, StoreError> {
    row.get(idx).map_err(|err| StoreError::Backend(err.to_string()))
}

fn parse_rfc3339(value: &str) -> Result<OffsetDateTime, StoreError> {
    OffsetDateTime::parse(value, &Rfc3339).map_err(|err| StoreError::Backend(err.to_string()))
}

fn action_to_str(action: PolicyAction) -> &'static str {
    match action {
        PolicyAction::Allow => "ALLOW",
        PolicyAction::Deny => "DENY",
        PolicyAction::RequireApproval => "REQUIRE_APPROVAL",
    }
}

fn action_from_str(value: &str) -> Result<PolicyAction, StoreError> {
    match value {
        "ALLOW" => Ok(PolicyAction::Allow),
        "DENY" => Ok(PolicyAction::Deny),
        "REQUIRE_APPROVAL" => Ok(PolicyAction::RequireApproval),
        other => Err(StoreError::Backend(format!("unknown policy action in storage: {other}"))),
    }
}

fn incident_status_to_str(status: IncidentStatus) -> &'static str {
    match status {
        IncidentStatus::Quarantined => "quarantined",
        IncidentStatus::Revoked => "revoked",
        IncidentStatus::Failed => "failed",
        IncidentStatus::Released => "released",
    }
}

fn incident_status_from_str(value: &str) -> Result<IncidentStatus, StoreError> {
    match value {
        "quarantined" => Ok(IncidentStatus::Quarantined),
        "revoked" => Ok(IncidentStatus::Revoked),
        "failed" => Ok(IncidentStatus::Failed),
        "released" => Ok(IncidentStatus::Released),
        other => Err(StoreError::Backend(format!("unknown incident status in storage: {other}"))),
    }
}

impl TraceStore for SqliteTraceStore {
    fn append_trace_event(&self, event: &TraceEvent) -> Result<(), StoreError> {
        let connection = self.lock()?;
        connection
            .execute(
                "INSERT INTO trace_events (
                    event_id, timestamp, session_id, user_id, agent_id, tool_name, arguments_hash,
                    policy_version, policy_decision, policy_reason, matched_rule, executed,
                    duration_ms, error, is_write_action, approval_token_present
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)",
                params![
                    event.event_id,
                    event.timestamp.format(&Rfc3339).map_err(|err| StoreError::Backend(err.to_string()))?,
                    event.session_id,
                    event.user_id,
                    event.agent_id,
                    event.tool_name,
                    event.arguments_hash,
                    event.policy_version,
                    action_to_str(event.policy_decision),
                    event.policy_reason,
                    event.matched_rule,
                    event.executed,
                    event.duration_ms.map(|value| value as i64),
                    event.error,
                    event.is_write_action,
                    event.approval_token_present,
                ],
            )
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        Ok(())
    }

    fn trace_events_for_session(&self, session_id: &str) -> Result<Vec<TraceEvent>, StoreError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare(
                "SELECT event_id, timestamp, session_id, user_id, agent_id, tool_name, arguments_hash,
                        policy_version, policy_decision, policy_reason, matched_rule, executed,
                        duration_ms, error, is_write_action, approval_token_present
                 FROM trace_events WHERE session_id = ?1 ORDER BY timestamp ASC",
            )
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        collect_trace_events(&mut statement, params![session_id])
    }

    fn all_trace_events(&self) -> Result<Vec<TraceEvent>, StoreError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare(
                "SELECT event_id, timestamp, session_id, user_id, agent_id, tool_name, arguments_hash,
                        policy_version, policy_decision, policy_reason, matched_rule, executed,
                        duration_ms, error, is_write_action, approval_token_present
                 FROM trace_events ORDER BY timestamp ASC",
            )
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        collect_trace_events(&mut statement, params![])
    }

    fn create_or_get_incident(&self, incident: &IncidentRecord) -> Result<IncidentRecord, StoreError> {
        let connection = self.lock()?;
        let insert = connection.execute(
            "INSERT INTO incidents (incident_id, session_id, status, risk_score, reason, created_at, updated_at, released_by, released_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            params![
                incident.incident_id,
                incident.session_id,
                incident_status_to_str(incident.status),
                incident.risk_score,
                incident.reason,
                incident.created_at.format(&Rfc3339).map_err(|err| StoreError::Backend(err.to_string()))?,
                incident.updated_at.format(&Rfc3339).map_err(|err| StoreError::Backend(err.to_string()))?,
                incident.released_by,
                None::<String>,
            ],
        );
        match insert {
            Ok(_) => Ok(incident.clone()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                drop(connection);
                self.active_incidents()?
                    .into_iter()
                    .find(|existing| existing.session_id == incident.session_id)
                    .ok_or_else(|| StoreError::Conflict("incident insert conflicted but no active incident found".to_string()))
            }
            Err(err) => Err(StoreError::Backend(err.to_string())),
        }
    }

    fn get_incident(&self, incident_id: &str) -> Result<IncidentRecord, StoreError> {
        let connection = self.lock()?;
        connection
            .query_row(
                "SELECT incident_id, session_id, status, risk_score, reason, created_at, updated_at, released_by, released_at
                 FROM incidents WHERE incident_id = ?1",
                params![incident_id],
                row_to_incident,
            )
            .optional()
            .map_err(|err| StoreError::Backend(err.to_string()))?
            .ok_or_else(|| StoreError::NotFound(incident_id.to_string()))
    }

    fn update_incident(&self, incident: &IncidentRecord) -> Result<(), StoreError> {
        let connection = self.lock()?;
        let updated = connection
            .execute(
                "UPDATE incidents SET status=?2, risk_score=?3, reason=?4, updated_at=?5, released_by=?6, released_at=?7
                 WHERE incident_id=?1",
                params![
                    incident.incident_id,
                    incident_status_to_str(incident.status),
                    incident.risk_score,
                    incident.reason,
                    incident.updated_at.format(&Rfc3339).map_err(|err| StoreError::Backend(err.to_string()))?,
                    incident.released_by,
                    incident
                        .released_at
                        .map(|ts| ts.format(&Rfc3339))
                        .transpose()
                        .map_err(|err| StoreError::Backend(err.to_string()))?,
                ],
            )
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        if updated == 0 {
            return Err(StoreError::NotFound(incident.incident_id.clone()));
        }
        Ok(())
    }

    fn active_incidents(&self) -> Result<Vec<IncidentRecord>, StoreError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare(
                "SELECT incident_id, session_id, status, risk_score, reason, created_at, updated_at, released_by, released_at
                 FROM incidents WHERE status IN ('quarantined', 'revoked', 'failed')",
            )
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        let rows = statement
            .query_map(params![], row_to_incident)
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|err| StoreError::Backend(err.to_string()))
    }

    fn append_incident_event(&self, event: &IncidentEvent) -> Result<(), StoreError> {
        let connection = self.lock()?;
        connection
            .execute(
                "INSERT INTO incident_events (incident_id, event_type, detail, timestamp) VALUES (?1,?2,?3,?4)",
                params![
                    event.incident_id,
                    event.event_type,
                    event.detail,
                    event.timestamp.format(&Rfc3339).map_err(|err| StoreError::Backend(err.to_string()))?,
                ],
            )
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        Ok(())
    }

    fn create_workflow(&self, workflow: &ApprovalWorkflow) -> Result<(), StoreError> {
        let connection = self.lock()?;
        connection
            .execute(
                "INSERT INTO workflows (
                    workflow_id, session_id, tool_name, required_steps, required_approvers_json,
                    requested_by, created_at, expires_at, updated_at, approvals_json, delegations_json
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
                params![
                    workflow.workflow_id,
                    workflow.session_id,
                    workflow.tool_name,
                    workflow.required_steps,
                    serde_json::to_string(&workflow.required_approvers).map_err(|err| StoreError::Backend(err.to_string()))?,
                    workflow.requested_by,
                    workflow.created_at.format(&Rfc3339).map_err(|err| StoreError::Backend(err.to_string()))?,
                    workflow.expires_at.format(&Rfc3339).map_err(|err| StoreError::Backend(err.to_string()))?,
                    workflow
                        .updated_at
                        .map(|ts| ts.format(&Rfc3339))
                        .transpose()
                        .map_err(|err| StoreError::Backend(err.to_string()))?,
                    serde_json::to_string(&workflow.approvals).map_err(|err| StoreError::Backend(err.to_string()))?,
                    serde_json::to_string(&workflow.delegations).map_err(|err| StoreError::Backend(err.to_string()))?,
                ],
            )
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        Ok(())
    }

    fn get_workflow(&self, workflow_id: &str) -> Result<ApprovalWorkflow, StoreError> {
        let connection = self.lock()?;
        connection
            .query_row(
                "SELECT workflow_id, session_id, tool_name, required_steps, required_approvers_json,
                        requested_by, created_at, expires_at, updated_at, approvals_json, delegations_json
                 FROM workflows WHERE workflow_id = ?1",
                params![workflow_id],
                row_to_workflow,
            )
            .optional()
            .map_err(|err| StoreError::Backend(err.to_string()))?
            .ok_or_else(|| StoreError::NotFound(workflow_id.to_string()))?
    }

    fn update_workflow(&self, workflow: &ApprovalWorkflow) -> Result<(), StoreError> {
        let connection = self.lock()?;
        let updated = connection
            .execute(
                "UPDATE workflows SET approvals_json=?2, delegations_json=?3, updated_at=?4 WHERE workflow_id=?1",
                params![
                    workflow.workflow_id,
                    serde_json::to_string(&workflow.approvals).map_err(|err| StoreError::Backend(err.to_string()))?,
                    serde_json::to_string(&workflow.delegations).map_err(|err| StoreError::Backend(err.to_string()))?,
                    workflow
                        .updated_at
                        .map(|ts| ts.format(&Rfc3339))
                        .transpose()
                        .map_err(|err| StoreError::Backend(err.to_string()))?,
                ],
            )
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        if updated == 0 {
            return Err(StoreError::NotFound(workflow.workflow_id.clone()));
        }
        Ok(())
    }

    fn create_exception(&self, exception: &PolicyException) -> Result<(), StoreError> {
        let connection = self.lock()?;
        connection
            .execute(
                "INSERT INTO exceptions (
                    exception_id, tool_name, reason, created_by, created_at, expires_at,
                    session_id, tenant_id, revoked_by, revoked_at
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
                params![
                    exception.exception_id,
                    exception.tool_name,
                    exception.reason,
                    exception.created_by,
                    exception.created_at.format(&Rfc3339).map_err(|err| StoreError::Backend(err.to_string()))?,
                    exception.expires_at.format(&Rfc3339).map_err(|err| StoreError::Backend(err.to_string()))?,
                    exception.session_id,
                    exception.tenant_id,
                    exception.revoked_by,
                    exception
                        .revoked_at
                        .map(|ts| ts.format(&Rfc3339))
                        .transpose()
                        .map_err(|err| StoreError::Backend(err.to_string()))?,
                ],
            )
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        Ok(())
    }

    fn exceptions_for_tool(&self, tool_name: &str) -> Result<Vec<PolicyException>, StoreError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare(
                "SELECT exception_id, tool_name, reason, created_by, created_at, expires_at,
                        session_id, tenant_id, revoked_by, revoked_at
                 FROM exceptions WHERE tool_name = ?1 AND revoked_by IS NULL ORDER BY created_at DESC",
            )
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        let rows = statement
            .query_map(params![tool_name], row_to_exception)
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|err| StoreError::Backend(err.to_string()))?.into_iter().collect()
    }

    fn unrevoked_exceptions(&self) -> Result<Vec<PolicyException>, StoreError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare(
                "SELECT exception_id, tool_name, reason, created_by, created_at, expires_at,
                        session_id, tenant_id, revoked_by, revoked_at
                 FROM exceptions WHERE revoked_by IS NULL",
            )
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        let rows = statement.query_map(params![], row_to_exception).map_err(|err| StoreError::Backend(err.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|err| StoreError::Backend(err.to_string()))?.into_iter().collect()
    }

    fn update_exception(&self, exception: &PolicyException) -> Result<(), StoreError> {
        let connection = self.lock()?;
        let updated = connection
            .execute(
                "UPDATE exceptions SET revoked_by=?2, revoked_at=?3 WHERE exception_id=?1",
                params![
                    exception.exception_id,
                    exception.revoked_by,
                    exception
                        .revoked_at
                        .map(|ts| ts.format(&Rfc3339))
                        .transpose()
                        .map_err(|err| StoreError::Backend(err.to_string()))?,
                ],
            )
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        if updated == 0 {
            return Err(StoreError::NotFound(exception.exception_id.clone()));
        }
        Ok(())
    }

    fn create_replay_run(&self, run: &ReplayRun) -> Result<(), StoreError> {
        let connection = self.lock()?;
        connection
            .execute(
                "INSERT INTO replay_runs (run_id, baseline_policy_version, candidate_policy_version, session_id, status, created_at, completed_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7)",
                params![
                    run.run_id,
                    run.baseline_policy_version,
                    run.candidate_policy_version,
                    run.session_id,
                    replay_status_to_str(run.status),
                    run.created_at.format(&Rfc3339).map_err(|err| StoreError::Backend(err.to_string()))?,
                    run.completed_at.map(|ts| ts.format(&Rfc3339)).transpose().map_err(|err| StoreError::Backend(err.to_string()))?,
                ],
            )
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        Ok(())
    }

    fn get_replay_run(&self, run_id: &str) -> Result<ReplayRun, StoreError> {
        let connection = self.lock()?;
        connection
            .query_row(
                "SELECT run_id, baseline_policy_version, candidate_policy_version, session_id, status, created_at, completed_at
                 FROM replay_runs WHERE run_id = ?1",
                params![run_id],
                row_to_replay_run,
            )
            .optional()
            .map_err(|err| StoreError::Backend(err.to_string()))?
            .ok_or_else(|| StoreError::NotFound(run_id.to_string()))?
    }

    fn update_replay_run(&self, run: &ReplayRun) -> Result<(), StoreError> {
        let connection = self.lock()?;
        let updated = connection
            .execute(
                "UPDATE replay_runs SET status=?2, completed_at=?3 WHERE run_id=?1",
                params![
                    run.run_id,
                    replay_status_to_str(run.status),
                    run.completed_at.map(|ts| ts.format(&Rfc3339)).transpose().map_err(|err| StoreError::Backend(err.to_string()))?,
                ],
            )
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        if updated == 0 {
            return Err(StoreError::NotFound(run.run_id.clone()));
        }
        Ok(())
    }

    fn append_replay_delta(&self, delta: &ReplayDelta) -> Result<(), StoreError> {
        let connection = self.lock()?;
        connection
            .execute(
                "INSERT INTO replay_deltas (
                    run_id, event_id, tool_name, baseline_action, candidate_action, severity,
                    baseline_rule, candidate_rule, baseline_reason, candidate_reason, root_cause, explanation
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
                params![
                    delta.run_id,
                    delta.event_id,
                    delta.tool_name,
                    action_to_str(delta.baseline_action),
                    action_to_str(delta.candidate_action),
                    severity_to_str(delta.severity),
                    delta.baseline_rule,
                    delta.candidate_rule,
                    delta.baseline_reason,
                    delta.candidate_reason,
                    delta.root_cause,
                    delta.explanation,
                ],
            )
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        Ok(())
    }

    fn replay_deltas_for_run(&self, run_id: &str) -> Result<Vec<ReplayDelta>, StoreError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare(
                "SELECT run_id, event_id, tool_name, baseline_action, candidate_action, severity,
                        baseline_rule, candidate_rule, baseline_reason, candidate_reason, root_cause, explanation
                 FROM replay_deltas WHERE run_id = ?1",
            )
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        let rows = statement.query_map(params![run_id], row_to_replay_delta).map_err(|err| StoreError::Backend(err.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|err| StoreError::Backend(err.to_string()))?.into_iter().collect()
    }

    fn create_rollout(&self, rollout: &RolloutRecord) -> Result<(), StoreError> {
        let connection = self.lock()?;
        connection
            .execute(
                "INSERT INTO rollouts (
                    rollout_id, tenant_id, baseline_version, candidate_version, status, verdict, reason,
                    critical_drift, high_drift, rolled_back, created_at, updated_at
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
                params![
                    rollout.rollout_id,
                    rollout.tenant_id,
                    rollout.baseline_version,
                    rollout.candidate_version,
                    rollout_status_to_str(rollout.status),
                    verdict_to_str(rollout.verdict),
                    rollout.reason,
                    i64::try_from(rollout.critical_drift).unwrap_or(i64::MAX),
                    i64::try_from(rollout.high_drift).unwrap_or(i64::MAX),
                    rollout.rolled_back,
                    rollout.created_at.format(&Rfc3339).map_err(|err| StoreError::Backend(err.to_string()))?,
                    rollout.updated_at.format(&Rfc3339).map_err(|err| StoreError::Backend(err.to_string()))?,
                ],
            )
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        Ok(())
    }

    fn get_rollout(&self, rollout_id: &str) -> Result<RolloutRecord, StoreError> {
        let connection = self.lock()?;
        connection
            .query_row(
                "SELECT rollout_id, tenant_id, baseline_version, candidate_version, status, verdict, reason,
                        critical_drift, high_drift, rolled_back, created_at, updated_at
                 FROM rollouts WHERE rollout_id = ?1",
                params![rollout_id],
                row_to_rollout,
            )
            .optional()
            .map_err(|err| StoreError::Backend(err.to_string()))?
            .ok_or_else(|| StoreError::NotFound(rollout_id.to_string()))?
    }

    fn update_rollout(&self, rollout: &RolloutRecord) -> Result<(), StoreError> {
        let connection = self.lock()?;
        let updated = connection
            .execute(
                "UPDATE rollouts SET status=?2, verdict=?3, reason=?4, critical_drift=?5, high_drift=?6, rolled_back=?7, updated_at=?8
                 WHERE rollout_id=?1",
                params![
                    rollout.rollout_id,
                    rollout_status_to_str(rollout.status),
                    verdict_to_str(rollout.verdict),
                    rollout.reason,
                    i64::try_from(rollout.critical_drift).unwrap_or(i64::MAX),
                    i64::try_from(rollout.high_drift).unwrap_or(i64::MAX),
                    rollout.rolled_back,
                    rollout.updated_at.format(&Rfc3339).map_err(|err| StoreError::Backend(err.to_string()))?,
                ],
            )
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        if updated == 0 {
            return Err(StoreError::NotFound(rollout.rollout_id.clone()));
        }
        Ok(())
    }

    fn create_evidence_archive(&self, archive: &EvidenceArchive) -> Result<(), StoreError> {
        let connection = self.lock()?;
        let insert = connection.execute(
            "INSERT INTO evidence_archives (archive_id, session_id, format, payload, integrity_hash, created_at)
             VALUES (?1,?2,?3,?4,?5,?6)",
            params![
                archive.archive_id,
                archive.session_id,
                evidence_format_to_str(archive.format),
                archive.payload,
                archive.integrity_hash,
                archive.created_at.format(&Rfc3339).map_err(|err| StoreError::Backend(err.to_string()))?,
            ],
        );
        match insert {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == rusqlite::ErrorCode::ConstraintViolation => Ok(()),
            Err(err) => Err(StoreError::Backend(err.to_string())),
        }
    }

    fn get_evidence_archive(&self, archive_id: &str) -> Result<EvidenceArchive, StoreError> {
        let connection = self.lock()?;
        connection
            .query_row(
                "SELECT archive_id, session_id, format, payload, integrity_hash, created_at
                 FROM evidence_archives WHERE archive_id = ?1",
                params![archive_id],
                row_to_evidence_archive,
            )
            .optional()
            .map_err(|err| StoreError::Backend(err.to_string()))?
            .ok_or_else(|| StoreError::NotFound(archive_id.to_string()))?
    }

    fn taint_labels(&self, session_id: &str) -> Result<std::collections::BTreeSet<String>, StoreError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare("SELECT label FROM session_taint_labels WHERE session_id = ?1")
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        let rows = statement
            .query_map(params![session_id], |row| row.get::<_, String>(0))
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        let mut labels = std::collections::BTreeSet::new();
        for row in rows {
            labels.insert(row.map_err(|err| StoreError::Backend(err.to_string()))?);
        }
        Ok(labels)
    }

    fn set_taint_labels(&self, session_id: &str, labels: &std::collections::BTreeSet<String>) -> Result<(), StoreError> {
        let mut connection = self.lock()?;
        let tx = connection.transaction().map_err(|err| StoreError::Backend(err.to_string()))?;
        tx.execute("DELETE FROM session_taint_labels WHERE session_id = ?1", params![session_id])
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        for label in labels {
            tx.execute("INSERT INTO session_taint_labels (session_id, label) VALUES (?1,?2)", params![session_id, label])
                .map_err(|err| StoreError::Backend(err.to_string()))?;
        }
        tx.commit().map_err(|err| StoreError::Backend(err.to_string()))
    }
}

fn collect_trace_events(
    statement: &mut rusqlite::Statement<'_>,
    query_params: impl rusqlite::Params,
) -> Result<Vec<TraceEvent>, StoreError> {
    let rows = statement.query_map(query_params, row_to_trace_event).map_err(|err| StoreError::Backend(err.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(|err| StoreError::Backend(err.to_string()))?.into_iter().collect()
}

fn row_to_trace_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<TraceEvent, StoreError>> {
    let timestamp_raw: String = row.get(1)?;
    let policy_decision_raw: String = row.get(8)?;
    let duration_ms: Option<i64> = row.get(12)?;
    Ok((|| -> Result<TraceEvent, StoreError> {
        Ok(TraceEvent {
            event_id: get_col(row, 0)?,
            timestamp: parse_rfc3339(&timestamp_raw)?,
            session_id: get_col(row, 2)?,
            user_id: get_col(row, 3)?,
            agent_id: get_col(row, 4)?,
            tool_name: get_col(row, 5)?,
            arguments_hash: get_col(row, 6)?,
            policy_version: get_col(row, 7)?,
            policy_decision: action_from_str(&policy_decision_raw)?,
            policy_reason: get_col(row, 9)?,
            matched_rule: get_col(row, 10)?,
            executed: get_col(row, 11)?,
            duration_ms: duration_ms.map(|value| value as u64),
            error: get_col(row, 13)?,
            is_write_action: get_col(row, 14)?,
            approval_token_present: get_col(row, 15)?,
        })
    })())
}

fn row_to_incident(row: &rusqlite::Row<'_>) -> rusqlite::Result<IncidentRecord> {
    let status_raw: String = row.get(2)?;
    let created_at_raw: String = row.get(5)?;
    let updated_at_raw: String = row.get(6)?;
    let released_at_raw: Option<String> = row.get(8)?;
    Ok(IncidentRecord {
        incident_id: row.get(0)?,
        session_id: row.get(1)?,
        status: incident_status_from_str(&status_raw).unwrap_or(IncidentStatus::Failed),
        risk_score: row.get(3)?,
        reason: row.get(4)?,
        created_at: parse_rfc3339(&created_at_raw).unwrap_or(OffsetDateTime::UNIX_EPOCH),
        updated_at: parse_rfc3339(&updated_at_raw).unwrap_or(OffsetDateTime::UNIX_EPOCH),
        released_by: row.get(7)?,
        released_at: released_at_raw.and_then(|raw| parse_rfc3339(&raw).ok()),
    })
}

fn row_to_workflow(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<ApprovalWorkflow, StoreError>> {
    let required_approvers_raw: String = row.get(4)?;
    let created_at_raw: String = row.get(6)?;
    let expires_at_raw: String = row.get(7)?;
    let updated_at_raw: Option<String> = row.get(8)?;
    let approvals_raw: String = row.get(9)?;
    let delegations_raw: String = row.get(10)?;
    Ok((|| -> Result<ApprovalWorkflow, StoreError> {
        Ok(ApprovalWorkflow {
            workflow_id: get_col(row, 0)?,
            session_id: get_col(row, 1)?,
            tool_name: get_col(row, 2)?,
            required_steps: get_col(row, 3)?,
            required_approvers: serde_json::from_str(&required_approvers_raw)
                .map_err(|err| StoreError::Backend(err.to_string()))?,
            requested_by: get_col(row, 5)?,
            created_at: parse_rfc3339(&created_at_raw)?,
            expires_at: parse_rfc3339(&expires_at_raw)?,
            updated_at: updated_at_raw.map(|raw| parse_rfc3339(&raw)).transpose()?,
            approvals: serde_json::from_str(&approvals_raw).map_err(|err| StoreError::Backend(err.to_string()))?,
            delegations: serde_json::from_str(&delegations_raw).map_err(|err| StoreError::Backend(err.to_string()))?,
        })
    })())
}

fn row_to_exception(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<PolicyException, StoreError>> {
    let created_at_raw: String = row.get(4)?;
    let expires_at_raw: String = row.get(5)?;
    let revoked_at_raw: Option<String> = row.get(9)?;
    Ok((|| -> Result<PolicyException, StoreError> {
        Ok(PolicyException {
            exception_id: get_col(row, 0)?,
            tool_name: get_col(row, 1)?,
            reason: get_col(row, 2)?,
            created_by: get_col(row, 3)?,
            created_at: parse_rfc3339(&created_at_raw)?,
            expires_at: parse_rfc3339(&expires_at_raw)?,
            session_id: get_col(row, 6)?,
            tenant_id: get_col(row, 7)?,
            revoked_by: get_col(row, 8)?,
            revoked_at: revoked_at_raw.map(|raw| parse_rfc3339(&raw)).transpose()?,
        })
    })())
}

fn replay_status_to_str(status: ReplayRunStatus) -> &'static str {
    match status {
        ReplayRunStatus::Pending => "pending",
        ReplayRunStatus::Completed => "completed",
    }
}

fn replay_status_from_str(value: &str) -> Result<ReplayRunStatus, StoreError> {
    match value {
        "pending" => Ok(ReplayRunStatus::Pending),
        "completed" => Ok(ReplayRunStatus::Completed),
        other => Err(StoreError::Backend(format!("unknown replay run status in storage: {other}"))),
    }
}

fn severity_to_str(severity: agentgate_core::DeltaSeverity) -> &'static str {
    use agentgate_core::DeltaSeverity;
    match severity {
        DeltaSeverity::Low => "low",
        DeltaSeverity::Medium => "medium",
        DeltaSeverity::High => "high",
        DeltaSeverity::Critical => "critical",
    }
}

fn severity_from_str(value: &str) -> Result<agentgate_core::DeltaSeverity, StoreError> {
    use agentgate_core::DeltaSeverity;
    match value {
        "low" => Ok(DeltaSeverity::Low),
        "medium" => Ok(DeltaSeverity::Medium),
        "high" => Ok(DeltaSeverity::High),
        "critical" => Ok(DeltaSeverity::Critical),
        other => Err(StoreError::Backend(format!("unknown severity in storage: {other}"))),
    }
}

fn rollout_status_to_str(status: RolloutStatus) -> &'static str {
    match status {
        RolloutStatus::Promoting => "promoting",
        RolloutStatus::Completed => "completed",
        RolloutStatus::RolledBack => "rolled_back",
    }
}

fn rollout_status_from_str(value: &str) -> Result<RolloutStatus, StoreError> {
    match value {
        "promoting" => Ok(RolloutStatus::Promoting),
        "completed" => Ok(RolloutStatus::Completed),
        "rolled_back" => Ok(RolloutStatus::RolledBack),
        other => Err(StoreError::Backend(format!("unknown rollout status in storage: {other}"))),
    }
}

fn verdict_to_str(verdict: agentgate_core::CanaryVerdict) -> &'static str {
    use agentgate_core::CanaryVerdict;
    match verdict {
        CanaryVerdict::Pass => "pass",
        CanaryVerdict::Fail => "fail",
    }
}

fn verdict_from_str(value: &str) -> Result<agentgate_core::CanaryVerdict, StoreError> {
    use agentgate_core::CanaryVerdict;
    match value {
        "pass" => Ok(CanaryVerdict::Pass),
        "fail" => Ok(CanaryVerdict::Fail),
        other => Err(StoreError::Backend(format!("unknown canary verdict in storage: {other}"))),
    }
}

fn row_to_replay_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<ReplayRun, StoreError>> {
    let status_raw: String = row.get(4)?;
    let created_at_raw: String = row.get(5)?;
    let completed_at_raw: Option<String> = row.get(6)?;
    Ok((|| -> Result<ReplayRun, StoreError> {
        Ok(ReplayRun {
            run_id: get_col(row, 0)?,
            baseline_policy_version: get_col(row, 1)?,
            candidate_policy_version: get_col(row, 2)?,
            session_id: get_col(row, 3)?,
            status: replay_status_from_str(&status_raw)?,
            created_at: parse_rfc3339(&created_at_raw)?,
            completed_at: completed_at_raw.map(|raw| parse_rfc3339(&raw)).transpose()?,
        })
    })())
}

fn row_to_replay_delta(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<ReplayDelta, StoreError>> {
    let baseline_action_raw: String = row.get(3)?;
    let candidate_action_raw: String = row.get(4)?;
    let severity_raw: String = row.get(5)?;
    Ok((|| -> Result<ReplayDelta, StoreError> {
        Ok(ReplayDelta {
            run_id: get_col(row, 0)?,
            event_id: get_col(row, 1)?,
            tool_name: get_col(row, 2)?,
            baseline_action: action_from_str(&baseline_action_raw)?,
            candidate_action: action_from_str(&candidate_action_raw)?,
            severity: severity_from_str(&severity_raw)?,
            baseline_rule: get_col(row, 6)?,
            candidate_rule: get_col(row, 7)?,
            baseline_reason: get_col(row, 8)?,
            candidate_reason: get_col(row, 9)?,
            root_cause: get_col(row, 10)?,
            explanation: get_col(row, 11)?,
        })
    })())
}

fn row_to_rollout(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<RolloutRecord, StoreError>> {
    let status_raw: String = row.get(4)?;
    let verdict_raw: String = row.get(5)?;
    let created_at_raw: String = row.get(10)?;
    let updated_at_raw: String = row.get(11)?;
    Ok((|| -> Result<RolloutRecord, StoreError> {
        let critical_drift: i64 = get_col(row, 7)?;
        let high_drift: i64 = get_col(row, 8)?;
        Ok(RolloutRecord {
            rollout_id: get_col(row, 0)?,
            tenant_id: get_col(row, 1)?,
            baseline_version: get_col(row, 2)?,
            candidate_version: get_col(row, 3)?,
            status: rollout_status_from_str(&status_raw)?,
            verdict: verdict_from_str(&verdict_raw)?,
            reason: get_col(row, 6)?,
            critical_drift: critical_drift.max(0) as u64,
            high_drift: high_drift.max(0) as u64,
            rolled_back: get_col(row, 9)?,
            created_at: parse_rfc3339(&created_at_raw)?,
            updated_at: parse_rfc3339(&updated_at_raw)?,
        })
    })())
}

fn evidence_format_to_str(format: EvidenceFormat) -> &'static str {
    match format {
        EvidenceFormat::Json => "json",
        EvidenceFormat::Html => "html",
        EvidenceFormat::Pdf => "pdf",
    }
}

fn evidence_format_from_str(value: &str) -> Result<EvidenceFormat, StoreError> {
    match value {
        "json" => Ok(EvidenceFormat::Json),
        "html" => Ok(EvidenceFormat::Html),
        "pdf" => Ok(EvidenceFormat::Pdf),
        other => Err(StoreError::Backend(format!("unknown evidence format in storage: {other}"))),
    }
}

fn row_to_evidence_archive(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<EvidenceArchive, StoreError>> {
    let format_raw: String = row.get(2)?;
    let created_at_raw: String = row.get(5)?;
    Ok((|| -> Result<EvidenceArchive, StoreError> {
        Ok(EvidenceArchive {
            archive_id: get_col(row, 0)?,
            session_id: get_col(row, 1)?,
            format: evidence_format_from_str(&format_raw)?,
            payload: get_col(row, 3)?,
            integrity_hash: get_col(row, 4)?,
            created_at: parse_rfc3339(&created_at_raw)?,
        })
    })())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions are permitted."
)]
mod tests {
    use agentgate_core::hash_bytes;

    use super::*;

    fn sample_event() -> TraceEvent {
        TraceEvent {
            event_id: "11111111-1111-1111-1111-111111111111".to_string(),
            timestamp: OffsetDateTime::now_utc(),
            session_id: "s1".to_string(),
            user_id: Some("u1".to_string()),
            agent_id: None,
            tool_name: "db_query".to_string(),
            arguments_hash: hash_bytes(b"{}"),
            policy_version: "v1".to_string(),
            policy_decision: PolicyAction::Allow,
            policy_reason: "read_only_tools".to_string(),
            matched_rule: Some("read_only_tools".to_string()),
            executed: true,
            duration_ms: Some(12),
            error: None,
            is_write_action: false,
            approval_token_present: false,
        }
    }

    #[test]
    fn append_and_query_round_trips() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        store.append_trace_event(&sample_event()).expect("appends");
        let events = store.trace_events_for_session("s1").expect("queries");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tool_name, "db_query");
    }

    #[test]
    fn migrations_are_idempotent_on_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("trace.sqlite3");
        {
            let store = SqliteTraceStore::open(&path).expect("opens");
            store.append_trace_event(&sample_event()).expect("appends");
        }
        let reopened = SqliteTraceStore::open(&path).expect("reopens");
        assert_eq!(reopened.all_trace_events().expect("queries").len(), 1);
    }

    #[test]
    fn evidence_archive_update_is_rejected() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        let archive = EvidenceArchive {
            archive_id: "a1".to_string(),
            session_id: "s1".to_string(),
            format: EvidenceFormat::Json,
            payload: b"{}".to_vec(),
            integrity_hash: hash_bytes(b"{}"),
            created_at: OffsetDateTime::now_utc(),
        };
        store.create_evidence_archive(&archive).expect("creates");
        let connection = store.connection.lock().expect("lock");
        let result = connection.execute("UPDATE evidence_archives SET payload = ?1 WHERE archive_id = ?2", params![b"{}".to_vec(), "a1"]);
        assert!(result.is_err());
    }

    #[test]
    fn duplicate_evidence_archive_insert_is_idempotent() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        let archive = EvidenceArchive {
            archive_id: "a1".to_string(),
            session_id: "s1".to_string(),
            format: EvidenceFormat::Json,
            payload: b"{}".to_vec(),
            integrity_hash: hash_bytes(b"{}"),
            created_at: OffsetDateTime::now_utc(),
        };
        store.create_evidence_archive(&archive).expect("creates");
        let duplicate = EvidenceArchive { archive_id: "a2".to_string(), ..archive };
        store.create_evidence_archive(&duplicate).expect("idempotent insert succeeds");
    }

    #[test]
    fn taint_labels_round_trip_and_replace() {
        let store = SqliteTraceStore::open_in_memory().expect("opens");
        assert!(store.taint_labels("s1").expect("queries").is_empty());

        let labels: std::collections::BTreeSet<String> = ["pii".to_string(), "sensitive".to_string()].into_iter().collect();
        store.set_taint_labels("s1", &labels).expect("writes");
        assert_eq!(store.taint_labels("s1").expect("queries"), labels);

        let narrowed: std::collections::BTreeSet<String> = ["pii".to_string()].into_iter().collect();
        store.set_taint_labels("s1", &narrowed).expect("replaces");
        assert_eq!(store.taint_labels("s1").expect("queries"), narrowed);

        assert!(store.taint_labels("s2").expect("queries").is_empty());
    }
}
