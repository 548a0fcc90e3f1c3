//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models — they carry no domain behaviour.
//! Node definitions, log entries and context snapshots are stored as JSON;
//! their domain types live in the `nodes` and `engine` crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// automations
// ---------------------------------------------------------------------------

/// A persisted automation definition row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AutomationRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    /// JSON array of node definitions (successor ids embedded per node).
    pub nodes: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when creating an automation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAutomation {
    pub organization_id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub nodes: serde_json::Value,
}

// ---------------------------------------------------------------------------
// execution_logs
// ---------------------------------------------------------------------------

/// Possible statuses for an execution log record.
///
/// `Running` is the only non-terminal status; transitions are one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Skipped,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running"   => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed"    => Ok(Self::Failed),
            "skipped"   => Ok(Self::Skipped),
            other       => Err(format!("unknown execution status: {other}")),
        }
    }
}

/// One persisted record per run.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExecutionLogRow {
    pub execution_id: Uuid,
    pub automation_id: Uuid,
    pub organization_id: Uuid,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    /// JSON array of log entries, in append order.
    pub logs: serde_json::Value,
    pub error: Option<String>,
    pub duration_ms: Option<i64>,
    /// Walks still in flight plus delay continuations not yet resumed.
    pub pending_continuations: i32,
    /// Bumped on every patch; patches carry the version they were based on.
    pub version: i64,
}

impl ExecutionLogRow {
    /// A fresh record in `running` status.
    pub fn running(
        execution_id: Uuid,
        automation_id: Uuid,
        organization_id: Uuid,
        input: serde_json::Value,
    ) -> Self {
        Self {
            execution_id,
            automation_id,
            organization_id,
            status: ExecutionStatus::Running.to_string(),
            started_at: Utc::now(),
            completed_at: None,
            input,
            output: None,
            logs: serde_json::Value::Array(Vec::new()),
            error: None,
            duration_ms: None,
            pending_continuations: 0,
            version: 0,
        }
    }

    /// Parsed status; unknown strings are reported as terminal so they are
    /// never patched.
    pub fn status(&self) -> Result<ExecutionStatus, DbError> {
        self.status
            .parse()
            .map_err(|_| DbError::TerminalStatus(self.status.clone()))
    }

    /// Apply `patch` if the record is still running and at `expected_version`.
    /// Returns the new version.
    pub fn apply(&mut self, expected_version: i64, patch: ExecutionLogPatch) -> Result<i64, DbError> {
        if self.status()?.is_terminal() {
            return Err(DbError::TerminalStatus(self.status.clone()));
        }
        if self.version != expected_version {
            return Err(DbError::VersionConflict {
                expected: expected_version,
                actual: self.version,
            });
        }

        if let Some(status) = patch.status {
            self.status = status.to_string();
        }
        if let Some(output) = patch.output {
            self.output = Some(output);
        }
        if let Some(logs) = patch.logs {
            self.logs = logs;
        }
        if let Some(error) = patch.error {
            self.error = Some(error);
        }
        if let Some(completed_at) = patch.completed_at {
            self.completed_at = Some(completed_at);
        }
        if let Some(duration_ms) = patch.duration_ms {
            self.duration_ms = Some(duration_ms);
        }
        if let Some(pending) = patch.pending_continuations {
            self.pending_continuations = pending;
        }
        self.version += 1;
        Ok(self.version)
    }
}

/// Partial update of an execution log; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionLogPatch {
    pub status: Option<ExecutionStatus>,
    pub output: Option<serde_json::Value>,
    pub logs: Option<serde_json::Value>,
    pub error: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub pending_continuations: Option<i32>,
}

// ---------------------------------------------------------------------------
// job_queue
// ---------------------------------------------------------------------------

/// Possible statuses for a queued job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    DeadLettered,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending      => write!(f, "pending"),
            Self::Processing   => write!(f, "processing"),
            Self::Completed    => write!(f, "completed"),
            Self::Failed       => write!(f, "failed"),
            Self::DeadLettered => write!(f, "dead_lettered"),
        }
    }
}

/// A delayed job row; `payload` is a serialised continuation token.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub automation_id: Uuid,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub payload: serde_json::Value,
    pub run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// contacts / contact_lists
// ---------------------------------------------------------------------------

/// A contact with its flat `[{key, value}]` property list.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ContactRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub properties: serde_json::Value,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

/// A segmentation list. `kind` is `static` (uses `contact_ids`) or
/// `dynamic` (evaluates `filter` at send time).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ContactListRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub kind: String,
    pub contact_ids: Vec<Uuid>,
    pub filter: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// message_outbox
// ---------------------------------------------------------------------------

/// An outgoing email or WhatsApp message waiting for the mailer.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OutboxRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub channel: String,
    pub recipient: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
