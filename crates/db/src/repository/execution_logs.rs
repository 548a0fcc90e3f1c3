//! Execution log repository functions.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    models::{ExecutionLogPatch, ExecutionLogRow},
    DbError,
};

const COLUMNS: &str = "execution_id, automation_id, organization_id, status, started_at, \
    completed_at, input, output, logs, error, duration_ms, pending_continuations, version";

/// Insert a new execution log record.
pub async fn create_log(pool: &PgPool, row: &ExecutionLogRow) -> Result<ExecutionLogRow, DbError> {
    let created = sqlx::query_as::<_, ExecutionLogRow>(&format!(
        r#"
        INSERT INTO execution_logs ({COLUMNS})
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(row.execution_id)
    .bind(row.automation_id)
    .bind(row.organization_id)
    .bind(&row.status)
    .bind(row.started_at)
    .bind(row.completed_at)
    .bind(&row.input)
    .bind(&row.output)
    .bind(&row.logs)
    .bind(&row.error)
    .bind(row.duration_ms)
    .bind(row.pending_continuations)
    .bind(row.version)
    .fetch_one(pool)
    .await?;

    Ok(created)
}

/// Fetch an execution log by execution id.
pub async fn get_log(pool: &PgPool, execution_id: Uuid) -> Result<ExecutionLogRow, DbError> {
    sqlx::query_as::<_, ExecutionLogRow>(&format!(
        "SELECT {COLUMNS} FROM execution_logs WHERE execution_id = $1"
    ))
    .bind(execution_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Apply `patch` if the record is still `running` and at `expected_version`.
///
/// Returns the new version. When nothing was updated the current row is
/// re-read to report why (missing, terminal, or stale version).
pub async fn update_log(
    pool: &PgPool,
    execution_id: Uuid,
    expected_version: i64,
    patch: &ExecutionLogPatch,
) -> Result<i64, DbError> {
    let version = sqlx::query_scalar::<_, i64>(
        r#"
        UPDATE execution_logs
        SET status = COALESCE($3, status),
            output = COALESCE($4, output),
            logs = COALESCE($5, logs),
            error = COALESCE($6, error),
            completed_at = COALESCE($7, completed_at),
            duration_ms = COALESCE($8, duration_ms),
            pending_continuations = COALESCE($9, pending_continuations),
            version = version + 1
        WHERE execution_id = $1 AND version = $2 AND status = 'running'
        RETURNING version
        "#,
    )
    .bind(execution_id)
    .bind(expected_version)
    .bind(patch.status.map(|s| s.to_string()))
    .bind(&patch.output)
    .bind(&patch.logs)
    .bind(&patch.error)
    .bind(patch.completed_at)
    .bind(patch.duration_ms)
    .bind(patch.pending_continuations)
    .fetch_optional(pool)
    .await?;

    if let Some(version) = version {
        return Ok(version);
    }

    let current = get_log(pool, execution_id).await?;
    if current.status()?.is_terminal() {
        return Err(DbError::TerminalStatus(current.status));
    }
    Err(DbError::VersionConflict {
        expected: expected_version,
        actual: current.version,
    })
}

/// Record that continuation `token_id` has been consumed.
///
/// Returns `false` when it was consumed before.
pub async fn claim_continuation(pool: &PgPool, execution_id: Uuid, token_id: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query(
        r#"
        INSERT INTO consumed_continuations (token_id, execution_id, consumed_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (token_id) DO NOTHING
        "#,
    )
    .bind(token_id)
    .bind(execution_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}
