//! Delayed job queue repository functions.
//!
//! Jobs sit in the `job_queue` table until `run_at`. Pollers claim due jobs
//! with `SELECT … FOR UPDATE SKIP LOCKED` so several workers can run side by
//! side without delivering the same job twice.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::JobRow, DbError};

const COLUMNS: &str =
    "id, execution_id, automation_id, status, attempts, max_attempts, payload, run_at, created_at, updated_at";

/// Enqueue a job that becomes due at `run_at`.
///
/// `payload` is arbitrary JSON that the poller hands back to the engine.
pub async fn enqueue_job(
    pool: &PgPool,
    id: Uuid,
    execution_id: Uuid,
    automation_id: Uuid,
    payload: serde_json::Value,
    run_at: DateTime<Utc>,
) -> Result<JobRow, DbError> {
    let now = Utc::now();

    let row = sqlx::query_as::<_, JobRow>(&format!(
        r#"
        INSERT INTO job_queue
            (id, execution_id, automation_id, status, attempts, max_attempts, payload, run_at, created_at, updated_at)
        VALUES ($1, $2, $3, 'pending', 0, 3, $4, $5, $6, $6)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(id)
    .bind(execution_id)
    .bind(automation_id)
    .bind(payload)
    .bind(run_at)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Atomically fetch the oldest due job and mark it as `processing`.
///
/// Returns `None` if no pending job is due yet.
pub async fn fetch_next_due_job(pool: &PgPool, now: DateTime<Utc>) -> Result<Option<JobRow>, DbError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, JobRow>(&format!(
        r#"
        SELECT {COLUMNS}
        FROM job_queue
        WHERE status = 'pending' AND run_at <= $1
        ORDER BY run_at ASC
        LIMIT 1
        FOR UPDATE SKIP LOCKED
        "#
    ))
    .bind(now)
    .fetch_optional(&mut *tx)
    .await?;

    if let Some(ref job) = row {
        sqlx::query(
            r#"
            UPDATE job_queue
            SET status = 'processing', attempts = attempts + 1, updated_at = $1
            WHERE id = $2
            "#,
        )
        .bind(Utc::now())
        .bind(job.id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
    } else {
        tx.rollback().await?;
    }

    Ok(row)
}

/// Mark a job as completed.
pub async fn complete_job(pool: &PgPool, job_id: Uuid) -> Result<(), DbError> {
    sqlx::query("UPDATE job_queue SET status = 'completed', updated_at = $1 WHERE id = $2")
        .bind(Utc::now())
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Return a job to `pending`, or dead-letter it once `max_attempts` is reached.
pub async fn fail_job(pool: &PgPool, job_id: Uuid) -> Result<(), DbError> {
    sqlx::query(
        r#"
        UPDATE job_queue
        SET status = CASE WHEN attempts >= max_attempts THEN 'dead_lettered' ELSE 'pending' END,
            updated_at = $1
        WHERE id = $2
        "#,
    )
    .bind(Utc::now())
    .bind(job_id)
    .execute(pool)
    .await?;
    Ok(())
}
