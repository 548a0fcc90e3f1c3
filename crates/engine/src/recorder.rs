//! Execution log recorder: the persisted, append-only record of one run.
//!
//! Every write is a patch against the version the recorder just read. On a
//! version conflict (a concurrent resume of the same run) the record is
//! re-read and the patch rebuilt, so log entries are appended rather than
//! overwritten.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use db::models::{ExecutionLogPatch, ExecutionLogRow, ExecutionStatus};
use db::{DbError, ExecutionLogStore};
use nodes::ExecutionContext;

use crate::EngineError;

const MAX_PATCH_ATTEMPTS: usize = 5;

/// What a finished walk hands to [`RunRecorder::settle`].
#[derive(Debug, Clone, Copy)]
pub struct Settlement<'a> {
    /// Change in outstanding work. A finished walk releases its own unit
    /// (`-1`); continuations it scheduled were counted when scheduled.
    pub pending_delta: i32,
    pub error: Option<&'a str>,
}

#[derive(Clone)]
pub struct RunRecorder {
    store: Arc<dyn ExecutionLogStore>,
}

impl RunRecorder {
    pub fn new(store: Arc<dyn ExecutionLogStore>) -> Self {
        Self { store }
    }

    /// Write the initial `running` record; `input` is the initial data bag.
    /// The walk about to start is the record's first unit of pending work.
    pub async fn begin(&self, ctx: &ExecutionContext) -> Result<(), EngineError> {
        let mut row = ExecutionLogRow::running(
            ctx.execution_id,
            ctx.automation_id,
            ctx.organization_id,
            ctx.data.clone(),
        );
        row.started_at = ctx.started_at;
        row.pending_continuations = 1;
        self.store.create_log(row).await?;
        Ok(())
    }

    /// Mark a run `skipped` without touching its output.
    pub async fn skip(&self, ctx: &ExecutionContext) -> Result<(), EngineError> {
        self.patch(ctx.execution_id, |record| {
            Ok(ExecutionLogPatch {
                status: Some(ExecutionStatus::Skipped),
                logs: Some(appended_logs(record, ctx)?),
                pending_continuations: Some(0),
                completed_at: Some(Utc::now()),
                duration_ms: Some(elapsed_ms(record)),
                ..Default::default()
            })
        })
        .await
        .map(|_| ())
    }

    /// Adjust the pending-work counter without touching status or logs.
    ///
    /// A delay node calls this with `+1` before its continuation is handed to
    /// the scheduler, so a resume delivered early still sees the walk that
    /// scheduled it as outstanding.
    pub async fn add_pending(&self, execution_id: Uuid, delta: i32) -> Result<(), EngineError> {
        self.patch(execution_id, |record| {
            Ok(ExecutionLogPatch {
                pending_continuations: Some((record.pending_continuations + delta).max(0)),
                ..Default::default()
            })
        })
        .await
        .map(|_| ())
    }

    /// Fold a finished walk into the record and return the resulting status.
    ///
    /// The run fails on error, completes once no continuation is pending,
    /// and otherwise stays `running`.
    pub async fn settle(
        &self,
        ctx: &ExecutionContext,
        settlement: Settlement<'_>,
    ) -> Result<ExecutionStatus, EngineError> {
        self.patch(ctx.execution_id, |record| {
            let pending = (record.pending_continuations + settlement.pending_delta).max(0);
            let status = match settlement.error {
                Some(_) => ExecutionStatus::Failed,
                None if pending == 0 => ExecutionStatus::Completed,
                None => ExecutionStatus::Running,
            };

            let mut patch = ExecutionLogPatch {
                status: Some(status),
                output: Some(ctx.data.clone()),
                logs: Some(appended_logs(record, ctx)?),
                error: settlement.error.map(str::to_string),
                pending_continuations: Some(pending),
                ..Default::default()
            };
            if status.is_terminal() {
                patch.completed_at = Some(Utc::now());
                patch.duration_ms = Some(elapsed_ms(record));
            }
            Ok(patch)
        })
        .await
    }

    async fn patch<F>(&self, execution_id: Uuid, build: F) -> Result<ExecutionStatus, EngineError>
    where
        F: Fn(&ExecutionLogRow) -> Result<ExecutionLogPatch, EngineError>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let record = self.store.get_log(execution_id).await?;
            let patch = build(&record)?;
            let status = match patch.status {
                Some(status) => status,
                None => record.status()?,
            };

            match self.store.update_log(execution_id, record.version, patch).await {
                Ok(version) => {
                    debug!(%execution_id, version, %status, "Execution log updated");
                    return Ok(status);
                }
                Err(DbError::VersionConflict { expected, actual }) if attempt < MAX_PATCH_ATTEMPTS => {
                    warn!(%execution_id, expected, actual, attempt, "Execution log changed concurrently; retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn appended_logs(record: &ExecutionLogRow, ctx: &ExecutionContext) -> Result<Value, EngineError> {
    let mut logs = match &record.logs {
        Value::Array(entries) => entries.clone(),
        _ => Vec::new(),
    };
    for entry in &ctx.logs {
        logs.push(serde_json::to_value(entry).map_err(DbError::from)?);
    }
    Ok(Value::Array(logs))
}

fn elapsed_ms(record: &ExecutionLogRow) -> i64 {
    (Utc::now() - record.started_at).num_milliseconds().max(0)
}
