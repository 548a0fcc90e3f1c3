//! Postgres-backed scheduler: tokens are stored as `job_queue` rows and
//! picked up by [`poll_due_jobs`] once `run_at` has passed.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use db::repository::jobs;
use db::DbPool;

use crate::{ContinuationToken, DelayedScheduler, QueueError};

#[derive(Clone)]
pub struct PgScheduler {
    pool: DbPool,
}

impl PgScheduler {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DelayedScheduler for PgScheduler {
    async fn schedule(&self, token: ContinuationToken) -> Result<Uuid, QueueError> {
        let payload = serde_json::to_value(&token)?;
        let job = jobs::enqueue_job(
            &self.pool,
            Uuid::new_v4(),
            token.execution_id,
            token.automation_id,
            payload,
            token.due_at,
        )
        .await?;

        debug!(job_id = %job.id, run_at = %job.run_at, "Continuation job enqueued");
        Ok(job.id)
    }
}

/// Poll `job_queue` every `interval` and forward due tokens to `tx` until
/// `cancel` fires or the receiver is dropped.
///
/// Jobs whose payload does not decode are failed (and eventually
/// dead-lettered); a job is completed once its token has been handed over.
pub async fn poll_due_jobs(
    pool: DbPool,
    tx: mpsc::UnboundedSender<ContinuationToken>,
    interval: Duration,
    cancel: CancellationToken,
) -> Result<(), QueueError> {
    info!(?interval, "Polling for due continuation jobs");

    loop {
        // Drain everything that is due before sleeping again.
        loop {
            let Some(job) = jobs::fetch_next_due_job(&pool, Utc::now()).await? else {
                break;
            };

            let token = match serde_json::from_value::<ContinuationToken>(job.payload.clone()) {
                Ok(token) => token,
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "Undecodable continuation payload");
                    jobs::fail_job(&pool, job.id).await?;
                    continue;
                }
            };

            if tx.send(token).is_err() {
                warn!(job_id = %job.id, "Worker channel closed; returning job to the queue");
                jobs::fail_job(&pool, job.id).await?;
                return Err(QueueError::ChannelClosed);
            }
            jobs::complete_job(&pool, job.id).await?;
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Job poller stopped");
                return Ok(());
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
