//! The scheduler contract and its in-process implementations.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{ContinuationToken, QueueError};

/// Accepts continuation tokens and delivers each back once its delay elapses.
#[async_trait]
pub trait DelayedScheduler: Send + Sync {
    /// Schedule `token` and return the job id.
    async fn schedule(&self, token: ContinuationToken) -> Result<Uuid, QueueError>;
}

// ---------------------------------------------------------------------------
// TimerScheduler
// ---------------------------------------------------------------------------

/// In-process scheduler: one tokio timer per token, delivered over a channel.
///
/// Pending timers do not survive a restart; use [`crate::PgScheduler`] when
/// that matters.
#[derive(Clone)]
pub struct TimerScheduler {
    tx: mpsc::UnboundedSender<ContinuationToken>,
}

impl TimerScheduler {
    /// A scheduler and the receiver a worker consumes due tokens from.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ContinuationToken>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl DelayedScheduler for TimerScheduler {
    async fn schedule(&self, token: ContinuationToken) -> Result<Uuid, QueueError> {
        if self.tx.is_closed() {
            return Err(QueueError::ChannelClosed);
        }

        let job_id = Uuid::new_v4();
        let wait = token.remaining();
        let tx = self.tx.clone();
        debug!(%job_id, execution_id = %token.execution_id, ?wait, "Timer scheduled");

        tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            if tx.send(token).is_err() {
                warn!(%job_id, "Continuation dropped: worker channel closed");
            }
        });

        Ok(job_id)
    }
}

// ---------------------------------------------------------------------------
// RecordingScheduler
// ---------------------------------------------------------------------------

/// Test scheduler: keeps every token; delivery is up to the test.
#[derive(Default)]
pub struct RecordingScheduler {
    tokens: Mutex<Vec<(Uuid, ContinuationToken)>>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokens scheduled so far, in order.
    pub fn scheduled(&self) -> Vec<ContinuationToken> {
        self.tokens
            .lock()
            .unwrap()
            .iter()
            .map(|(_, token)| token.clone())
            .collect()
    }

    /// Remove and return every scheduled token.
    pub fn drain(&self) -> Vec<ContinuationToken> {
        self.tokens
            .lock()
            .unwrap()
            .drain(..)
            .map(|(_, token)| token)
            .collect()
    }

    pub fn job_ids(&self) -> Vec<Uuid> {
        self.tokens.lock().unwrap().iter().map(|(id, _)| *id).collect()
    }
}

#[async_trait]
impl DelayedScheduler for RecordingScheduler {
    async fn schedule(&self, token: ContinuationToken) -> Result<Uuid, QueueError> {
        let job_id = Uuid::new_v4();
        self.tokens.lock().unwrap().push((job_id, token));
        Ok(job_id)
    }
}
