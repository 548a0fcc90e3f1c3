//! Resume worker: feeds due continuation tokens back into the executor.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use queue::ContinuationToken;

use crate::AutomationExecutor;

/// Resume every token received on `rx` until `cancel` fires or the channel
/// closes. Resumes run as separate tasks; in-flight ones are awaited before
/// returning.
pub async fn run(
    executor: Arc<AutomationExecutor>,
    mut rx: mpsc::UnboundedReceiver<ContinuationToken>,
    cancel: CancellationToken,
) {
    info!("Resume worker started");
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            token = rx.recv() => {
                let Some(token) = token else { break };
                let executor = executor.clone();
                in_flight.spawn(async move {
                    let execution_id = token.execution_id;
                    match executor.continue_execution(token).await {
                        Ok(outcome) => info!(%execution_id, status = ?outcome.status, "Continuation processed"),
                        Err(e) => error!(%execution_id, error = %e, "Continuation failed"),
                    }
                });
            }
        }
    }

    while in_flight.join_next().await.is_some() {}
    info!("Resume worker stopped");
}
