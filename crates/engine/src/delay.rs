//! Delay hand-off: suspend a walk by scheduling a continuation.

use tracing::{instrument, warn};
use uuid::Uuid;

use nodes::definition::DelayNode;
use nodes::{ExecutionContext, LogLevel, Node};
use queue::{ContinuationToken, DelayedScheduler};

use crate::recorder::RunRecorder;
use crate::EngineError;

/// Snapshot `ctx`, hand a continuation for `delay.next` to the scheduler and
/// count it as pending. Nothing after the delay runs in this walk.
///
/// The pending count is persisted before the continuation is scheduled, so a
/// resume delivered at once never finds the run without outstanding work.
#[instrument(skip_all, fields(execution_id = %ctx.execution_id, node_id = %node.id))]
pub async fn suspend(
    scheduler: &dyn DelayedScheduler,
    recorder: &RunRecorder,
    node: &Node,
    delay: &DelayNode,
    all_nodes: &[Node],
    ctx: &mut ExecutionContext,
) -> Result<Uuid, EngineError> {
    ctx.current_node_id = Some(node.id.clone());

    let token = ContinuationToken::new(
        ctx.clone(),
        node.id.clone(),
        delay.next.clone(),
        all_nodes.to_vec(),
        delay.delay_minutes,
    );

    recorder.add_pending(ctx.execution_id, 1).await?;
    let job_id = match scheduler.schedule(token).await {
        Ok(job_id) => job_id,
        Err(e) => {
            if let Err(undo) = recorder.add_pending(ctx.execution_id, -1).await {
                warn!(error = %undo, "Could not release pending count of unscheduled continuation");
            }
            return Err(e.into());
        }
    };

    ctx.pending_continuations += 1;
    ctx.log(
        LogLevel::Info,
        "delay_scheduled",
        format!(
            "Execution paused for {} minute(s); continuation job {job_id}",
            delay.delay_minutes
        ),
    );
    Ok(job_id)
}
