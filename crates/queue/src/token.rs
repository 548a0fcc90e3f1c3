//! Continuation tokens: everything needed to resume a suspended run.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use nodes::{ExecutionContext, Node};

/// A persisted resume point produced by a delay node.
///
/// `token_id` is the idempotency key: a worker claims it before resuming, so
/// a token delivered twice resumes the run only once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuationToken {
    pub token_id: Uuid,
    pub execution_id: Uuid,
    pub automation_id: Uuid,
    pub organization_id: Uuid,
    /// The delay node that suspended the run.
    pub resume_node_id: String,
    /// Successors of the delay node, walked in order on resume.
    pub next_node_ids: Vec<String>,
    /// Deep snapshot of the context at suspension time.
    pub context: ExecutionContext,
    /// Node set of the automation. Empty means "reload from storage".
    #[serde(default)]
    pub all_nodes: Vec<Node>,
    pub delay_minutes: u64,
    pub due_at: DateTime<Utc>,
}

impl ContinuationToken {
    /// Build a token for a delay of `delay_minutes`, due from now.
    pub fn new(
        context: ExecutionContext,
        resume_node_id: impl Into<String>,
        next_node_ids: Vec<String>,
        all_nodes: Vec<Node>,
        delay_minutes: u64,
    ) -> Self {
        let minutes = i64::try_from(delay_minutes).unwrap_or(i64::MAX);
        let due_at = Utc::now()
            .checked_add_signed(Duration::try_minutes(minutes).unwrap_or(Duration::MAX))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            token_id: Uuid::new_v4(),
            execution_id: context.execution_id,
            automation_id: context.automation_id,
            organization_id: context.organization_id,
            resume_node_id: resume_node_id.into(),
            next_node_ids,
            context,
            all_nodes,
            delay_minutes,
            due_at,
        }
    }

    /// How long to wait from now; zero when already due.
    pub fn remaining(&self) -> std::time::Duration {
        (self.due_at - Utc::now()).to_std().unwrap_or_default()
    }
}
