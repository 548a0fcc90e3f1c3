//! Automation execution engine.
//!
//! `AutomationExecutor` is the central orchestrator:
//! 1. Writes a `running` execution log record (or `skipped` for inactive
//!    automations fired by a background trigger).
//! 2. Walks every trigger subgraph depth-first, each on its own fork of the
//!    context, concurrently.
//! 3. Dispatches each node by kind; successors run strictly in list order.
//! 4. Suspends at delay nodes by handing a continuation to the scheduler.
//! 5. Settles the record: `failed` on error, `completed` once no walk or
//!    continuation is outstanding, otherwise still `running`.

use std::sync::Arc;

use futures_util::future::{join_all, BoxFuture, FutureExt};
use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use db::models::ExecutionStatus;
use db::{AutomationStore, DbError, ExecutionLogStore};
use nodes::context::RUN_LOG_NODE;
use nodes::{ExecutableNode, ExecutionContext, LogLevel, Node, NodeError, NodeKind, Services};
use queue::{ContinuationToken, DelayedScheduler};

use crate::recorder::{RunRecorder, Settlement};
use crate::{delay, Automation, EngineError, ExecutorConfig};

/// How a run invocation ended (failures are returned as `Err`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The walk finished and nothing is pending.
    Completed,
    /// The walk finished but the run still has outstanding work: scheduled
    /// continuations or another walk in flight.
    Suspended,
    /// Inactive automation fired by a background trigger.
    Skipped,
    /// The continuation token was already consumed.
    Duplicate,
}

#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub execution_id: Uuid,
    pub status: RunStatus,
    /// The data bag at the end of this invocation.
    pub output: Value,
}

/// What the walker does after a node's own work is done.
enum Flow {
    /// Walk the node's `next` list.
    Continue,
    /// Walk the chosen condition branch.
    Branch(Vec<String>),
    /// Stop here; a continuation has been scheduled.
    Suspend,
}

pub struct AutomationExecutor {
    services: Services,
    scheduler: Arc<dyn DelayedScheduler>,
    logs: Arc<dyn ExecutionLogStore>,
    automations: Arc<dyn AutomationStore>,
    recorder: RunRecorder,
}

impl AutomationExecutor {
    pub fn new(
        config: &ExecutorConfig,
        services: Services,
        scheduler: Arc<dyn DelayedScheduler>,
        logs: Arc<dyn ExecutionLogStore>,
        automations: Arc<dyn AutomationStore>,
    ) -> Self {
        Self {
            services: config.apply(services),
            scheduler,
            recorder: RunRecorder::new(logs.clone()),
            logs,
            automations,
        }
    }

    /// Run `automation` from all of its trigger nodes.
    ///
    /// Passing `execution_id` marks the invocation as a manual run: inactive
    /// automations are executed anyway. Without one, an inactive automation
    /// is recorded as `skipped` and no node runs.
    ///
    /// # Errors
    /// Missing trigger nodes, missing successors, node failures and scheduler
    /// failures mark the record `failed` and are returned.
    #[instrument(skip(self, automation, initial_data), fields(automation_id = %automation.id))]
    pub async fn execute_automation(
        &self,
        automation: &Automation,
        initial_data: Value,
        execution_id: Option<Uuid>,
    ) -> Result<ExecutionOutcome, EngineError> {
        let manual = execution_id.is_some();
        let execution_id = execution_id.unwrap_or_else(Uuid::new_v4);
        let mut ctx = ExecutionContext::new(
            execution_id,
            automation.id,
            automation.organization_id,
            initial_data,
        );
        self.recorder.begin(&ctx).await?;

        if !automation.is_active && !manual {
            ctx.log(LogLevel::Info, "execution_skipped", "Automation is inactive");
            self.recorder.skip(&ctx).await?;
            return Ok(ExecutionOutcome {
                execution_id,
                status: RunStatus::Skipped,
                output: ctx.data,
            });
        }

        ctx.log(
            LogLevel::Info,
            "execution_start",
            format!("Starting automation '{}'", automation.name),
        );

        let triggers = automation.triggers();
        let walked = if triggers.is_empty() {
            Err(EngineError::NoTriggerNodes)
        } else {
            self.run_triggers(&triggers, &automation.nodes, &mut ctx).await
        };

        self.finish(ctx, walked).await
    }

    /// Resume a run suspended at a delay node.
    ///
    /// Walks the successors of the delay node recorded in the snapshot (never
    /// the delay node itself) and appends to the same execution log record.
    /// A token that was already consumed is ignored. Once claimed, a resume
    /// that cannot start (for example because its automation was deleted)
    /// fails the run.
    #[instrument(skip_all, fields(execution_id = %token.execution_id, token_id = %token.token_id))]
    pub async fn continue_execution(&self, token: ContinuationToken) -> Result<ExecutionOutcome, EngineError> {
        let execution_id = token.execution_id;

        if !self.logs.claim_continuation(execution_id, token.token_id).await? {
            warn!("Continuation already consumed; ignoring duplicate delivery");
            return Ok(ExecutionOutcome {
                execution_id,
                status: RunStatus::Duplicate,
                output: token.context.data,
            });
        }

        let mut ctx = token.context;
        ctx.logs.clear();
        ctx.pending_continuations = 0;

        // The token is consumed from here on: anything that stops the resume
        // must settle the record, or its pending count never reaches zero.
        let all_nodes = match self.resume_nodes(execution_id, token.automation_id, token.all_nodes).await {
            Ok(nodes) => nodes,
            Err(e @ EngineError::Database(DbError::TerminalStatus(_))) => return Err(e),
            Err(e) => return self.finish(ctx, Err(e)).await,
        };

        let resume_id = ctx.current_node_id.clone().unwrap_or(token.resume_node_id);
        let next_ids = all_nodes
            .iter()
            .find(|n| n.id == resume_id)
            .map(|n| n.next().to_vec())
            .unwrap_or(token.next_node_ids);

        ctx.log_node(
            resume_id.clone(),
            LogLevel::Info,
            "resumed",
            "Execution resumed after delay",
        );

        let walked = self.walk(&resume_id, &next_ids, &all_nodes, &mut ctx).await;
        self.finish(ctx, walked).await
    }

    /// Nodes to resume with: the token's own copy, or the stored automation's
    /// when the token carries none. Fails if the run is already terminal.
    async fn resume_nodes(
        &self,
        execution_id: Uuid,
        automation_id: Uuid,
        carried: Vec<Node>,
    ) -> Result<Vec<Node>, EngineError> {
        let record = self.logs.get_log(execution_id).await?;
        if record.status()?.is_terminal() {
            return Err(DbError::TerminalStatus(record.status).into());
        }

        if !carried.is_empty() {
            return Ok(carried);
        }
        let row = self.automations.get_automation(automation_id).await?;
        Ok(Automation::try_from(row)?.nodes)
    }

    /// Walk `node` and, unless it suspends, its successors.
    pub fn execute_node<'a>(
        &'a self,
        node: &'a Node,
        all_nodes: &'a [Node],
        ctx: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, Result<(), EngineError>> {
        async move {
            ctx.current_node_id = Some(node.id.clone());
            ctx.log(
                LogLevel::Start,
                "node_start",
                format!("Executing {} node", node.kind.name()),
            );

            let flow = match self.dispatch(node, all_nodes, ctx).await {
                Ok(flow) => flow,
                Err(e) => {
                    ctx.log_node(node.id.clone(), LogLevel::Error, "node_error", e.to_string());
                    return Err(e);
                }
            };
            ctx.log_node(
                node.id.clone(),
                LogLevel::Success,
                "node_success",
                format!("{} node completed", node.kind.name()),
            );

            match flow {
                Flow::Continue => self.walk(&node.id, node.next(), all_nodes, ctx).await,
                Flow::Branch(ids) => self.walk(&node.id, &ids, all_nodes, ctx).await,
                Flow::Suspend => Ok(()),
            }
        }
        .boxed()
    }

    async fn dispatch(
        &self,
        node: &Node,
        all_nodes: &[Node],
        ctx: &mut ExecutionContext,
    ) -> Result<Flow, EngineError> {
        let executor: &dyn ExecutableNode = match &node.kind {
            NodeKind::Trigger(_) => return Ok(Flow::Continue),
            NodeKind::Condition(condition) => {
                let outcome = condition.evaluate(&ctx.data);
                ctx.log(
                    LogLevel::Info,
                    "condition_evaluated",
                    format!("Condition evaluated to {outcome}"),
                );
                return Ok(Flow::Branch(condition.branch(outcome).to_vec()));
            }
            NodeKind::Delay(delay) => {
                delay::suspend(self.scheduler.as_ref(), &self.recorder, node, delay, all_nodes, ctx).await?;
                return Ok(Flow::Suspend);
            }
            NodeKind::HttpRequest(n) => n,
            NodeKind::SendEmail(n) => n,
            NodeKind::SendWhatsapp(n) => n,
            NodeKind::Transform(n) => n,
            NodeKind::SendMassEmail(n) => n,
            NodeKind::Contacts(n) => n,
        };

        executor
            .execute(ctx, &self.services)
            .await
            .map(|()| Flow::Continue)
            .map_err(|source: NodeError| EngineError::NodeFailed {
                node_id: node.id.clone(),
                source,
            })
    }

    /// Execute `ids` one after another, in list order.
    async fn walk(
        &self,
        from: &str,
        ids: &[String],
        all_nodes: &[Node],
        ctx: &mut ExecutionContext,
    ) -> Result<(), EngineError> {
        for id in ids {
            let Some(next) = all_nodes.iter().find(|n| &n.id == id) else {
                let err = EngineError::UnknownSuccessor {
                    from: from.to_string(),
                    to: id.clone(),
                };
                ctx.log_node(from, LogLevel::Error, "unknown_successor", err.to_string());
                return Err(err);
            };
            self.execute_node(next, all_nodes, ctx).await?;
        }
        Ok(())
    }

    /// Run every trigger subgraph concurrently on its own fork, then merge
    /// the forks back in declaration order. The first failure (in
    /// declaration order) is returned after all forks are merged.
    async fn run_triggers(
        &self,
        triggers: &[&Node],
        all_nodes: &[Node],
        ctx: &mut ExecutionContext,
    ) -> Result<(), EngineError> {
        let runs = triggers.iter().map(|&trigger| {
            let mut fork = ctx.fork();
            async move {
                let result = self.execute_node(trigger, all_nodes, &mut fork).await;
                (fork, result)
            }
        });
        let results = join_all(runs).await;

        let mut first_error = None;
        for (fork, result) in results {
            ctx.absorb(fork);
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Settle the record for one finished walk, releasing the walk's own
    /// unit of pending work.
    async fn finish(
        &self,
        mut ctx: ExecutionContext,
        walked: Result<(), EngineError>,
    ) -> Result<ExecutionOutcome, EngineError> {
        let execution_id = ctx.execution_id;
        let pending_delta = -1;

        match walked {
            Ok(()) => {
                let status = self
                    .recorder
                    .settle(&ctx, Settlement { pending_delta, error: None })
                    .await?;
                let status = if status == ExecutionStatus::Completed {
                    RunStatus::Completed
                } else {
                    RunStatus::Suspended
                };
                info!(
                    %execution_id,
                    ?status,
                    scheduled = ctx.pending_continuations,
                    "Execution settled"
                );
                Ok(ExecutionOutcome {
                    execution_id,
                    status,
                    output: ctx.data,
                })
            }
            Err(e) => {
                let message = e.to_string();
                ctx.log_node(RUN_LOG_NODE, LogLevel::Error, "execution_failed", message.clone());
                if let Err(record_err) = self
                    .recorder
                    .settle(&ctx, Settlement { pending_delta, error: Some(&message) })
                    .await
                {
                    warn!(%execution_id, error = %record_err, "Could not mark execution failed");
                }
                Err(e)
            }
        }
    }
}
