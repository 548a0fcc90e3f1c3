//! The execution context threaded through one run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Node id recorded on entries that belong to the run rather than a node.
pub const RUN_LOG_NODE: &str = "execution";

/// Severity of an execution log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Start,
    Success,
    Info,
    Warning,
    Error,
}

/// One entry of a run's append-only execution log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub node_id: String,
    pub level: LogLevel,
    pub action: String,
    pub message: String,
}

/// Mutable state shared by every node of a run.
///
/// Serialisable so a delay node can hand a deep snapshot to the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    pub execution_id: Uuid,
    pub automation_id: Uuid,
    pub organization_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Free-form data bag; every node reads from and writes into it.
    pub data: Value,
    pub logs: Vec<LogEntry>,
    /// Node currently executing; the resume point after a delay.
    #[serde(default)]
    pub current_node_id: Option<String>,
    /// Delay continuations handed to the scheduler during this walk.
    #[serde(default)]
    pub pending_continuations: u32,
}

impl ExecutionContext {
    pub fn new(execution_id: Uuid, automation_id: Uuid, organization_id: Uuid, data: Value) -> Self {
        let data = match data {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        Self {
            execution_id,
            automation_id,
            organization_id,
            started_at: Utc::now(),
            data,
            logs: Vec::new(),
            current_node_id: None,
            pending_continuations: 0,
        }
    }

    /// Append an entry for the node currently executing.
    pub fn log(&mut self, level: LogLevel, action: &str, message: impl Into<String>) {
        let node_id = self
            .current_node_id
            .clone()
            .unwrap_or_else(|| RUN_LOG_NODE.to_string());
        self.log_node(node_id, level, action, message);
    }

    /// Append an entry and mirror it as a tracing event.
    pub fn log_node(
        &mut self,
        node_id: impl Into<String>,
        level: LogLevel,
        action: &str,
        message: impl Into<String>,
    ) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            node_id: node_id.into(),
            level,
            action: action.to_string(),
            message: message.into(),
        };

        let execution_id = self.execution_id;
        match entry.level {
            LogLevel::Start => debug!(%execution_id, node_id = %entry.node_id, action, "{}", entry.message),
            LogLevel::Success | LogLevel::Info => {
                info!(%execution_id, node_id = %entry.node_id, action, "{}", entry.message)
            }
            LogLevel::Warning => warn!(%execution_id, node_id = %entry.node_id, action, "{}", entry.message),
            LogLevel::Error => error!(%execution_id, node_id = %entry.node_id, action, "{}", entry.message),
        }

        self.logs.push(entry);
    }

    /// Insert a top-level key into the data bag, overwriting any prior value.
    pub fn insert(&mut self, key: &str, value: Value) {
        self.data_object_mut().insert(key.to_string(), value);
    }

    /// Merge every top-level key of `values` into the data bag.
    pub fn merge(&mut self, values: Map<String, Value>) {
        self.data_object_mut().extend(values);
    }

    fn data_object_mut(&mut self) -> &mut Map<String, Value> {
        if !self.data.is_object() {
            self.data = Value::Object(Map::new());
        }
        match &mut self.data {
            Value::Object(map) => map,
            _ => unreachable!("data bag was just replaced with an object"),
        }
    }

    /// Independent copy for one trigger subgraph: same identifiers, a deep
    /// copy of the data bag, and no log entries or pending continuations.
    pub fn fork(&self) -> Self {
        Self {
            logs: Vec::new(),
            current_node_id: None,
            pending_continuations: 0,
            ..self.clone()
        }
    }

    /// Fold a finished fork back in. Top-level keys of the fork's bag
    /// overwrite ours; log entries are appended in order.
    pub fn absorb(&mut self, fork: ExecutionContext) {
        if let Value::Object(map) = fork.data {
            self.merge(map);
        }
        self.logs.extend(fork.logs);
        self.pending_continuations += fork.pending_continuations;
    }
}
