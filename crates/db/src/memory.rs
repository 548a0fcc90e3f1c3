//! In-memory store for tests and single-process runs.
//!
//! Applies the same version and terminal-status rules as the Postgres store.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::models::{AutomationRow, ExecutionLogPatch, ExecutionLogRow, NewAutomation};
use crate::store::{AutomationStore, ExecutionLogStore};
use crate::DbError;

#[derive(Default)]
pub struct MemoryStore {
    logs: Mutex<HashMap<Uuid, ExecutionLogRow>>,
    automations: Mutex<HashMap<Uuid, AutomationRow>>,
    consumed: Mutex<HashSet<Uuid>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every execution log record, in no particular order.
    pub fn execution_logs(&self) -> Vec<ExecutionLogRow> {
        self.logs.lock().unwrap().values().cloned().collect()
    }

    /// Insert an automation row as-is (keeps its id).
    pub fn insert_automation(&self, row: AutomationRow) {
        self.automations.lock().unwrap().insert(row.id, row);
    }
}

#[async_trait]
impl ExecutionLogStore for MemoryStore {
    async fn create_log(&self, row: ExecutionLogRow) -> Result<ExecutionLogRow, DbError> {
        self.logs.lock().unwrap().insert(row.execution_id, row.clone());
        Ok(row)
    }

    async fn get_log(&self, execution_id: Uuid) -> Result<ExecutionLogRow, DbError> {
        self.logs
            .lock()
            .unwrap()
            .get(&execution_id)
            .cloned()
            .ok_or(DbError::NotFound)
    }

    async fn update_log(
        &self,
        execution_id: Uuid,
        expected_version: i64,
        patch: ExecutionLogPatch,
    ) -> Result<i64, DbError> {
        let mut logs = self.logs.lock().unwrap();
        let row = logs.get_mut(&execution_id).ok_or(DbError::NotFound)?;
        row.apply(expected_version, patch)
    }

    async fn claim_continuation(&self, _execution_id: Uuid, token_id: Uuid) -> Result<bool, DbError> {
        Ok(self.consumed.lock().unwrap().insert(token_id))
    }
}

#[async_trait]
impl AutomationStore for MemoryStore {
    async fn create_automation(&self, new: NewAutomation) -> Result<AutomationRow, DbError> {
        let row = AutomationRow {
            id: Uuid::new_v4(),
            organization_id: new.organization_id,
            name: new.name,
            is_active: new.is_active,
            created_by: new.created_by,
            nodes: new.nodes,
            created_at: Utc::now(),
        };
        self.insert_automation(row.clone());
        Ok(row)
    }

    async fn get_automation(&self, id: Uuid) -> Result<AutomationRow, DbError> {
        self.automations
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(DbError::NotFound)
    }

    async fn list_automations(&self) -> Result<Vec<AutomationRow>, DbError> {
        let mut rows: Vec<AutomationRow> = self.automations.lock().unwrap().values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn delete_automation(&self, id: Uuid) -> Result<(), DbError> {
        self.automations
            .lock()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or(DbError::NotFound)
    }
}
