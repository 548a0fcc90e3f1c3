//! Store traits the engine depends on, and their Postgres implementation.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{AutomationRow, ExecutionLogPatch, ExecutionLogRow, NewAutomation};
use crate::repository::{automations, execution_logs};
use crate::{DbError, DbPool};

/// Persistence of execution log records.
#[async_trait]
pub trait ExecutionLogStore: Send + Sync {
    async fn create_log(&self, row: ExecutionLogRow) -> Result<ExecutionLogRow, DbError>;

    async fn get_log(&self, execution_id: Uuid) -> Result<ExecutionLogRow, DbError>;

    /// Patch a `running` record whose version is `expected_version`.
    /// Returns the new version.
    async fn update_log(
        &self,
        execution_id: Uuid,
        expected_version: i64,
        patch: ExecutionLogPatch,
    ) -> Result<i64, DbError>;

    /// Mark a continuation token as consumed. `false` means it already was.
    async fn claim_continuation(&self, execution_id: Uuid, token_id: Uuid) -> Result<bool, DbError>;
}

/// Persistence of automation definitions.
#[async_trait]
pub trait AutomationStore: Send + Sync {
    async fn create_automation(&self, new: NewAutomation) -> Result<AutomationRow, DbError>;
    async fn get_automation(&self, id: Uuid) -> Result<AutomationRow, DbError>;
    async fn list_automations(&self) -> Result<Vec<AutomationRow>, DbError>;
    async fn delete_automation(&self, id: Uuid) -> Result<(), DbError>;
}

/// Both stores over a Postgres pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl ExecutionLogStore for PgStore {
    async fn create_log(&self, row: ExecutionLogRow) -> Result<ExecutionLogRow, DbError> {
        execution_logs::create_log(&self.pool, &row).await
    }

    async fn get_log(&self, execution_id: Uuid) -> Result<ExecutionLogRow, DbError> {
        execution_logs::get_log(&self.pool, execution_id).await
    }

    async fn update_log(
        &self,
        execution_id: Uuid,
        expected_version: i64,
        patch: ExecutionLogPatch,
    ) -> Result<i64, DbError> {
        execution_logs::update_log(&self.pool, execution_id, expected_version, &patch).await
    }

    async fn claim_continuation(&self, execution_id: Uuid, token_id: Uuid) -> Result<bool, DbError> {
        execution_logs::claim_continuation(&self.pool, execution_id, token_id).await
    }
}

#[async_trait]
impl AutomationStore for PgStore {
    async fn create_automation(&self, new: NewAutomation) -> Result<AutomationRow, DbError> {
        automations::create_automation(&self.pool, &new).await
    }

    async fn get_automation(&self, id: Uuid) -> Result<AutomationRow, DbError> {
        automations::get_automation(&self.pool, id).await
    }

    async fn list_automations(&self) -> Result<Vec<AutomationRow>, DbError> {
        automations::list_automations(&self.pool).await
    }

    async fn delete_automation(&self, id: Uuid) -> Result<(), DbError> {
        automations::delete_automation(&self.pool, id).await
    }
}
