//! Automation CRUD operations.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    models::{AutomationRow, NewAutomation},
    DbError,
};

const COLUMNS: &str = "id, organization_id, name, is_active, created_by, nodes, created_at";

/// Insert a new automation.
///
/// `nodes` must be the JSON array produced by serialising the domain node
/// list from the `nodes` crate.
pub async fn create_automation(pool: &PgPool, new: &NewAutomation) -> Result<AutomationRow, DbError> {
    let row = sqlx::query_as::<_, AutomationRow>(&format!(
        r#"
        INSERT INTO automations (id, organization_id, name, is_active, created_by, nodes, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(new.organization_id)
    .bind(&new.name)
    .bind(new.is_active)
    .bind(new.created_by)
    .bind(&new.nodes)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetch a single automation by its primary key.
pub async fn get_automation(pool: &PgPool, id: Uuid) -> Result<AutomationRow, DbError> {
    sqlx::query_as::<_, AutomationRow>(&format!("SELECT {COLUMNS} FROM automations WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Return all automations ordered by creation time (newest first).
pub async fn list_automations(pool: &PgPool) -> Result<Vec<AutomationRow>, DbError> {
    let rows = sqlx::query_as::<_, AutomationRow>(&format!(
        "SELECT {COLUMNS} FROM automations ORDER BY created_at DESC"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Permanently delete an automation.
///
/// Returns `DbError::NotFound` if no row was deleted.
pub async fn delete_automation(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM automations WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
