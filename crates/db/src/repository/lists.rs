//! Contact list lookups.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::ContactListRow, DbError};

/// Fetch a list owned by `organization_id`.
pub async fn get_list(pool: &PgPool, organization_id: Uuid, id: Uuid) -> Result<ContactListRow, DbError> {
    sqlx::query_as::<_, ContactListRow>(
        r#"
        SELECT id, organization_id, name, kind, contact_ids, filter
        FROM contact_lists
        WHERE id = $1 AND organization_id = $2
        "#,
    )
    .bind(id)
    .bind(organization_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}
