//! Contact repository functions.
//!
//! Properties are a JSONB array of `{key, value}` objects; dynamic-list
//! filters are evaluated with JSONB containment against that array.

use chrono::Utc;
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::ContactRow, DbError};

/// Insert a contact.
pub async fn create_contact(
    pool: &PgPool,
    organization_id: Uuid,
    properties: Value,
    source: &str,
) -> Result<ContactRow, DbError> {
    let row = sqlx::query_as::<_, ContactRow>(
        r#"
        INSERT INTO contacts (id, organization_id, properties, source, created_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, organization_id, properties, source, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(organization_id)
    .bind(properties)
    .bind(source)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetch the contacts of `organization_id` whose id is in `ids`.
pub async fn find_contacts_by_ids(
    pool: &PgPool,
    organization_id: Uuid,
    ids: &[Uuid],
) -> Result<Vec<ContactRow>, DbError> {
    let rows = sqlx::query_as::<_, ContactRow>(
        r#"
        SELECT id, organization_id, properties, source, created_at
        FROM contacts
        WHERE organization_id = $1 AND id = ANY($2)
        ORDER BY created_at ASC
        "#,
    )
    .bind(organization_id)
    .bind(ids)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Fetch the contacts matching a `{key: value}` filter object.
///
/// Every pair must be present in the contact's property list.
pub async fn find_contacts_by_filter(
    pool: &PgPool,
    organization_id: Uuid,
    filter: &Value,
) -> Result<Vec<ContactRow>, DbError> {
    let required: Vec<Value> = filter
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(key, value)| json!({ "key": key, "value": value }))
                .collect()
        })
        .unwrap_or_default();

    let rows = sqlx::query_as::<_, ContactRow>(
        r#"
        SELECT id, organization_id, properties, source, created_at
        FROM contacts
        WHERE organization_id = $1 AND properties @> $2
        ORDER BY created_at ASC
        "#,
    )
    .bind(organization_id)
    .bind(Value::Array(required))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
