//! Outgoing message outbox.
//!
//! Email and WhatsApp sends are recorded here; delivery is done by a
//! separate mailer process that drains the table.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::OutboxRow, DbError};

/// Queue one outgoing message on `channel` (`email` or `whatsapp`).
pub async fn enqueue_message(
    pool: &PgPool,
    organization_id: Uuid,
    channel: &str,
    recipient: &str,
    payload: serde_json::Value,
) -> Result<OutboxRow, DbError> {
    let row = sqlx::query_as::<_, OutboxRow>(
        r#"
        INSERT INTO message_outbox (id, organization_id, channel, recipient, payload, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, organization_id, channel, recipient, payload, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(organization_id)
    .bind(channel)
    .bind(recipient)
    .bind(payload)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(row)
}
