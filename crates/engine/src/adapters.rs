//! Postgres-backed node collaborators.
//!
//! Contacts and lists are read and written through the `db` repositories.
//! Email and WhatsApp messages are written to `message_outbox`; delivery is
//! the mailer's job.

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use db::models::{ContactListRow, ContactRow};
use db::repository::{contacts, lists, outbox};
use db::{DbError, DbPool};
use nodes::traits::{
    Contact, ContactList, ContactQuery, ContactStore, EmailMessage, EmailSender, ListResolver,
    NewContact, Property, WhatsAppMessage, WhatsAppSender,
};
use nodes::NodeError;

fn store_error(e: DbError) -> NodeError {
    NodeError::Store(e.to_string())
}

fn delivery_error(e: DbError) -> NodeError {
    NodeError::Delivery(e.to_string())
}

fn contact_from_row(row: ContactRow) -> Result<Contact, NodeError> {
    let properties: Vec<Property> = serde_json::from_value(row.properties)
        .map_err(|e| NodeError::Store(format!("malformed properties on contact {}: {e}", row.id)))?;
    Ok(Contact {
        id: row.id,
        organization_id: row.organization_id,
        properties,
        source: row.source,
    })
}

fn list_from_row(row: ContactListRow) -> ContactList {
    let query = match row.kind.as_str() {
        "dynamic" => ContactQuery::Filter(row.filter.unwrap_or_else(|| json!({}))),
        _ => ContactQuery::Ids(row.contact_ids),
    };
    ContactList {
        id: row.id,
        name: row.name,
        query,
    }
}

#[derive(Clone)]
pub struct PgContactStore {
    pool: DbPool,
}

impl PgContactStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactStore for PgContactStore {
    async fn create(&self, contact: NewContact) -> Result<Contact, NodeError> {
        let properties = serde_json::to_value(&contact.properties)
            .map_err(|e| NodeError::InvalidConfig(e.to_string()))?;
        let row = contacts::create_contact(&self.pool, contact.organization_id, properties, &contact.source)
            .await
            .map_err(store_error)?;
        contact_from_row(row)
    }

    async fn find(&self, organization_id: Uuid, query: ContactQuery) -> Result<Vec<Contact>, NodeError> {
        let rows = match query {
            ContactQuery::Ids(ids) => contacts::find_contacts_by_ids(&self.pool, organization_id, &ids).await,
            ContactQuery::Filter(filter) => {
                contacts::find_contacts_by_filter(&self.pool, organization_id, &filter).await
            }
        }
        .map_err(store_error)?;

        rows.into_iter().map(contact_from_row).collect()
    }
}

#[derive(Clone)]
pub struct PgListResolver {
    pool: DbPool,
}

impl PgListResolver {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ListResolver for PgListResolver {
    async fn resolve(&self, organization_id: Uuid, list_id: Uuid) -> Result<ContactList, NodeError> {
        let row = lists::get_list(&self.pool, organization_id, list_id)
            .await
            .map_err(|e| match e {
                DbError::NotFound => NodeError::InvalidConfig(format!("contact list {list_id} not found")),
                other => store_error(other),
            })?;
        Ok(list_from_row(row))
    }
}

/// Queues email for the mailer.
#[derive(Clone)]
pub struct OutboxEmailSender {
    pool: DbPool,
}

impl OutboxEmailSender {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EmailSender for OutboxEmailSender {
    async fn send_email(&self, message: EmailMessage) -> Result<(), NodeError> {
        let payload = json!({
            "from": message.from,
            "subject": message.subject,
            "html": message.html,
        });
        outbox::enqueue_message(&self.pool, message.organization_id, "email", &message.to, payload)
            .await
            .map_err(delivery_error)?;
        Ok(())
    }
}

/// Queues WhatsApp messages for the mailer.
#[derive(Clone)]
pub struct OutboxWhatsAppSender {
    pool: DbPool,
}

impl OutboxWhatsAppSender {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WhatsAppSender for OutboxWhatsAppSender {
    async fn send_message(&self, message: WhatsAppMessage) -> Result<(), NodeError> {
        outbox::enqueue_message(
            &self.pool,
            message.organization_id,
            "whatsapp",
            &message.to,
            json!({ "message": message.message }),
        )
        .await
        .map_err(delivery_error)?;
        Ok(())
    }
}
