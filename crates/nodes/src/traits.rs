//! The `ExecutableNode` trait and the collaborator contracts node executors
//! depend on.
//!
//! Collaborators are defined here (in the nodes crate) so the engine can wire
//! concrete implementations without the node executors knowing about them.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{ExecutionContext, NodeError};

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub timeout: Duration,
}

/// Response of any status; only transport failures are errors.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON when the body is JSON, otherwise the raw text.
    pub body: Value,
    pub body_len: usize,
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, NodeError>;
}

// ---------------------------------------------------------------------------
// Messaging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub from: String,
    pub organization_id: Uuid,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_email(&self, message: EmailMessage) -> Result<(), NodeError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhatsAppMessage {
    pub to: String,
    pub message: String,
    pub organization_id: Uuid,
}

#[async_trait]
pub trait WhatsAppSender: Send + Sync {
    async fn send_message(&self, message: WhatsAppMessage) -> Result<(), NodeError>;
}

// ---------------------------------------------------------------------------
// Contacts & lists
// ---------------------------------------------------------------------------

/// One entry of a contact's flat key/value property model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub properties: Vec<Property>,
    pub source: String,
}

impl Contact {
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.iter().find(|p| p.key == key).map(|p| &p.value)
    }

    /// Properties as a `{key: value}` object, plus the contact id.
    pub fn property_bag(&self) -> Value {
        let mut map: serde_json::Map<String, Value> = self
            .properties
            .iter()
            .map(|p| (p.key.clone(), p.value.clone()))
            .collect();
        map.entry("id").or_insert_with(|| Value::String(self.id.to_string()));
        Value::Object(map)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewContact {
    pub organization_id: Uuid,
    pub properties: Vec<Property>,
    pub source: String,
}

/// How a list selects its members.
#[derive(Debug, Clone, PartialEq)]
pub enum ContactQuery {
    /// Explicit id set of a static list.
    Ids(Vec<Uuid>),
    /// Stored filter of a dynamic list: property key → required value.
    Filter(Value),
}

#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn create(&self, contact: NewContact) -> Result<Contact, NodeError>;
    async fn find(&self, organization_id: Uuid, query: ContactQuery) -> Result<Vec<Contact>, NodeError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContactList {
    pub id: Uuid,
    pub name: String,
    pub query: ContactQuery,
}

#[async_trait]
pub trait ListResolver: Send + Sync {
    async fn resolve(&self, organization_id: Uuid, list_id: Uuid) -> Result<ContactList, NodeError>;
}

// ---------------------------------------------------------------------------
// Services bundle
// ---------------------------------------------------------------------------

/// Fallback sender address for email nodes without `from`.
pub const DEFAULT_FROM_ADDRESS: &str = "noreply@automation.local";

/// Everything a node executor may call out to.
#[derive(Clone)]
pub struct Services {
    pub http: Arc<dyn HttpClient>,
    pub email: Arc<dyn EmailSender>,
    pub whatsapp: Arc<dyn WhatsAppSender>,
    pub contacts: Arc<dyn ContactStore>,
    pub lists: Arc<dyn ListResolver>,
    pub http_timeout: Duration,
    /// Concurrent sends per mass-email batch.
    pub mass_email_batch_size: usize,
    pub default_from: String,
}

// ---------------------------------------------------------------------------
// ExecutableNode
// ---------------------------------------------------------------------------

/// The contract every linear node kind fulfils.
///
/// Executors read from and write into `ctx.data` and append log entries;
/// returning an error aborts the run.
#[async_trait]
pub trait ExecutableNode: Send + Sync {
    async fn execute(&self, ctx: &mut ExecutionContext, services: &Services) -> Result<(), NodeError>;
}
