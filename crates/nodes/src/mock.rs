//! Test doubles for the node collaborators.
//!
//! Each double records every call it receives and can be told to fail, so
//! unit and engine tests can run without a network, a mailer, or a database.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::http::HTTP_TIMEOUT;
use crate::mass_email::MASS_EMAIL_BATCH_SIZE;
use crate::traits::{
    Contact, ContactList, ContactQuery, ContactStore, EmailMessage, EmailSender, HttpClient,
    HttpRequest, HttpResponse, ListResolver, NewContact, Services, WhatsAppMessage, WhatsAppSender,
    DEFAULT_FROM_ADDRESS,
};
use crate::NodeError;

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Replays queued responses in order, then answers `200 {}`.
#[derive(Default)]
pub struct MockHttpClient {
    responses: Mutex<VecDeque<Result<HttpResponse, NodeError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttpClient {
    pub fn respond(&self, status: u16, body: Value) {
        let body_len = body.to_string().len();
        self.responses.lock().unwrap().push_back(Ok(HttpResponse {
            status,
            headers: [("content-type".to_string(), "application/json".to_string())].into(),
            body,
            body_len,
        }));
    }

    pub fn fail(&self, msg: impl Into<String>) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(NodeError::Transport(msg.into())));
    }

    /// All requests seen (in call order).
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, NodeError> {
        self.requests.lock().unwrap().push(request);
        self.responses.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(HttpResponse {
                status: 200,
                headers: Default::default(),
                body: json!({}),
                body_len: 2,
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Messaging
// ---------------------------------------------------------------------------

/// Records delivered emails; recipients registered with
/// [`RecordingEmailSender::fail_recipient`] are rejected.
#[derive(Default)]
pub struct RecordingEmailSender {
    sent: Mutex<Vec<EmailMessage>>,
    failing: Mutex<HashSet<String>>,
    attempts: Mutex<usize>,
}

impl RecordingEmailSender {
    pub fn fail_recipient(&self, to: impl Into<String>) {
        self.failing.lock().unwrap().insert(to.into());
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Number of send attempts, failed ones included.
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send_email(&self, message: EmailMessage) -> Result<(), NodeError> {
        *self.attempts.lock().unwrap() += 1;
        if self.failing.lock().unwrap().contains(&message.to) {
            return Err(NodeError::Delivery(format!("mailbox {} rejected", message.to)));
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingWhatsAppSender {
    sent: Mutex<Vec<WhatsAppMessage>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingWhatsAppSender {
    pub fn fail_recipient(&self, to: impl Into<String>) {
        self.failing.lock().unwrap().insert(to.into());
    }

    pub fn sent(&self) -> Vec<WhatsAppMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl WhatsAppSender for RecordingWhatsAppSender {
    async fn send_message(&self, message: WhatsAppMessage) -> Result<(), NodeError> {
        if self.failing.lock().unwrap().contains(&message.to) {
            return Err(NodeError::Delivery(format!("number {} unreachable", message.to)));
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Contacts & lists
// ---------------------------------------------------------------------------

/// In-memory contact store. Dynamic filters match when every key of the
/// filter object equals the contact property of the same key.
#[derive(Default)]
pub struct MemoryContactStore {
    contacts: Mutex<Vec<Contact>>,
    create_error: Mutex<Option<String>>,
}

impl MemoryContactStore {
    pub fn seed(&self, contacts: Vec<Contact>) {
        self.contacts.lock().unwrap().extend(contacts);
    }

    pub fn fail_creates(&self, msg: impl Into<String>) {
        *self.create_error.lock().unwrap() = Some(msg.into());
    }

    pub fn all(&self) -> Vec<Contact> {
        self.contacts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContactStore for MemoryContactStore {
    async fn create(&self, contact: NewContact) -> Result<Contact, NodeError> {
        if let Some(msg) = self.create_error.lock().unwrap().clone() {
            return Err(NodeError::Store(msg));
        }
        let created = Contact {
            id: Uuid::new_v4(),
            organization_id: contact.organization_id,
            properties: contact.properties,
            source: contact.source,
        };
        self.contacts.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn find(&self, organization_id: Uuid, query: ContactQuery) -> Result<Vec<Contact>, NodeError> {
        let contacts = self.contacts.lock().unwrap();
        let matches = contacts
            .iter()
            .filter(|c| c.organization_id == organization_id)
            .filter(|c| match &query {
                ContactQuery::Ids(ids) => ids.contains(&c.id),
                ContactQuery::Filter(Value::Object(filter)) => filter
                    .iter()
                    .all(|(k, v)| c.property(k) == Some(v)),
                ContactQuery::Filter(_) => true,
            })
            .cloned()
            .collect();
        Ok(matches)
    }
}

#[derive(Default)]
pub struct MemoryListResolver {
    lists: Mutex<HashMap<Uuid, ContactList>>,
}

impl MemoryListResolver {
    /// Register a list and return its id.
    pub fn add(&self, name: impl Into<String>, query: ContactQuery) -> Uuid {
        let id = Uuid::new_v4();
        self.lists.lock().unwrap().insert(
            id,
            ContactList {
                id,
                name: name.into(),
                query,
            },
        );
        id
    }
}

#[async_trait]
impl ListResolver for MemoryListResolver {
    async fn resolve(&self, _organization_id: Uuid, list_id: Uuid) -> Result<ContactList, NodeError> {
        self.lists
            .lock()
            .unwrap()
            .get(&list_id)
            .cloned()
            .ok_or_else(|| NodeError::Store(format!("list {list_id} not found")))
    }
}

// ---------------------------------------------------------------------------
// Bundle
// ---------------------------------------------------------------------------

/// All doubles together, with typed handles kept for assertions.
#[derive(Clone, Default)]
pub struct MockServices {
    pub http: Arc<MockHttpClient>,
    pub email: Arc<RecordingEmailSender>,
    pub whatsapp: Arc<RecordingWhatsAppSender>,
    pub contacts: Arc<MemoryContactStore>,
    pub lists: Arc<MemoryListResolver>,
}

impl MockServices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn services(&self) -> Services {
        Services {
            http: self.http.clone(),
            email: self.email.clone(),
            whatsapp: self.whatsapp.clone(),
            contacts: self.contacts.clone(),
            lists: self.lists.clone(),
            http_timeout: HTTP_TIMEOUT,
            mass_email_batch_size: MASS_EMAIL_BATCH_SIZE,
            default_from: DEFAULT_FROM_ADDRESS.to_string(),
        }
    }
}
