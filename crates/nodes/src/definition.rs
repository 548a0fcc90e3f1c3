//! Node definitions.
//!
//! A node is one step of an automation graph. Edges are implicit: each node
//! carries the ids of its successors. The JSON form is the one produced by the
//! automation editor, e.g.
//!
//! ```json
//! { "id": "n2", "type": "http_request", "url": "https://…", "next": ["n3"] }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A single step in the automation graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier within the automation (referenced by successor lists).
    pub id: String,
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self { id: id.into(), kind }
    }

    /// The linear successor list. Condition nodes have none; they continue
    /// only through one of their branches.
    pub fn next(&self) -> &[String] {
        match &self.kind {
            NodeKind::Trigger(n) => &n.next,
            NodeKind::HttpRequest(n) => &n.next,
            NodeKind::Condition(_) => &[],
            NodeKind::SendEmail(n) => &n.next,
            NodeKind::SendWhatsapp(n) => &n.next,
            NodeKind::Delay(n) => &n.next,
            NodeKind::Transform(n) => &n.next,
            NodeKind::SendMassEmail(n) => &n.next,
            NodeKind::Contacts(n) => &n.next,
        }
    }

    /// Every id this node may hand control to, branches included.
    pub fn successors(&self) -> impl Iterator<Item = &String> {
        let (branch_true, branch_false): (&[String], &[String]) = match &self.kind {
            NodeKind::Condition(c) => (&c.true_next, &c.false_next),
            _ => (&[], &[]),
        };
        self.next().iter().chain(branch_true).chain(branch_false)
    }

    pub fn is_trigger(&self) -> bool {
        matches!(self.kind, NodeKind::Trigger(_))
    }
}

// ---------------------------------------------------------------------------
// NodeKind
// ---------------------------------------------------------------------------

/// Closed set of node kinds, tagged by `type` in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Trigger(TriggerNode),
    HttpRequest(HttpRequestNode),
    Condition(ConditionNode),
    SendEmail(SendEmailNode),
    #[serde(rename = "send_whatsapp")]
    SendWhatsapp(SendWhatsappNode),
    Delay(DelayNode),
    Transform(TransformNode),
    SendMassEmail(SendMassEmailNode),
    Contacts(ContactsNode),
}

impl NodeKind {
    /// The wire name of the kind, as used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Trigger(_) => "trigger",
            Self::HttpRequest(_) => "http_request",
            Self::Condition(_) => "condition",
            Self::SendEmail(_) => "send_email",
            Self::SendWhatsapp(_) => "send_whatsapp",
            Self::Delay(_) => "delay",
            Self::Transform(_) => "transform",
            Self::SendMassEmail(_) => "send_mass_email",
            Self::Contacts(_) => "contacts",
        }
    }
}

/// Entry point of a run. Carries no behaviour of its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerNode {
    /// Informational: `webhook`, `manual`, `schedule`, …
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_type: Option<String>,
    #[serde(default)]
    pub next: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequestNode {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default)]
    pub next: Vec<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

/// Comparison applied by a condition node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    Gt,
    Lt,
    Exists,
    /// Anything the editor sent that we do not understand; always false.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Dotted path into the data bag.
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionNode {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub true_next: Vec<String>,
    #[serde(default)]
    pub false_next: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailNode {
    pub to: String,
    pub subject: String,
    pub email_body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default)]
    pub next: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendWhatsappNode {
    pub to: String,
    pub message: String,
    #[serde(default)]
    pub next: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayNode {
    pub delay_minutes: u64,
    #[serde(default)]
    pub next: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transformation {
    pub expression: String,
    /// Dotted path the result is written to.
    pub output_field: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformNode {
    #[serde(default)]
    pub transformations: Vec<Transformation>,
    #[serde(default)]
    pub next: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMassEmailNode {
    pub list_id: Uuid,
    pub subject: String,
    pub email_body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default)]
    pub next: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactAction {
    Create,
    Update,
    Delete,
    Find,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactsNode {
    pub action: ContactAction,
    /// Property key → value; string values are template-substituted.
    #[serde(default)]
    pub properties: serde_json::Map<String, Value>,
    #[serde(default)]
    pub next: Vec<String>,
}
