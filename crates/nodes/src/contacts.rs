//! Contacts node: mutate the contact store from inside a run.
//!
//! Only `create` is wired up; `update`, `delete` and `find` are accepted by
//! the editor but are no-ops here.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::definition::{ContactAction, ContactsNode};
use crate::template::replace_in_value;
use crate::traits::{ExecutableNode, NewContact, Property, Services};
use crate::{ExecutionContext, LogLevel, NodeError};

/// `source` recorded on contacts created by automations.
pub const AUTOMATION_SOURCE: &str = "automation";

impl ContactsNode {
    async fn create(&self, ctx: &mut ExecutionContext, services: &Services) -> Result<(), NodeError> {
        let properties: Vec<Property> = self
            .properties
            .iter()
            .map(|(key, value)| Property {
                key: key.clone(),
                value: replace_in_value(value, &ctx.data),
            })
            .collect();

        let result = services
            .contacts
            .create(NewContact {
                organization_id: ctx.organization_id,
                properties,
                source: AUTOMATION_SOURCE.to_string(),
            })
            .await;

        match result {
            Ok(contact) => {
                ctx.log(LogLevel::Info, "contact_created", format!("Created contact {}", contact.id));
                let value = serde_json::to_value(&contact).unwrap_or(Value::Null);
                ctx.insert("contact", value);
                Ok(())
            }
            Err(e) => {
                ctx.insert(
                    "error",
                    json!({
                        "node": "contacts",
                        "action": "create",
                        "message": e.to_string(),
                    }),
                );
                Err(e)
            }
        }
    }
}

#[async_trait]
impl ExecutableNode for ContactsNode {
    async fn execute(&self, ctx: &mut ExecutionContext, services: &Services) -> Result<(), NodeError> {
        match self.action {
            ContactAction::Create => self.create(ctx, services).await,
            ContactAction::Update | ContactAction::Delete | ContactAction::Find => {
                ctx.log(
                    LogLevel::Info,
                    "contact_action_skipped",
                    format!("Contact action {:?} is not supported yet", self.action),
                );
                Ok(())
            }
        }
    }
}
