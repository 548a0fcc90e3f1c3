//! Mass-email node: one personalised email per member of a contact list.

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::{json, Value};

use crate::definition::SendMassEmailNode;
use crate::template::replace_template_variables;
use crate::traits::{Contact, EmailMessage, ExecutableNode, Services};
use crate::{ExecutionContext, LogLevel, NodeError};

/// Concurrent sends per batch.
pub const MASS_EMAIL_BATCH_SIZE: usize = 10;

/// Data-bag key the aggregate result is written to.
pub const MASS_EMAIL_RESULT_KEY: &str = "massEmailResult";

/// Substitute `{{contact.<key>}}` tokens with the recipient's own properties.
fn personalize(text: &str, contact: &Contact) -> String {
    replace_template_variables(text, &json!({ "contact": contact.property_bag() }))
}

fn email_of(contact: &Contact) -> Option<String> {
    match contact.property("email")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

#[async_trait]
impl ExecutableNode for SendMassEmailNode {
    async fn execute(&self, ctx: &mut ExecutionContext, services: &Services) -> Result<(), NodeError> {
        let list = services.lists.resolve(ctx.organization_id, self.list_id).await?;
        let contacts = services.contacts.find(ctx.organization_id, list.query.clone()).await?;

        let recipients: Vec<(&Contact, String)> = contacts
            .iter()
            .filter_map(|c| email_of(c).map(|email| (c, email)))
            .collect();

        ctx.log(
            LogLevel::Info,
            "mass_email_start",
            format!(
                "Sending to {} of {} contacts in list '{}'",
                recipients.len(),
                contacts.len(),
                list.name
            ),
        );

        // Global variables are resolved once. `contact` is reserved for the
        // per-recipient pass, even if an earlier node stored one in the bag.
        let mut globals = ctx.data.clone();
        if let Some(map) = globals.as_object_mut() {
            map.remove("contact");
        }
        let subject = replace_template_variables(&self.subject, &globals);
        let body = replace_template_variables(&self.email_body, &globals);
        let organization_id = ctx.organization_id;
        let from = self
            .from
            .clone()
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| services.default_from.clone());

        let mut success_count = 0usize;
        let mut error_count = 0usize;

        for batch in recipients.chunks(services.mass_email_batch_size.max(1)) {
            let sends = batch.iter().map(|(contact, email)| {
                let message = EmailMessage {
                    to: email.clone(),
                    subject: personalize(&subject, contact),
                    html: personalize(&body, contact),
                    from: from.clone(),
                    organization_id,
                };
                async move { (message.to.clone(), services.email.send_email(message).await) }
            });

            let results = join_all(sends).await;
            for (to, result) in results {
                match result {
                    Ok(()) => success_count += 1,
                    Err(e) => {
                        error_count += 1;
                        ctx.log(LogLevel::Warning, "mass_email_recipient_failed", format!("{to}: {e}"));
                    }
                }
            }
        }

        ctx.log(
            LogLevel::Info,
            "mass_email_done",
            format!("{success_count} sent, {error_count} failed"),
        );
        ctx.insert(
            MASS_EMAIL_RESULT_KEY,
            json!({
                "listId": list.id,
                "listName": list.name,
                "totalContacts": recipients.len(),
                "successCount": success_count,
                "errorCount": error_count,
            }),
        );

        Ok(())
    }
}
