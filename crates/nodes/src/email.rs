//! Single-recipient messaging nodes: send_email and send_whatsapp.

use async_trait::async_trait;

use crate::definition::{SendEmailNode, SendWhatsappNode};
use crate::template::replace_template_variables;
use crate::traits::{EmailMessage, ExecutableNode, Services, WhatsAppMessage};
use crate::{ExecutionContext, LogLevel, NodeError};

#[async_trait]
impl ExecutableNode for SendEmailNode {
    async fn execute(&self, ctx: &mut ExecutionContext, services: &Services) -> Result<(), NodeError> {
        let message = EmailMessage {
            to: replace_template_variables(&self.to, &ctx.data),
            subject: replace_template_variables(&self.subject, &ctx.data),
            html: replace_template_variables(&self.email_body, &ctx.data),
            from: self
                .from
                .clone()
                .filter(|f| !f.trim().is_empty())
                .unwrap_or_else(|| services.default_from.clone()),
            organization_id: ctx.organization_id,
        };

        ctx.log(
            LogLevel::Info,
            "send_email",
            format!("Sending email to {} (subject: {})", message.to, message.subject),
        );
        let to = message.to.clone();
        services.email.send_email(message).await?;
        ctx.log(LogLevel::Info, "email_sent", format!("Email sent to {to}"));
        Ok(())
    }
}

#[async_trait]
impl ExecutableNode for SendWhatsappNode {
    async fn execute(&self, ctx: &mut ExecutionContext, services: &Services) -> Result<(), NodeError> {
        let message = WhatsAppMessage {
            to: replace_template_variables(&self.to, &ctx.data),
            message: replace_template_variables(&self.message, &ctx.data),
            organization_id: ctx.organization_id,
        };

        ctx.log(LogLevel::Info, "send_whatsapp", format!("Sending WhatsApp message to {}", message.to));
        let to = message.to.clone();
        services.whatsapp.send_message(message).await?;
        ctx.log(LogLevel::Info, "whatsapp_sent", format!("WhatsApp message sent to {to}"));
        Ok(())
    }
}
