pub mod automations;
pub mod executions;
pub mod webhooks;
