//! Executor tuning knobs.

use std::time::Duration;

use nodes::http::HTTP_TIMEOUT;
use nodes::mass_email::MASS_EMAIL_BATCH_SIZE;
use nodes::traits::DEFAULT_FROM_ADDRESS;
use nodes::Services;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Timeout applied to every `http_request` node call.
    pub http_timeout: Duration,
    /// Concurrent sends per `send_mass_email` batch.
    pub mass_email_batch_size: usize,
    /// Sender used when an email node has no `from`.
    pub default_from: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            http_timeout: HTTP_TIMEOUT,
            mass_email_batch_size: MASS_EMAIL_BATCH_SIZE,
            default_from: DEFAULT_FROM_ADDRESS.to_string(),
        }
    }
}

impl ExecutorConfig {
    pub fn with_default_from(mut self, from: impl Into<String>) -> Self {
        self.default_from = from.into();
        self
    }

    /// Stamp these settings onto a collaborator bundle.
    pub fn apply(&self, mut services: Services) -> Services {
        services.http_timeout = self.http_timeout;
        services.mass_email_batch_size = self.mass_email_batch_size.max(1);
        services.default_from = self.default_from.clone();
        services
    }
}
