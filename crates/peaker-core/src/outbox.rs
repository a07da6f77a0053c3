//! Delivery of rendered notifications

use async_trait::async_trait;
use peaker_smtp::{OutgoingMessage, SmtpClient, SmtpResult};

use crate::ServerConfig;

/// Where notifications are delivered
#[async_trait]
pub trait Outbox: Send + Sync {
    /// Deliver one message
    async fn send(&self, message: OutgoingMessage) -> SmtpResult<()>;
}

/// [`Outbox`] sending through the outbound SMTP account
#[derive(Debug, Clone)]
pub struct SmtpOutbox {
    client: SmtpClient,
    server: ServerConfig,
}

impl SmtpOutbox {
    /// Create an outbox logging in to `server` with its credentials
    pub fn new(server: ServerConfig) -> Self {
        Self {
            client: SmtpClient::new(&server.host, server.port),
            server,
        }
    }
}

#[async_trait]
impl Outbox for SmtpOutbox {
    async fn send(&self, message: OutgoingMessage) -> SmtpResult<()> {
        self.client
            .send_password(&self.server.email, &self.server.password, message)
            .await
    }
}
