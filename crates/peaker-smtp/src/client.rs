//! SMTP client implementation

use crate::{SmtpError, SmtpResult};
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::{Credentials, Mechanism},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{debug, info};

/// Port on which SMTP is spoken over implicit TLS instead of STARTTLS
pub const SMTPS_PORT: u16 = 465;

/// Notification message to send
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    /// From address
    pub from: String,
    /// From display name
    pub from_name: Option<String>,
    /// To addresses
    pub to: Vec<String>,
    /// Subject line
    pub subject: String,
    /// Plain text body
    pub text_body: String,
}

impl OutgoingMessage {
    /// Create a new message builder
    pub fn new(from: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            from_name: None,
            to: Vec::new(),
            subject: subject.into(),
            text_body: String::new(),
        }
    }

    /// Set the from display name
    pub fn from_name(mut self, name: impl Into<String>) -> Self {
        self.from_name = Some(name.into());
        self
    }

    /// Add a To recipient
    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.to.push(address.into());
        self
    }

    /// Set the plain text body
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.text_body = body.into();
        self
    }
}

/// SMTP client for sending notifications
#[derive(Debug, Clone)]
pub struct SmtpClient {
    host: String,
    port: u16,
}

impl SmtpClient {
    /// Create a new SMTP client
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Send a message using password authentication
    pub async fn send_password(
        &self,
        email: &str,
        password: &str,
        message: OutgoingMessage,
    ) -> SmtpResult<()> {
        info!("Sending email via SMTP to {}:{}", self.host, self.port);

        let lettre_message = build_lettre_message(&message)?;

        let builder = if self.port == SMTPS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)
        }
        .map_err(|e| SmtpError::ConnectionFailed(e.to_string()))?;

        let transport = builder
            .port(self.port)
            .credentials(Credentials::new(email.to_string(), password.to_string()))
            .authentication(vec![Mechanism::Plain, Mechanism::Login])
            .build();

        transport.send(lettre_message).await.map_err(|e| {
            if e.is_permanent() {
                SmtpError::Rejected(e.to_string())
            } else {
                SmtpError::SendFailed(e.to_string())
            }
        })?;

        debug!("Email sent successfully");
        Ok(())
    }
}

fn parse_mailbox(name: Option<&String>, address: &str) -> SmtpResult<Mailbox> {
    let address = address
        .parse()
        .map_err(|e| SmtpError::InvalidAddress(format!("{}: {}", address, e)))?;
    Ok(Mailbox::new(name.cloned(), address))
}

/// Build a lettre Message from OutgoingMessage
pub fn build_lettre_message(msg: &OutgoingMessage) -> SmtpResult<Message> {
    let mut builder = Message::builder()
        .from(parse_mailbox(msg.from_name.as_ref(), &msg.from)?)
        .subject(&msg.subject);

    for to in &msg.to {
        builder = builder.to(parse_mailbox(None, to)?);
    }

    builder
        .header(ContentType::TEXT_PLAIN)
        .body(msg.text_body.clone())
        .map_err(|e| SmtpError::MessageBuildError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification() -> OutgoingMessage {
        OutgoingMessage::new("hey@example.com", "New mail on hey@example.com")
            .from_name("Peaker")
            .to("me@example.org")
            .text("Hey you've got a new mail from hello@some.one")
    }

    #[test]
    fn test_build_plain_text_message() {
        let message = build_lettre_message(&notification()).unwrap();
        let formatted = String::from_utf8(message.formatted()).unwrap();

        assert!(formatted.contains("Subject: New mail on hey@example.com"));
        assert!(formatted.contains("To: me@example.org"));
        assert!(formatted.contains("hey@example.com"));
        assert!(formatted.contains("text/plain"));
        assert!(formatted.contains("Hey you've got a new mail from hello@some.one"));
    }

    #[test]
    fn test_invalid_addresses() {
        let mut message = notification();
        message.to = vec!["not an address".into()];
        let err = build_lettre_message(&message).unwrap_err();
        assert!(matches!(err, SmtpError::InvalidAddress(_)));
        assert!(err.is_permanent());

        let mut message = notification();
        message.from = "broken@".into();
        assert!(matches!(
            build_lettre_message(&message),
            Err(SmtpError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_missing_recipient() {
        let mut message = notification();
        message.to.clear();
        assert!(matches!(
            build_lettre_message(&message),
            Err(SmtpError::MessageBuildError(_))
        ));
    }
}
