//! Error types for SMTP operations

use thiserror::Error;

/// Result type for SMTP operations
pub type SmtpResult<T> = Result<T, SmtpError>;

/// Errors that can occur during SMTP operations
#[derive(Debug, Error)]
pub enum SmtpError {
    /// Connection failed
    #[error("Failed to connect to SMTP server: {0}")]
    ConnectionFailed(String),

    /// The server refused the message or the credentials with a permanent
    /// (5xx) reply
    #[error("SMTP server rejected the message: {0}")]
    Rejected(String),

    /// Failed to send message
    #[error("Failed to send message: {0}")]
    SendFailed(String),

    /// Invalid email address
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Message building error
    #[error("Failed to build message: {0}")]
    MessageBuildError(String),
}

impl SmtpError {
    /// Whether retrying the same message later is pointless
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            SmtpError::Rejected(_) | SmtpError::InvalidAddress(_) | SmtpError::MessageBuildError(_)
        )
    }
}
