//! SMTP implementation for Peaker
//!
//! Sends plain-text notification mails through the outbound account.

mod client;
mod error;

pub use client::{build_lettre_message, OutgoingMessage, SmtpClient, SMTPS_PORT};
pub use error::{SmtpError, SmtpResult};
