//! IMAP mailbox reading for Peaker
//!
//! Connects to an IMAP server over TLS, lists mailboxes and fetches the
//! envelopes of the most recent messages in a mailbox.

mod client;
mod error;
mod folder;
mod message;

pub use client::{ImapClient, RECENT_WINDOW};
pub use error::{ImapError, ImapResult};
pub use folder::Folder;
pub use message::{decode_header_value, EmailAddress, Envelope, MessageHeader};
