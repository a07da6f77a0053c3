//! Core logic for Peaker
//!
//! Loads the configuration, drives the polling schedule and turns newly
//! arrived mail into notifications.

pub mod config;
mod error;
mod outbox;
mod reader;
pub mod scheduler;
pub mod template;
mod watch;

pub use config::{AccountConfig, Config, ConfigError, ServerConfig};
pub use error::{CoreError, CoreResult};
pub use outbox::{Outbox, SmtpOutbox};
pub use reader::{ImapReader, MailboxReader, MailboxSnapshot};
pub use scheduler::{Scheduler, Stop, Tick};
pub use template::{Binding, Rendered, Template, TemplateError};
pub use watch::{Watcher, READ_TIMEOUT};
