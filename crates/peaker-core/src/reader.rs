//! Reading recent mail from an account's mailboxes

use async_trait::async_trait;
use peaker_imap::{ImapClient, ImapResult, MessageHeader, RECENT_WINDOW};
use tracing::{debug, warn};

use crate::ServerConfig;

/// Newest messages of one mailbox
#[derive(Debug, Clone)]
pub struct MailboxSnapshot {
    /// Mailbox name as configured
    pub mailbox: String,
    /// UIDVALIDITY reported on SELECT
    pub uid_validity: Option<u32>,
    /// Headers of the newest messages
    pub messages: Vec<MessageHeader>,
}

/// Source of mailbox snapshots
#[async_trait]
pub trait MailboxReader: Send + Sync {
    /// Fetch one snapshot per mailbox in `mailboxes` that exists on the
    /// server, in the given order.
    async fn read(&self, server: &ServerConfig, mailboxes: &[String])
        -> ImapResult<Vec<MailboxSnapshot>>;
}

/// [`MailboxReader`] talking IMAP over implicit TLS
#[derive(Debug, Clone)]
pub struct ImapReader {
    window: u32,
}

impl ImapReader {
    /// Create a reader fetching [`RECENT_WINDOW`] messages per mailbox
    pub fn new() -> Self {
        Self {
            window: RECENT_WINDOW,
        }
    }
}

impl Default for ImapReader {
    fn default() -> Self {
        Self::new()
    }
}

async fn read_mailboxes(
    client: &mut ImapClient,
    mailboxes: &[String],
    window: u32,
) -> ImapResult<Vec<MailboxSnapshot>> {
    let folders = client.list_folders().await?;
    debug!(
        "Server lists mailboxes: {:?}",
        folders.iter().map(|f| f.full_path.as_str()).collect::<Vec<_>>()
    );

    let mut snapshots = Vec::with_capacity(mailboxes.len());
    for mailbox in mailboxes {
        let listed = folders
            .iter()
            .any(|folder| folder.matches(mailbox) && folder.is_selectable());
        if !listed {
            warn!(mailbox = %mailbox, "Mailbox is not on the server, skipping");
            continue;
        }

        let folder = client.select_folder(mailbox).await?;
        let messages = client
            .fetch_recent(folder.message_count.unwrap_or(0), window)
            .await?;

        snapshots.push(MailboxSnapshot {
            mailbox: mailbox.clone(),
            uid_validity: folder.uidvalidity,
            messages,
        });
    }

    Ok(snapshots)
}

#[async_trait]
impl MailboxReader for ImapReader {
    async fn read(
        &self,
        server: &ServerConfig,
        mailboxes: &[String],
    ) -> ImapResult<Vec<MailboxSnapshot>> {
        let mut client = ImapClient::new(&server.host, server.port);
        client
            .authenticate_login(&server.email, &server.password)
            .await?;

        let result = read_mailboxes(&mut client, mailboxes, self.window).await;

        if let Err(e) = client.logout().await {
            debug!("Logout from {} failed: {}", server.host, e);
        }

        result
    }
}
