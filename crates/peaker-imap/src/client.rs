//! IMAP client implementation

use crate::message::{decode_header_value, EmailAddress, Envelope};
use crate::{Folder, ImapError, ImapResult, MessageHeader};
use async_imap::types::Flag;
use async_imap::Session;
use async_native_tls::TlsStream;
use async_std::net::TcpStream;
use futures::TryStreamExt;
use tracing::{debug, info};

// Type alias for our TLS stream
type ImapStream = TlsStream<TcpStream>;

/// How many of the newest messages are fetched per mailbox
pub const RECENT_WINDOW: u32 = 40;

/// IMAP client for reading mailboxes
pub struct ImapClient {
    session: Option<Session<ImapStream>>,
    host: String,
    port: u16,
}

impl ImapClient {
    /// Create a new IMAP client
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            session: None,
            host: host.into(),
            port,
        }
    }

    /// Open the TCP connection and perform the TLS handshake
    async fn open_tls(&self) -> ImapResult<ImapStream> {
        info!("Connecting to {}:{}", self.host, self.port);

        let tcp_stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| ImapError::ConnectionFailed(e.to_string()))?;

        let tls_connector = async_native_tls::TlsConnector::new();
        let tls_stream = tls_connector
            .connect(&self.host, tcp_stream)
            .await
            .map_err(|e| ImapError::TlsError(e.to_string()))?;

        debug!("TLS connection established");
        Ok(tls_stream)
    }

    /// Connect and authenticate using LOGIN (username/password)
    pub async fn authenticate_login(&mut self, username: &str, password: &str) -> ImapResult<()> {
        let tls_stream = self.open_tls().await?;
        let client = async_imap::Client::new(tls_stream);

        info!("Authenticating with LOGIN for {}", username);

        let session = client
            .login(username, password)
            .await
            .map_err(|(e, _)| ImapError::AuthenticationFailed(e.to_string()))?;

        self.session = Some(session);
        debug!("LOGIN authentication successful");
        Ok(())
    }

    /// Get the session, returning an error if not connected
    fn session_mut(&mut self) -> ImapResult<&mut Session<ImapStream>> {
        self.session.as_mut().ok_or(ImapError::NotConnected)
    }

    /// List all folders/mailboxes
    pub async fn list_folders(&mut self) -> ImapResult<Vec<Folder>> {
        let session = self.session_mut()?;

        let mut stream = session
            .list(Some(""), Some("*"))
            .await
            .map_err(|e| ImapError::ServerError(e.to_string()))?;

        let mut folders = Vec::new();
        while let Some(mailbox) = stream
            .try_next()
            .await
            .map_err(|e| ImapError::ServerError(e.to_string()))?
        {
            let attributes: Vec<String> = mailbox
                .attributes()
                .iter()
                .map(|a| format!("{:?}", a))
                .collect();

            folders.push(Folder::new(mailbox.name().to_string(), attributes));
        }

        debug!("Found {} folders", folders.len());
        Ok(folders)
    }

    /// Select a folder and get its status
    pub async fn select_folder(&mut self, folder_path: &str) -> ImapResult<Folder> {
        let session = self.session_mut()?;

        let mailbox = session
            .select(folder_path)
            .await
            .map_err(|e| ImapError::FolderNotFound(format!("{}: {}", folder_path, e)))?;

        let mut folder = Folder::new(folder_path.to_string(), Vec::new());
        folder.uidvalidity = mailbox.uid_validity;
        folder.message_count = Some(mailbox.exists);

        debug!(
            "Selected folder {} with {} messages",
            folder_path, mailbox.exists
        );

        Ok(folder)
    }

    /// Fetch the headers of the newest `window` messages of the selected
    /// folder, which holds `exists` messages.
    pub async fn fetch_recent(&mut self, exists: u32, window: u32) -> ImapResult<Vec<MessageHeader>> {
        let Some((first, last)) = recent_range(exists, window) else {
            return Ok(Vec::new());
        };
        let range = format!("{}:{}", first, last);

        let session = self.session_mut()?;
        let mut stream = session
            .fetch(&range, "(UID FLAGS ENVELOPE)")
            .await
            .map_err(|e| ImapError::ServerError(e.to_string()))?;

        let mut messages = Vec::new();
        while let Some(fetch) = stream
            .try_next()
            .await
            .map_err(|e| ImapError::ParseError(e.to_string()))?
        {
            let uid = fetch.uid.ok_or_else(|| {
                ImapError::ParseError("Missing UID in FETCH response".to_string())
            })?;

            let envelope = fetch.envelope().map(|env| Envelope {
                subject: env.subject.as_ref().map(|s| decode_header_value(s)),
                from: parse_addresses(env.from.as_ref()),
                date: env
                    .date
                    .as_ref()
                    .map(|s| String::from_utf8_lossy(s).to_string()),
            });

            let seen = fetch.flags().any(|flag| matches!(flag, Flag::Seen));

            messages.push(MessageHeader {
                uid,
                envelope: envelope.unwrap_or_default(),
                seen,
            });
        }

        debug!("Fetched {} message headers from {}", messages.len(), range);
        Ok(messages)
    }

    /// Close the connection
    pub async fn logout(&mut self) -> ImapResult<()> {
        if let Some(mut session) = self.session.take() {
            session
                .logout()
                .await
                .map_err(|e| ImapError::ServerError(e.to_string()))?;
        }
        Ok(())
    }
}

fn parse_addresses(addrs: Option<&Vec<imap_proto::types::Address<'_>>>) -> Vec<EmailAddress> {
    addrs
        .map(|v| {
            v.iter()
                .map(|a| {
                    let mailbox = a
                        .mailbox
                        .as_ref()
                        .map(|s| String::from_utf8_lossy(s).to_string())
                        .unwrap_or_default();
                    let host = a
                        .host
                        .as_ref()
                        .map(|s| String::from_utf8_lossy(s).to_string())
                        .unwrap_or_default();
                    let name = a.name.as_ref().map(|s| decode_header_value(s));
                    EmailAddress::new(name, format!("{}@{}", mailbox, host))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Sequence numbers of the newest `window` messages in a mailbox holding
/// `exists` messages, or `None` when there is nothing to fetch.
fn recent_range(exists: u32, window: u32) -> Option<(u32, u32)> {
    if exists == 0 || window == 0 {
        return None;
    }
    Some((exists.saturating_sub(window - 1).max(1), exists))
}
