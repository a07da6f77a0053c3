//! IMAP mailbox listing types

/// Represents an IMAP folder/mailbox
#[derive(Debug, Clone)]
pub struct Folder {
    /// Full path including hierarchy delimiter
    pub full_path: String,
    /// Mailbox attributes from LIST
    pub attributes: Vec<String>,
    /// UIDVALIDITY value, known after SELECT
    pub uidvalidity: Option<u32>,
    /// Number of messages, known after SELECT
    pub message_count: Option<u32>,
}

impl Folder {
    /// Create a new folder from an IMAP LIST response
    pub fn new(full_path: String, attributes: Vec<String>) -> Self {
        Self {
            full_path,
            attributes,
            uidvalidity: None,
            message_count: None,
        }
    }

    /// Check if this folder can be selected
    pub fn is_selectable(&self) -> bool {
        !self.attributes.iter().any(|a| {
            let lower = a.to_lowercase();
            lower.contains("noselect") || lower.contains("nonexistent")
        })
    }

    /// Check whether this folder is the one a configured mailbox name refers to.
    ///
    /// `INBOX` is case-insensitive (RFC 3501, section 5.1), every other name
    /// is compared verbatim.
    pub fn matches(&self, mailbox: &str) -> bool {
        if self.full_path.eq_ignore_ascii_case("INBOX") {
            return mailbox.eq_ignore_ascii_case("INBOX");
        }
        self.full_path == mailbox
    }
}
