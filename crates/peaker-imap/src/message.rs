//! IMAP message types

use mail_parser::MessageParser;

/// Email address with optional display name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAddress {
    /// Display name (e.g., "John Doe")
    pub name: Option<String>,
    /// Email address (e.g., "john@example.com")
    pub address: String,
}

impl EmailAddress {
    pub fn new(name: Option<String>, address: String) -> Self {
        Self { name, address }
    }

    /// Format as "Name <address>" or just "address"
    pub fn to_display_string(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => format!("{} <{}>", name, self.address),
            _ => self.address.clone(),
        }
    }
}

/// Envelope data from IMAP FETCH
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    /// Subject line, decoded
    pub subject: Option<String>,
    /// From addresses
    pub from: Vec<EmailAddress>,
    /// Date header as sent
    pub date: Option<String>,
}

/// Message header information from IMAP
#[derive(Debug, Clone)]
pub struct MessageHeader {
    /// Server-assigned UID
    pub uid: u32,
    /// Envelope data
    pub envelope: Envelope,
    /// Whether the `\Seen` flag is set
    pub seen: bool,
}

impl MessageHeader {
    /// Get the subject, with a default for empty
    pub fn subject(&self) -> &str {
        match self.envelope.subject.as_deref() {
            Some(subject) if !subject.is_empty() => subject,
            _ => "(No subject)",
        }
    }

    /// Get the primary sender's display string
    pub fn from_display(&self) -> String {
        self.envelope
            .from
            .first()
            .map(|a| a.to_display_string())
            .unwrap_or_else(|| "(Unknown sender)".to_string())
    }

    /// Check if message is read
    pub fn is_read(&self) -> bool {
        self.seen
    }
}

/// Decode a raw envelope header value, resolving RFC 2047 encoded words.
///
/// Falls back to a lossy UTF-8 conversion when the value cannot be parsed.
pub fn decode_header_value(raw: &[u8]) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let mut header = Vec::with_capacity(raw.len() + 13);
    header.extend_from_slice(b"Subject: ");
    header.extend_from_slice(raw);
    header.extend_from_slice(b"\r\n\r\n");

    MessageParser::default()
        .parse(&header)
        .and_then(|message| message.subject().map(str::to_string))
        .unwrap_or_else(|| String::from_utf8_lossy(raw).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_encoded_words() {
        assert_eq!(
            decode_header_value(b"=?UTF-8?B?SGVsbG8gV29ybGQ=?="),
            "Hello World"
        );
        assert_eq!(decode_header_value(b"=?utf-8?q?caf=C3=A9?="), "caf\u{e9}");
        assert_eq!(decode_header_value(b"Plain subject"), "Plain subject");
        assert_eq!(decode_header_value(b""), "");
    }

    #[test]
    fn test_header_fallbacks() {
        let header = MessageHeader {
            uid: 7,
            envelope: Envelope::default(),
            seen: false,
        };
        assert_eq!(header.subject(), "(No subject)");
        assert_eq!(header.from_display(), "(Unknown sender)");
        assert!(!header.is_read());

        let header = MessageHeader {
            envelope: Envelope {
                subject: Some("Lunch?".into()),
                from: vec![EmailAddress::new(
                    Some("Some One".into()),
                    "hello@some.one".into(),
                )],
                ..Envelope::default()
            },
            ..header
        };
        assert_eq!(header.subject(), "Lunch?");
        assert_eq!(header.from_display(), "Some One <hello@some.one>");
    }
}
