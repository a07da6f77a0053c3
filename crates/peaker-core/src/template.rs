//! Notification templates
//!
//! A template is plain text with `{{.Field}}` placeholders. The first line of
//! the rendered text is the subject of the notification, the rest is its body.
//!
//! Identifiers starting with a letter name a bundled template (`en`, `de`),
//! anything else is a path to a template file.

use std::path::PathBuf;

use thiserror::Error;

const EN_TEMPLATE: &str = include_str!("../templates/en.tmpl");
const DE_TEMPLATE: &str = include_str!("../templates/de.tmpl");

/// Errors returned while resolving or parsing a template
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Empty template identifier
    #[error("template identifier is empty")]
    Empty,

    /// No bundled template with that name
    #[error("bundled template '{0}' not found")]
    NotFound(String),

    /// Template file could not be opened or read
    #[error("can't open template file '{}': {source}", .path.display())]
    Open {
        /// Path to the template file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Template text is malformed
    #[error("can't parse template '{name}': {reason}")]
    Parse {
        /// Template identifier
        name: String,
        /// What is wrong with it
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Account,
    Name,
    Mailbox,
    Email,
    Subject,
    Date,
}

impl Field {
    fn parse(name: &str) -> Option<Self> {
        [
            ("Account", Field::Account),
            ("Name", Field::Name),
            ("Mailbox", Field::Mailbox),
            ("Email", Field::Email),
            ("Subject", Field::Subject),
            ("Date", Field::Date),
        ]
        .into_iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, field)| field)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Field(Field),
}

/// Values available to a template
#[derive(Debug, Clone, Copy, Default)]
pub struct Binding<'a> {
    /// Email address of the watched account
    pub account: &'a str,
    /// Name of the watched account
    pub name: &'a str,
    /// Mailbox the mail arrived in
    pub mailbox: &'a str,
    /// Sender of the new mail
    pub email: &'a str,
    /// Subject of the new mail
    pub subject: &'a str,
    /// Date of the new mail
    pub date: &'a str,
}

impl Binding<'_> {
    fn get(&self, field: Field) -> &str {
        match field {
            Field::Account => self.account,
            Field::Name => self.name,
            Field::Mailbox => self.mailbox,
            Field::Email => self.email,
            Field::Subject => self.subject,
            Field::Date => self.date,
        }
    }
}

/// A rendered notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    /// Subject line
    pub subject: String,
    /// Body text
    pub body: String,
}

/// A parsed template
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    segments: Vec<Segment>,
}

/// Text of the bundled template called `name`
pub fn bundled(name: &str) -> Option<&'static str> {
    match name {
        "en" => Some(EN_TEMPLATE),
        "de" => Some(DE_TEMPLATE),
        _ => None,
    }
}

/// Find and parse the template an identifier refers to.
pub fn resolve(identifier: &str) -> Result<Template, TemplateError> {
    let first = identifier.chars().next().ok_or(TemplateError::Empty)?;

    if first.is_alphabetic() {
        let source =
            bundled(identifier).ok_or_else(|| TemplateError::NotFound(identifier.to_string()))?;
        return Template::parse(identifier, source);
    }

    let source = std::fs::read_to_string(identifier).map_err(|source| TemplateError::Open {
        path: PathBuf::from(identifier),
        source,
    })?;
    Template::parse(identifier, &source)
}

impl Template {
    /// Parse template text.
    pub fn parse(name: &str, source: &str) -> Result<Self, TemplateError> {
        let source = source.replace("\r\n", "\n");
        let parse_error = |reason: String| TemplateError::Parse {
            name: name.to_string(),
            reason,
        };

        let mut segments = Vec::new();
        let mut rest = source.as_str();

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Text(rest[..start].to_string()));
            }

            let action = &rest[start + 2..];
            let end = action
                .find("}}")
                .ok_or_else(|| parse_error("unclosed action, missing '}}'".to_string()))?;

            let field_name = action[..end].trim();
            let field_name = field_name.strip_prefix('.').unwrap_or(field_name).trim();
            let field = Field::parse(field_name)
                .ok_or_else(|| parse_error(format!("unknown field '{}'", field_name)))?;
            segments.push(Segment::Field(field));

            rest = &action[end + 2..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            segments,
        })
    }

    /// Identifier the template was resolved from
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render the template into a subject and body.
    pub fn render(&self, binding: &Binding<'_>) -> Rendered {
        let mut text = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(literal) => text.push_str(literal),
                Segment::Field(field) => text.push_str(binding.get(*field)),
            }
        }

        let (subject, body) = text.split_once('\n').unwrap_or((text.as_str(), ""));

        Rendered {
            subject: subject.trim().to_string(),
            body: body.trim_start_matches('\n').trim_end().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding() -> Binding<'static> {
        Binding {
            account: "hey@example.com",
            name: "example",
            mailbox: "INBOX",
            email: "hello@some.one",
            subject: "Lunch?",
            date: "Mon, 19 Oct 2026 12:00:00 +0000",
        }
    }

    #[test]
    fn test_bundled_templates() {
        for name in ["en", "de"] {
            let template = resolve(name).unwrap();
            assert_eq!(template.name(), name);

            let rendered = template.render(&binding());
            assert!(rendered.subject.contains("hey@example.com"));
            assert!(rendered.body.contains("hello@some.one"));
            assert!(rendered.body.contains("Lunch?"));
        }

        let rendered = resolve("en").unwrap().render(&binding());
        assert_eq!(rendered.subject, "New mail on hey@example.com");
    }

    #[test]
    fn test_unknown_bundled_template() {
        let err = resolve("xx").unwrap_err();
        assert!(matches!(err, TemplateError::NotFound(ref name) if name == "xx"));
        assert!(err.to_string().contains("not found"));

        assert!(matches!(resolve("gloryToArstotzka"), Err(TemplateError::NotFound(_))));
        assert!(matches!(resolve(""), Err(TemplateError::Empty)));
    }

    #[test]
    fn test_missing_file() {
        let err = resolve("./coolItDoesntExists").unwrap_err();
        assert!(matches!(err, TemplateError::Open { .. }));
        assert!(err.to_string().contains("can't open"));
    }

    #[test]
    fn test_file_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("correct.txt.tmpl");
        std::fs::write(
            &path,
            "New mail on {{.Account}}\r\n\r\nHey you've got a new mail from {{ .Email }}\r\n",
        )
        .unwrap();

        let template = resolve(path.to_str().unwrap()).unwrap();
        let rendered = template.render(&binding());
        assert_eq!(
            rendered,
            Rendered {
                subject: "New mail on hey@example.com".into(),
                body: "Hey you've got a new mail from hello@some.one".into(),
            }
        );
    }

    #[test]
    fn test_malformed_templates() {
        let err = Template::parse("wrong", "New mail on {{.Account").unwrap_err();
        assert!(matches!(err, TemplateError::Parse { .. }));

        let err = Template::parse("wrong", "{{.Nope}}").unwrap_err();
        assert!(err.to_string().contains("unknown field 'Nope'"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wrong.txt.tmpl");
        std::fs::write(&path, "Hi {{.Email}").unwrap();
        assert!(matches!(
            resolve(path.to_str().unwrap()),
            Err(TemplateError::Parse { .. })
        ));
    }

    #[test]
    fn test_subject_only_and_literal_braces() {
        let template = Template::parse("short", "Mail for {{name}} }} done").unwrap();
        let rendered = template.render(&binding());
        assert_eq!(rendered.subject, "Mail for example }} done");
        assert_eq!(rendered.body, "");
    }
}
