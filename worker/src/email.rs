//! The canonical in-memory representation of a parsed inbound email.
//!
//! Every provider parser produces `CanonicalEmail` values; the notification
//! layer serializes them onto the queue unchanged.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single decoded attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub content: Vec<u8>,
    pub mime_type: String,
}

/// Provider-independent representation of one inbound email.
///
/// Built fresh per parse call (or per message for batch providers) and
/// handed straight to the notification step; the parsing core never retains
/// one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalEmail {
    #[serde(default)]
    pub subject: String,

    /// Plain-text body.
    #[serde(default)]
    pub body_text: String,

    /// HTML alternative; only set when the provider supplied non-empty HTML.
    /// Never replaces `body_text`.
    #[serde(default)]
    pub body_html: Option<String>,

    /// Canonical sender address, possibly in `"Name" <addr>` form.
    pub from_address: String,

    /// Recipients in order of appearance in the source payload.
    #[serde(default)]
    pub to_addresses: Vec<String>,

    #[serde(default)]
    pub cc_addresses: Vec<String>,

    #[serde(default)]
    pub bcc_addresses: Vec<String>,

    #[serde(default)]
    pub attachments: Vec<Attachment>,

    /// Extra provider-supplied headers (currently only `date`).
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
}

impl CanonicalEmail {
    /// Append an attachment.
    pub fn attach(
        &mut self,
        filename: impl Into<String>,
        content: Vec<u8>,
        mime_type: impl Into<String>,
    ) {
        self.attachments.push(Attachment {
            filename: filename.into(),
            content,
            mime_type: mime_type.into(),
        });
    }

    /// Record an HTML alternative. Empty strings are ignored so that a
    /// provider posting `html=""` yields a text-only email.
    pub fn attach_alternative(&mut self, html: impl Into<String>) {
        let html = html.into();
        if !html.is_empty() {
            self.body_html = Some(html);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_alternative_ignores_empty() {
        let mut email = CanonicalEmail::default();
        email.attach_alternative("");
        assert_eq!(email.body_html, None);

        email.attach_alternative("<p>hi</p>");
        assert_eq!(email.body_html, Some("<p>hi</p>".to_string()));
    }

    #[test]
    fn test_attach_preserves_order() {
        let mut email = CanonicalEmail::default();
        email.attach("a.txt", b"one".to_vec(), "text/plain");
        email.attach("b.txt", b"two".to_vec(), "text/plain");

        let names: Vec<&str> = email
            .attachments
            .iter()
            .map(|a| a.filename.as_str())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_serialization_round_trip() {
        let mut email = CanonicalEmail {
            subject: "Test".to_string(),
            body_text: "body".to_string(),
            from_address: "sender@example.com".to_string(),
            to_addresses: vec!["recipient@example.com".to_string()],
            ..Default::default()
        };
        email.attach("file.bin", vec![0, 1, 2], "application/octet-stream");
        email
            .extra_headers
            .insert("date".to_string(), "Thu, 13 Nov 2014 14:01:30 GMT".to_string());

        let json = serde_json::to_string(&email).unwrap();
        let parsed: CanonicalEmail = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, email);
    }
}
