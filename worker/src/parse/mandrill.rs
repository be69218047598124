//! Mandrill inbound webhook parsing.
//!
//! Mandrill batches messages: one request carries a `mandrill_events` field
//! holding a JSON array of event envelopes, and each `inbound` event yields
//! one canonical email. Correspondents arrive as structured
//! (address, name) pairs; attachments and inline images arrive as two JSON
//! maps keyed by identifier.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::email::CanonicalEmail;
use crate::error::ParseError;
use crate::parse::address::format_pair;
use crate::parse::attachments::{attach_inline, InlineAttachment};
use crate::parse::signature::check_signature;
use crate::parse::RequestParser;
use crate::request::InboundRequest;

/// Parser for Mandrill's inbound webhook.
#[derive(Debug, Clone)]
pub struct MandrillParser {
    max_attachment_size: u64,
    authentication_key: Option<String>,
}

impl MandrillParser {
    pub fn new(max_attachment_size: u64, authentication_key: Option<String>) -> Self {
        Self {
            max_attachment_size,
            authentication_key,
        }
    }

    fn build_email(&self, msg: InboundMessage) -> Result<CanonicalEmail, ParseError> {
        let from_email = msg
            .from_email
            .ok_or_else(|| ParseError::missing("from_email"))?;
        let to = msg.to.ok_or_else(|| ParseError::missing("to"))?;

        let mut email = CanonicalEmail {
            subject: msg.subject.unwrap_or_default(),
            body_text: msg.text.unwrap_or_default(),
            from_address: format_pair(&from_email, msg.from_name.as_deref()),
            to_addresses: recipients(&to),
            cc_addresses: msg.cc.as_deref().map(recipients).unwrap_or_default(),
            bcc_addresses: msg.bcc.as_deref().map(recipients).unwrap_or_default(),
            ..Default::default()
        };
        if let Some(html) = msg.html {
            email.attach_alternative(html);
        }

        // inline images are folded into the attachment map before
        // processing; on identifier collisions the image wins
        let mut merged = msg.attachments;
        for (key, value) in msg.images {
            merged.insert(key, value);
        }
        let items = merged
            .into_iter()
            .map(|(_, value)| InlineAttachment::from_value(value))
            .collect::<Result<Vec<_>, _>>()?;

        attach_inline(email, items, self.max_attachment_size)
    }
}

impl RequestParser for MandrillParser {
    fn parse(&self, request: &InboundRequest) -> Result<Vec<CanonicalEmail>, ParseError> {
        // authentication is opt-in; without a key the batch parses unsigned
        if let Some(key) = self.authentication_key.as_deref() {
            check_signature(request, key)?;
        }

        let raw = request
            .field("mandrill_events")
            .ok_or_else(|| ParseError::missing("mandrill_events"))?;
        let events: Vec<Value> = serde_json::from_str(&raw)
            .map_err(|e| ParseError::Request(format!("request is not valid json: {e}")))?;

        if events.is_empty() {
            debug!("mandrill_empty_batch");
            return Ok(Vec::new());
        }

        let mut emails = Vec::new();
        for event in events {
            if event.get("event").and_then(Value::as_str) != Some("inbound") {
                debug!("mandrill_discarding_non_inbound_event");
                continue;
            }

            let msg = event
                .get("msg")
                .cloned()
                .ok_or_else(|| ParseError::missing("msg"))?;
            let msg: InboundMessage = serde_json::from_value(msg).map_err(|e| {
                ParseError::Request(format!(
                    "inbound request is missing or got an invalid value: {e}"
                ))
            })?;

            emails.push(self.build_email(msg)?);
        }

        debug!(emails = emails.len(), "mandrill_parsed");
        Ok(emails)
    }
}

/// The `msg` object of one inbound event.
#[derive(Debug, Deserialize)]
struct InboundMessage {
    from_email: Option<String>,
    from_name: Option<String>,
    to: Option<Vec<(String, Option<String>)>>,
    cc: Option<Vec<(String, Option<String>)>>,
    bcc: Option<Vec<(String, Option<String>)>>,
    subject: Option<String>,
    text: Option<String>,
    html: Option<String>,
    #[serde(default)]
    attachments: serde_json::Map<String, Value>,
    #[serde(default)]
    images: serde_json::Map<String, Value>,
}

fn recipients(pairs: &[(String, Option<String>)]) -> Vec<String> {
    pairs
        .iter()
        .map(|(address, name)| format_pair(address, name.as_deref()))
        .collect()
}
