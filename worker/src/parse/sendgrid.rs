//! SendGrid inbound parse webhook parsing.
//!
//! SendGrid posts each text field in whatever charset the original message
//! used and declares the charsets in an accompanying JSON map, so every
//! field goes through charset-aware decoding before use. Address fields are
//! RFC-2822-ish lists and are reduced to bare addresses.

use std::collections::HashMap;

use encoding_rs::Encoding;
use tracing::debug;

use crate::email::CanonicalEmail;
use crate::error::ParseError;
use crate::parse::address::extract_addresses;
use crate::parse::attachments::{attach_uploads, UploadName};
use crate::parse::RequestParser;
use crate::request::InboundRequest;

/// Parser for SendGrid's inbound parse webhook.
#[derive(Debug, Clone)]
pub struct SendGridParser {
    max_attachment_size: u64,
}

impl SendGridParser {
    pub fn new(max_attachment_size: u64) -> Self {
        Self {
            max_attachment_size,
        }
    }
}

impl RequestParser for SendGridParser {
    fn parse(&self, request: &InboundRequest) -> Result<Vec<CanonicalEmail>, ParseError> {
        let charsets = field_charsets(request)?;

        let raw_from = decode_field(request, "from", None, &charsets)?;
        // the from field never yields a list; the first extracted address
        // wins, and extraction already guarantees it contains an '@'
        let from_address = extract_addresses(&raw_from).into_iter().next().ok_or_else(|| {
            ParseError::Request(format!(
                "inbound request lacks a valid from address: {raw_from}"
            ))
        })?;

        let to_addresses = extract_addresses(&decode_field(request, "to", None, &charsets)?);
        let cc_addresses =
            extract_addresses(&decode_field(request, "cc", Some(""), &charsets)?);
        let bcc_addresses =
            extract_addresses(&decode_field(request, "bcc", Some(""), &charsets)?);

        let subject = decode_field(request, "subject", None, &charsets)?;
        let body_text = decode_field(request, "text", Some(""), &charsets)?;
        let html = decode_field(request, "html", Some(""), &charsets)?;

        let mut email = CanonicalEmail {
            subject,
            body_text,
            from_address,
            to_addresses,
            cc_addresses,
            bcc_addresses,
            ..Default::default()
        };
        email.attach_alternative(html);

        let email = attach_uploads(
            email,
            request.files(),
            self.max_attachment_size,
            UploadName::File,
        )?;

        debug!(
            to = ?email.to_addresses,
            attachments = email.attachments.len(),
            "sendgrid_parsed"
        );

        Ok(vec![email])
    }
}

/// The `charsets` field maps the other field names to the charset each one
/// was posted in.
fn field_charsets(request: &InboundRequest) -> Result<HashMap<String, String>, ParseError> {
    match request.field_raw("charsets") {
        Some(raw) => serde_json::from_slice(raw)
            .map_err(|e| ParseError::Request(format!("invalid charsets field: {e}"))),
        None => Ok(HashMap::new()),
    }
}

/// Decode a posted field using its declared charset (UTF-8 when the map is
/// silent). `default` marks the field optional.
fn decode_field(
    request: &InboundRequest,
    name: &str,
    default: Option<&str>,
    charsets: &HashMap<String, String>,
) -> Result<String, ParseError> {
    let raw = match request.field_raw(name) {
        Some(raw) => raw,
        None => {
            return default
                .map(str::to_string)
                .ok_or_else(|| ParseError::missing(name))
        }
    };

    let label = charsets.get(name).map(String::as_str).unwrap_or("utf-8");
    if label.eq_ignore_ascii_case("utf-8") {
        return Ok(String::from_utf8_lossy(raw).into_owned());
    }

    debug!(field = name, charset = label, "sendgrid_field_charset");
    let encoding = Encoding::for_label(label.as_bytes()).ok_or_else(|| {
        ParseError::Request(format!("field {name} declares an unknown charset: {label}"))
    })?;
    let (decoded, _, _) = encoding.decode(raw);
    Ok(decoded.into_owned())
}
