//! Attachment decoding and the size ceiling.
//!
//! Two delivery shapes exist: real multipart file uploads (Mailgun,
//! SendGrid) and inline JSON blobs that may or may not be base64 encoded
//! (Mandrill). Both funnel into `CanonicalEmail::attach`, and both abort the
//! whole parse when an attachment exceeds the configured ceiling.

use base64::engine::general_purpose::GeneralPurpose;
use base64::engine::GeneralPurposeConfig;
use base64::{alphabet, Engine};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::email::CanonicalEmail;
use crate::error::ParseError;
use crate::request::UploadedFile;

/// Decoder tolerant of non-canonical trailing bits, matching how providers
/// actually encode attachment payloads.
const PERMISSIVE_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// How a streamed upload is named when attached.
#[derive(Debug, Clone, Copy)]
pub enum UploadName {
    /// The multipart form-field name (Mailgun convention).
    Field,
    /// The client-supplied filename (SendGrid convention).
    File,
}

/// Attach every uploaded file on the request to `email`.
///
/// The declared size is checked against the ceiling before the contents are
/// read; an oversized upload aborts the parse, carrying the partially built
/// email for diagnostics.
pub fn attach_uploads(
    mut email: CanonicalEmail,
    files: &[UploadedFile],
    max_size: u64,
    naming: UploadName,
) -> Result<CanonicalEmail, ParseError> {
    for file in files {
        if file.size > max_size {
            debug!(
                filename = %file.file_name,
                size = file.size,
                "attachment_too_large"
            );
            return Err(ParseError::AttachmentTooLarge {
                email: Box::new(email),
                filename: file.file_name.clone(),
                size: file.size,
            });
        }

        let filename = match naming {
            UploadName::Field => &file.field_name,
            UploadName::File => &file.file_name,
        };
        email.attach(filename.clone(), file.read().to_vec(), file.content_type.clone());
    }
    Ok(email)
}

/// One inline attachment or image from a JSON payload.
#[derive(Debug, Clone, Deserialize)]
pub struct InlineAttachment {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub mime_type: Option<String>,
    pub content: Option<String>,
    #[serde(default)]
    pub base64: Option<bool>,
}

impl InlineAttachment {
    /// Deserialize a JSON object into an inline attachment.
    pub fn from_value(value: Value) -> Result<Self, ParseError> {
        serde_json::from_value(value).map_err(|e| {
            ParseError::Request(format!(
                "inbound request is missing or got an invalid value: {e}"
            ))
        })
    }
}

/// Decode inline attachments and attach them to `email`.
///
/// Content is base64-decoded when the flag says so, or when it merely looks
/// base64 encoded; providers sometimes encode without setting the flag. The
/// ceiling applies to the decoded length. Entries missing a name, MIME type,
/// or content are skipped.
pub fn attach_inline(
    mut email: CanonicalEmail,
    items: impl IntoIterator<Item = InlineAttachment>,
    max_size: u64,
) -> Result<CanonicalEmail, ParseError> {
    for item in items {
        let name = item.name.unwrap_or_default();
        let mime_type = item.mime_type.unwrap_or_default();
        let raw = item.content.unwrap_or_default();

        let content = if item.base64.unwrap_or(false) {
            PERMISSIVE_BASE64.decode(raw.as_bytes()).map_err(|e| {
                ParseError::Request(format!(
                    "attachment {name} declares base64 content that does not decode: {e}"
                ))
            })?
        } else if looks_like_base64(&raw) {
            // the sniff can be wrong; fall back to the literal bytes
            PERMISSIVE_BASE64
                .decode(raw.as_bytes())
                .unwrap_or_else(|_| raw.clone().into_bytes())
        } else {
            raw.clone().into_bytes()
        };

        if content.len() as u64 > max_size {
            debug!(filename = %name, size = content.len(), "attachment_too_large");
            return Err(ParseError::AttachmentTooLarge {
                email: Box::new(email),
                filename: name,
                size: content.len() as u64,
            });
        }

        if !name.is_empty() && !mime_type.is_empty() && !content.is_empty() {
            email.attach(name, content, mime_type);
        }
    }
    Ok(email)
}

/// Best-effort base64 sniffing for providers that omit the flag: the length
/// is a multiple of four and every character is in the base64 alphabet, with
/// at most two trailing padding characters. Short plain-text strings such as
/// `"abcd"` satisfy this; the imprecision is inherited from the wire format.
pub fn looks_like_base64(s: &str) -> bool {
    if s.is_empty() || s.len() % 4 != 0 {
        return false;
    }
    let body = s.trim_end_matches('=');
    if body.is_empty() || s.len() - body.len() > 2 {
        return false;
    }
    body.bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/')
}
