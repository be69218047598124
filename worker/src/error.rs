//! Typed failures raised by the parsing core.

use thiserror::Error;

use crate::email::CanonicalEmail;
use crate::request::InboundRequest;

/// Errors raised while turning an inbound request into canonical emails.
///
/// All three kinds surface synchronously from `RequestParser::parse`; the
/// caller decides response codes and notification routing, never this crate.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The payload was structurally invalid or missing a required field.
    /// The message is the human-readable description of what was wrong.
    #[error("{0}")]
    Request(String),

    /// A decoded attachment exceeded the configured size ceiling.
    ///
    /// Carries the email as built up to the offending attachment so the
    /// caller can still surface it for diagnostics.
    #[error("attachment {filename} is too large to process ({size}B)")]
    AttachmentTooLarge {
        email: Box<CanonicalEmail>,
        filename: String,
        size: u64,
    },

    /// The request failed origin verification. No partial email exists.
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),
}

impl ParseError {
    pub(crate) fn missing(field: &str) -> Self {
        ParseError::Request(format!(
            "inbound request is missing required value: {field}"
        ))
    }
}

/// Errors raised while authenticating an inbound request.
#[derive(Debug, Error)]
pub enum AuthenticationError {
    /// The signature supplied with the request does not match the one
    /// recomputed from the posted fields.
    #[error("request signature mismatch: expected {expected:?}, calculated {calculated}")]
    SignatureMismatch {
        /// Signature supplied in the request header, if any.
        expected: Option<String>,
        /// Signature recomputed from the posted fields and secret.
        calculated: String,
        /// The offending request, kept for diagnostics.
        request: Box<InboundRequest>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_message() {
        let err = ParseError::missing("recipient");
        assert_eq!(
            err.to_string(),
            "inbound request is missing required value: recipient"
        );
    }

    #[test]
    fn test_attachment_too_large_carries_partial_email() {
        let email = CanonicalEmail {
            from_address: "sender@example.com".to_string(),
            ..Default::default()
        };
        let err = ParseError::AttachmentTooLarge {
            email: Box::new(email),
            filename: "huge.bin".to_string(),
            size: 10_000_001,
        };

        assert_eq!(
            err.to_string(),
            "attachment huge.bin is too large to process (10000001B)"
        );
        match err {
            ParseError::AttachmentTooLarge { email, .. } => {
                assert_eq!(email.from_address, "sender@example.com");
            }
            _ => panic!("expected AttachmentTooLarge"),
        }
    }

    #[test]
    fn test_signature_mismatch_display() {
        let err = AuthenticationError::SignatureMismatch {
            expected: None,
            calculated: "YWJj".to_string(),
            request: Box::new(InboundRequest::new("http://testserver/inbound/")),
        };
        assert!(err.to_string().contains("YWJj"));
    }
}
