//! Mailgun webhook payload parsing.
//!
//! Mailgun does the heavy lifting at its end: fields arrive UTF-8 encoded,
//! with the message reply and signature already stripped out, and
//! attachments as plain multipart uploads.

use tracing::debug;

use crate::email::CanonicalEmail;
use crate::error::ParseError;
use crate::parse::address::split_address_list;
use crate::parse::attachments::{attach_uploads, UploadName};
use crate::parse::RequestParser;
use crate::request::InboundRequest;

/// Parser for Mailgun's inbound routing webhook.
#[derive(Debug, Clone)]
pub struct MailgunParser {
    max_attachment_size: u64,
}

impl MailgunParser {
    pub fn new(max_attachment_size: u64) -> Self {
        Self {
            max_attachment_size,
        }
    }
}

impl RequestParser for MailgunParser {
    fn parse(&self, request: &InboundRequest) -> Result<Vec<CanonicalEmail>, ParseError> {
        let subject = request
            .field("subject")
            .ok_or_else(|| ParseError::missing("subject"))?
            .into_owned();

        // Reply body and signature block are posted separately and always
        // rejoined with a blank line, even when one half is empty.
        let body_text = format!(
            "{}\n\n{}",
            request.field("stripped-text").as_deref().unwrap_or(""),
            request.field("stripped-signature").as_deref().unwrap_or(""),
        );

        let from_address = request
            .field("sender")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ParseError::missing("sender"))?
            .into_owned();

        // present-but-empty recipient fails the same way as a missing one
        let recipient = request
            .field("recipient")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ParseError::missing("recipient"))?;

        let mut email = CanonicalEmail {
            subject,
            body_text,
            from_address,
            to_addresses: split_address_list(&recipient),
            cc_addresses: request
                .field("cc")
                .map(|cc| split_address_list(&cc))
                .unwrap_or_default(),
            bcc_addresses: request
                .field("bcc")
                .map(|bcc| split_address_list(&bcc))
                .unwrap_or_default(),
            ..Default::default()
        };

        if let Some(html) = request.field("stripped-html") {
            email.attach_alternative(html.into_owned());
        }

        let date = request
            .field("date")
            .filter(|d| !d.is_empty())
            .or_else(|| request.field("Date"));
        if let Some(date) = date.filter(|d| !d.is_empty()) {
            email
                .extra_headers
                .insert("date".to_string(), date.into_owned());
        }

        let email = attach_uploads(
            email,
            request.files(),
            self.max_attachment_size,
            UploadName::Field,
        )?;

        debug!(
            to = ?email.to_addresses,
            attachments = email.attachments.len(),
            "mailgun_parsed"
        );

        Ok(vec![email])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::UploadedFile;

    fn valid_request() -> InboundRequest {
        let mut request = InboundRequest::new("http://testserver/inbound/");
        request.insert_field("sender", "jed@whitehouse.gov");
        request.insert_field("recipient", "toby@whitehouse.gov, cj@whitehouse.gov");
        request.insert_field("subject", "Re: budget");
        request.insert_field("stripped-text", "Looks fine to me.");
        request.insert_field("stripped-signature", "Jed");
        request.insert_field("stripped-html", "<p>Looks fine to me.</p>");
        request
    }

    fn parse_one(request: &InboundRequest) -> Result<CanonicalEmail, ParseError> {
        MailgunParser::new(10_000_000)
            .parse(request)
            .map(|mut emails| emails.remove(0))
    }

    #[test]
    fn test_parse_valid_request() {
        let email = parse_one(&valid_request()).unwrap();

        assert_eq!(email.subject, "Re: budget");
        assert_eq!(email.body_text, "Looks fine to me.\n\nJed");
        assert_eq!(email.body_html.as_deref(), Some("<p>Looks fine to me.</p>"));
        assert_eq!(email.from_address, "jed@whitehouse.gov");
        assert_eq!(
            email.to_addresses,
            vec!["toby@whitehouse.gov", "cj@whitehouse.gov"]
        );
        assert!(email.cc_addresses.is_empty());
        assert!(email.bcc_addresses.is_empty());
    }

    #[test]
    fn test_minimal_payload() {
        let mut request = InboundRequest::new("http://testserver/inbound/");
        request.insert_field("sender", "jed@whitehouse.gov");
        request.insert_field("recipient", "toby@whitehouse.gov");
        request.insert_field("subject", "hello");

        let email = parse_one(&request).unwrap();
        assert_eq!(email.from_address, "jed@whitehouse.gov");
        assert_eq!(email.to_addresses, vec!["toby@whitehouse.gov"]);
        assert_eq!(email.subject, "hello");
        // both stripped halves absent still leaves the joining blank line
        assert_eq!(email.body_text, "\n\n");
        assert_eq!(email.body_html, None);
    }

    #[test]
    fn test_missing_required_fields() {
        for field in ["sender", "recipient", "subject"] {
            let mut request = InboundRequest::new("http://testserver/inbound/");
            for (name, value) in [
                ("sender", "jed@whitehouse.gov"),
                ("recipient", "toby@whitehouse.gov"),
                ("subject", "hello"),
            ] {
                if name != field {
                    request.insert_field(name, value);
                }
            }

            let err = parse_one(&request).unwrap_err();
            assert!(
                matches!(err, ParseError::Request(_)),
                "missing {field} should be a request parse error"
            );
        }
    }

    #[test]
    fn test_empty_recipient_is_a_parse_error() {
        let mut request = valid_request();
        request.insert_field("recipient", "");

        assert!(matches!(
            parse_one(&request).unwrap_err(),
            ParseError::Request(_)
        ));
    }

    #[test]
    fn test_display_names_are_kept_in_recipient_tokens() {
        let mut request = valid_request();
        request.insert_field("recipient", "Toby Ziegler <toby@whitehouse.gov>, cj@whitehouse.gov");

        let email = parse_one(&request).unwrap();
        assert_eq!(
            email.to_addresses,
            vec!["Toby Ziegler <toby@whitehouse.gov>", "cj@whitehouse.gov"]
        );
    }

    #[test]
    fn test_empty_html_is_not_attached() {
        let mut request = valid_request();
        request.insert_field("stripped-html", "");

        let email = parse_one(&request).unwrap();
        assert_eq!(email.body_html, None);
    }

    #[test]
    fn test_date_header_is_recorded() {
        let mut request = valid_request();
        request.insert_field("date", "Thu, 13 Nov 2014 14:01:30 GMT");

        let email = parse_one(&request).unwrap();
        assert_eq!(
            email.extra_headers.get("date").map(String::as_str),
            Some("Thu, 13 Nov 2014 14:01:30 GMT")
        );
    }

    #[test]
    fn test_capitalized_date_fallback() {
        let mut request = valid_request();
        request.insert_field("Date", "Thu, 13 Nov 2014 14:01:30 GMT");

        let email = parse_one(&request).unwrap();
        assert!(email.extra_headers.contains_key("date"));
    }

    #[test]
    fn test_no_date_leaves_headers_empty() {
        let email = parse_one(&valid_request()).unwrap();
        assert!(email.extra_headers.is_empty());
    }

    #[test]
    fn test_attachments_use_field_name() {
        let mut request = valid_request();
        request.insert_file(UploadedFile::new(
            "attachment-1",
            "notes.txt",
            "text/plain",
            b"minutes".to_vec(),
        ));

        let email = parse_one(&request).unwrap();
        assert_eq!(email.attachments.len(), 1);
        assert_eq!(email.attachments[0].filename, "attachment-1");
        assert_eq!(email.attachments[0].content, b"minutes");
    }

    #[test]
    fn test_oversized_attachment_aborts_with_partial_email() {
        let mut request = valid_request();
        request.insert_file(UploadedFile::new(
            "attachment-1",
            "big.bin",
            "application/octet-stream",
            vec![0u8; 32],
        ));

        let err = MailgunParser::new(16).parse(&request).unwrap_err();
        match err {
            ParseError::AttachmentTooLarge {
                email,
                filename,
                size,
            } => {
                assert_eq!(filename, "big.bin");
                assert_eq!(size, 32);
                assert_eq!(email.from_address, "jed@whitehouse.gov");
            }
            other => panic!("expected AttachmentTooLarge, got {other:?}"),
        }
    }
}
