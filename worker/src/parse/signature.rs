//! Mandrill webhook signature verification.
//!
//! Mandrill signs each webhook POST with HMAC-SHA1 over the delivery URL
//! followed by every posted field, and sends the base64-encoded digest in a
//! request header.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::AuthenticationError;
use crate::request::InboundRequest;

type HmacSha1 = Hmac<Sha1>;

/// Header carrying the provider-computed signature.
pub const SIGNATURE_HEADER: &str = "X-Mandrill-Signature";

/// Verify the signature on `request` against the shared `key`.
///
/// The signed message is the externally visible URL followed by each posted
/// field as `name + value`, fields in ascending name order. The recomputed
/// digest must equal the request header exactly.
pub fn check_signature(request: &InboundRequest, key: &str) -> Result<(), AuthenticationError> {
    let expected = request.header(SIGNATURE_HEADER).map(str::to_string);
    let calculated = calculate_signature(request, key);

    if expected.as_deref() == Some(calculated.as_str()) {
        Ok(())
    } else {
        Err(AuthenticationError::SignatureMismatch {
            expected,
            calculated,
            request: Box::new(request.clone()),
        })
    }
}

/// Recompute the signature the provider should have sent for `request`.
pub fn calculate_signature(request: &InboundRequest, key: &str) -> String {
    let mut message = String::from(request.url());
    for (name, value) in request.fields() {
        message.push_str(name);
        message.push_str(&value);
    }

    let mut mac =
        HmacSha1::new_from_slice(key.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(message.as_bytes());

    STANDARD.encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed_request(key: &str) -> InboundRequest {
        let mut request = InboundRequest::new("http://testserver/inbound/");
        request.insert_field("mandrill_events", "[]");
        request.insert_field("extra", "value");
        let signature = calculate_signature(&request, key);
        request.insert_header(SIGNATURE_HEADER, signature);
        request
    }

    #[test]
    fn test_valid_signature_passes() {
        let request = signed_request("mandrill_key");
        assert!(check_signature(&request, "mandrill_key").is_ok());
    }

    #[test]
    fn test_mutated_field_invalidates_signature() {
        let mut request = signed_request("mandrill_key");
        request.insert_field("extra", "valuE");

        let err = check_signature(&request, "mandrill_key").unwrap_err();
        let AuthenticationError::SignatureMismatch {
            expected,
            calculated,
            ..
        } = err;
        assert!(expected.is_some());
        assert_ne!(expected.as_deref(), Some(calculated.as_str()));
    }

    #[test]
    fn test_wrong_key_invalidates_signature() {
        let request = signed_request("mandrill_key");
        assert!(check_signature(&request, "other_key").is_err());
    }

    #[test]
    fn test_missing_header_is_a_mismatch() {
        let mut request = InboundRequest::new("http://testserver/inbound/");
        request.insert_field("mandrill_events", "[]");

        let err = check_signature(&request, "mandrill_key").unwrap_err();
        let AuthenticationError::SignatureMismatch { expected, .. } = err;
        assert_eq!(expected, None);
    }

    #[test]
    fn test_field_order_does_not_matter() {
        // fields always hash in name order, however they were inserted
        let mut a = InboundRequest::new("http://testserver/inbound/");
        a.insert_field("beta", "2");
        a.insert_field("alpha", "1");

        let mut b = InboundRequest::new("http://testserver/inbound/");
        b.insert_field("alpha", "1");
        b.insert_field("beta", "2");

        assert_eq!(
            calculate_signature(&a, "key"),
            calculate_signature(&b, "key")
        );
    }
}
