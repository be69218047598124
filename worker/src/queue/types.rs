//! Notification payloads published after parsing.
//!
//! Application consumers subscribe to one queue and receive one event per
//! parse outcome; the payload shape is fixed.

use serde::{Deserialize, Serialize};

use crate::email::CanonicalEmail;

/// Queue name for parse-outcome events.
pub const INBOUND_EMAIL_QUEUE: &str = "inbound_emails";

/// Event published for application consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EmailEvent {
    /// A canonical email was parsed from an inbound request.
    Received { email: CanonicalEmail },

    /// The request was rejected. `email` carries the partial parse when one
    /// exists (oversized attachment); authentication failures have none.
    Rejected {
        email: Option<CanonicalEmail>,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_received_event_serialization() {
        let event = EmailEvent::Received {
            email: CanonicalEmail {
                subject: "hi".to_string(),
                from_address: "a@x.com".to_string(),
                to_addresses: vec!["b@x.com".to_string()],
                ..Default::default()
            },
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"received\""));

        match serde_json::from_str(&json).unwrap() {
            EmailEvent::Received { email } => assert_eq!(email.subject, "hi"),
            other => panic!("expected Received, got {other:?}"),
        }
    }

    #[test]
    fn test_rejected_event_serialization() {
        let event = EmailEvent::Rejected {
            email: None,
            reason: "request signature mismatch".to_string(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"rejected\""));

        match serde_json::from_str(&json).unwrap() {
            EmailEvent::Rejected { email, reason } => {
                assert!(email.is_none());
                assert!(reason.contains("mismatch"));
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }
}
