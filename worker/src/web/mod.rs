//! Web server module for handling inbound webhooks.
//!
//! A thin dispatch layer: it buffers the request, invokes the configured
//! provider parser, publishes the outcome, and answers with a fixed status
//! code. All provider-specific logic lives in `crate::parse`.

pub mod handlers;

pub use handlers::{
    health, receive_inbound_email, AppState, HealthResponse, MAX_BODY_BYTES,
};
