//! Webhook endpoint handlers.
//!
//! One endpoint receives every provider's webhook. The handler buffers the
//! request into an [`InboundRequest`], hands it to the configured provider
//! parser, publishes the outcome, and maps errors to the response-code
//! policy. Status codes are decided here, never inside the parsers.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::email::CanonicalEmail;
use crate::error::ParseError;
use crate::parse::{parser_for, RequestParser};
use crate::queue::{EmailEvent, Publisher};
use crate::request::{InboundRequest, UploadedFile};
use crate::Config;

/// Upper bound on a buffered webhook body. Roomy enough for several
/// attachments at the default ceiling.
pub const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

const SUCCESS_BODY: &str = "Successfully parsed inbound email.";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub parser: Arc<dyn RequestParser>,
    pub publisher: Publisher,
}

impl AppState {
    pub fn new(config: Config, publisher: Publisher) -> Self {
        let parser: Arc<dyn RequestParser> = Arc::from(parser_for(&config));
        Self {
            config: Arc::new(config),
            parser,
            publisher,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Inbound Email Webhook
// =============================================================================

/// Inbound email webhook endpoint.
///
/// Answers `HEAD` (route-validation probes from providers) with a plain OK.
/// For `POST`, parses the payload with the configured provider parser and
/// publishes one event per outcome.
pub async fn receive_inbound_email(
    State(state): State<AppState>,
    request: Request,
) -> Response {
    if request.method() == Method::HEAD {
        return (StatusCode::OK, "OK").into_response();
    }

    let inbound = match buffer_request(request).await {
        Ok(inbound) => inbound,
        Err(e) => {
            warn!(error = %e, "inbound_request_body_unreadable");
            return parse_error_response(&state, &format!("{e:#}"));
        }
    };

    if state.config.log_requests {
        log_request(&inbound);
    }

    match state.parser.parse(&inbound) {
        Ok(emails) => {
            for email in emails {
                if let Err(e) = state
                    .publisher
                    .publish(&EmailEvent::Received { email })
                    .await
                {
                    error!(error = %e, "email_event_publish_failed");
                    return publish_failure_response();
                }
            }
            (StatusCode::OK, SUCCESS_BODY).into_response()
        }
        Err(err) => {
            let reason = err.to_string();
            match err {
                ParseError::Request(_) => {
                    warn!(error = %reason, "inbound_request_unparseable");
                    parse_error_response(&state, &reason)
                }
                ParseError::AttachmentTooLarge { email, .. } => {
                    warn!(error = %reason, "inbound_email_rejected");
                    publish_rejected(&state, Some(*email), reason).await
                }
                ParseError::Authentication(_) => {
                    warn!(error = %reason, "inbound_request_unauthenticated");
                    publish_rejected(&state, None, reason).await
                }
            }
        }
    }
}

/// Buffer an HTTP request into the provider-agnostic `InboundRequest`.
async fn buffer_request(request: Request) -> Result<InboundRequest> {
    let url = external_url(request.headers(), request.uri());
    let mut inbound = InboundRequest::new(url);

    for (name, value) in request.headers() {
        if let Ok(value) = value.to_str() {
            inbound.insert_header(name.as_str(), value);
        }
    }

    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if content_type.starts_with("multipart/form-data") {
        let mut multipart = Multipart::from_request(request, &())
            .await
            .context("invalid multipart body")?;

        while let Some(field) = multipart
            .next_field()
            .await
            .context("unreadable multipart field")?
        {
            let name = field.name().unwrap_or_default().to_string();
            let file_name = field.file_name().map(str::to_string);
            match file_name {
                Some(file_name) => {
                    let content_type = field
                        .content_type()
                        .unwrap_or("application/octet-stream")
                        .to_string();
                    let data = field.bytes().await.context("unreadable file upload")?;
                    inbound.insert_file(UploadedFile::new(
                        name,
                        file_name,
                        content_type,
                        data.to_vec(),
                    ));
                }
                None => {
                    let data = field.bytes().await.context("unreadable form field")?;
                    inbound.insert_field(name, data);
                }
            }
        }
    } else {
        let body = axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES)
            .await
            .context("unreadable request body")?;
        for (name, value) in url::form_urlencoded::parse(&body) {
            inbound.insert_field(name.into_owned(), value.as_bytes());
        }
    }

    Ok(inbound)
}

/// Reconstruct the externally visible URL the provider delivered to.
fn external_url(headers: &HeaderMap, uri: &Uri) -> String {
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    format!("{scheme}://{host}{path}")
}

/// Dump every posted field and file at debug level.
fn log_request(request: &InboundRequest) {
    debug!(url = %request.url(), "inbound_email_received");
    for (name, value) in request.fields() {
        debug!(field = name, value = %value, "inbound_request_field");
    }
    for file in request.files() {
        debug!(
            field = %file.field_name,
            filename = %file.file_name,
            content_type = %file.content_type,
            size = file.size,
            "inbound_request_file"
        );
    }
}

/// Response for an unparseable request. Defaults to 200 so the provider
/// stops retrying a payload that will never parse.
fn parse_error_response(state: &AppState, reason: &str) -> Response {
    let status = if state.config.respond_200_on_parse_error {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, format!("Unable to parse inbound email: {reason}")).into_response()
}

/// Publish a rejection event. Rejected artifacts still answer 200: the
/// provider delivered its webhook and must not retry.
async fn publish_rejected(
    state: &AppState,
    email: Option<CanonicalEmail>,
    reason: String,
) -> Response {
    if let Err(e) = state
        .publisher
        .publish(&EmailEvent::Rejected { email, reason })
        .await
    {
        error!(error = %e, "email_event_publish_failed");
        return publish_failure_response();
    }
    (StatusCode::OK, SUCCESS_BODY).into_response()
}

fn publish_failure_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Failed to publish inbound email event.",
    )
        .into_response()
}
