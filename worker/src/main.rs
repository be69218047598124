//! Postroom Web - inbound email webhook receiver.
//!
//! This binary runs the thin web server that:
//! - Receives inbound email webhooks from the configured provider
//! - Parses each payload into canonical emails
//! - Publishes one event per outcome to the inbound_emails queue

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, on, MethodFilter},
    Router,
};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use postroom::web::{health, receive_inbound_email, AppState, MAX_BODY_BYTES};
use postroom::{Config, Publisher};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    // Load configuration
    let config = Config::from_env().context("Invalid configuration")?;
    info!(
        provider = %config.provider,
        attachment_size_max = config.attachment_size_max,
        mandrill_authentication_configured = config.mandrill_authentication_key.is_some(),
        respond_200_on_parse_error = config.respond_200_on_parse_error,
        "config_loaded"
    );

    // Create AMQP publisher
    let publisher = Publisher::new(config.amqp_url.clone());

    // Create application state; this resolves the provider parser once
    let port = config.port;
    let state = AppState::new(config, publisher.clone());

    // Build the router. Providers probe the inbound route with HEAD.
    let app = Router::new()
        .route("/health", get(health))
        .route(
            "/inbound/",
            on(
                MethodFilter::POST.or(MethodFilter::HEAD),
                receive_inbound_email,
            ),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Close publisher connection
    publisher.close().await;

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
