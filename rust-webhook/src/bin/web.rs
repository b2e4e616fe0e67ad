//! `licensehook-web`: serves the Stripe webhook endpoint.
//!
//! Configuration comes from the environment (see [`licensehook::Config`]).
//! Logs are JSON lines filtered by `RUST_LOG`.

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use licensehook::{router, AppState, Config, StripeClient};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    info!(version = env!("CARGO_PKG_VERSION"), "licensehook_starting");

    let config = Config::from_env();
    info!(
        port = config.port,
        stripe_api_key_configured = config.stripe_api_key.is_some(),
        webhook_secret_configured = config.webhook_secret().is_some(),
        stripe_api_base = %config.stripe_api_base,
        stripe_api_version = %config.stripe_api_version,
        signature_tolerance_secs = config.signature_tolerance_secs,
        request_timeout_ms = config.request_timeout_ms,
        max_body_bytes = ?config.max_body_bytes,
        "config_loaded"
    );

    if config.webhook_secret().is_none() {
        warn!("stripe_webhook_secret_not_configured");
    }
    if config.stripe_api_key.is_none() {
        warn!("stripe_api_key_not_configured");
    }
    if config.max_body_bytes.is_none() {
        warn!("webhook_body_size_unbounded");
    }

    let stripe = StripeClient::from_config(&config);
    let state = AppState::new(&config, Arc::new(stripe));
    let processed = state.processed.clone();

    let app = router(state, config.max_body_bytes).layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "licensehook_listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!(events_seen = processed.len(), "licensehook_stopped");

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();
}

/// Resolves on SIGINT, or SIGTERM on unix. In-flight requests finish first.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "ctrl_c_handler_unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "sigterm_handler_unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let received = tokio::select! {
        _ = interrupt => "SIGINT",
        _ = terminate => "SIGTERM",
    };

    info!(signal = received, "licensehook_shutting_down");
}
