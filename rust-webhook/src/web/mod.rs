//! Web server module for handling inbound Stripe webhooks.
//!
//! This module provides:
//! - `GET /health` for liveness probes
//! - `POST /webhooks/stripe` which verifies, deduplicates and acts on events

pub mod error;
pub mod handlers;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

pub use error::WebhookError;
pub use handlers::{health, stripe_webhook, AppState, HealthResponse, SIGNATURE_HEADER};

/// Build the application router.
///
/// `max_body_bytes` caps the webhook body; `None` leaves it unbounded.
pub fn router(state: AppState, max_body_bytes: Option<usize>) -> Router {
    let body_limit = match max_body_bytes {
        Some(limit) => DefaultBodyLimit::max(limit),
        None => DefaultBodyLimit::disable(),
    };

    Router::new()
        .route("/health", get(health))
        .route("/webhooks/stripe", post(stripe_webhook))
        .layer(body_limit)
        .with_state(state)
}
