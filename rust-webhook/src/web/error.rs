//! Webhook failure categories and their HTTP mapping.
//!
//! Status codes drive Stripe's redelivery: 4xx is final, 5xx is retried.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::stripe::{SignatureError, StripeApiError};

/// Every way a webhook request can end other than 200 OK.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// No usable `Stripe-Signature` header.
    #[error("Missing Stripe-Signature header")]
    MissingSignature,

    /// The signing secret is not configured. Needs an operator.
    #[error("Stripe webhook secret is not configured")]
    SecretNotConfigured,

    /// Bad signature, stale timestamp, or a payload that is not an event.
    #[error("Webhook signature verification failed: {0}")]
    Verification(#[from] SignatureError),

    /// Processing failed after the event was accepted.
    #[error("Webhook processing failed: {0}")]
    Processing(#[from] StripeApiError),
}

impl WebhookError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::MissingSignature | WebhookError::Verification(_) => {
                StatusCode::BAD_REQUEST
            }
            WebhookError::SecretNotConfigured | WebhookError::Processing(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            // Client errors explain themselves; server errors stay opaque.
            WebhookError::MissingSignature | WebhookError::Verification(_) => {
                (status, self.to_string()).into_response()
            }
            WebhookError::SecretNotConfigured | WebhookError::Processing(_) => {
                status.into_response()
            }
        }
    }
}
