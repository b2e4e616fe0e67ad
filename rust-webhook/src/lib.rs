//! Licensehook - Stripe webhook receiver that issues license keys.
//!
//! The `licensehook-web` binary serves a single webhook endpoint. Each
//! delivery is verified against the `Stripe-Signature` header, deduplicated
//! by event id for the lifetime of the process, and for
//! `customer.subscription.created` a fresh license key is written to the
//! subscription's metadata.
//!
//! ## Flow
//!
//! ```text
//! Stripe → POST /webhooks/stripe → verify → dedupe → process_event → Stripe API
//! ```

pub mod config;
pub mod dedupe;
pub mod license;
pub mod process;
pub mod stripe;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use dedupe::ProcessedEvents;
pub use license::generate_license_key;
pub use process::{process_event, EventOutcome};
pub use stripe::{Event, StripeClient, SubscriptionUpdater, WebhookVerifier};
pub use web::{router, AppState};
