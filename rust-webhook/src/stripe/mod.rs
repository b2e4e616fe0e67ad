//! Stripe integration.
//!
//! - [`signature`]: `Stripe-Signature` verification and event construction
//! - [`event`]: typed webhook events
//! - [`client`]: the outbound subscription-metadata update

pub mod client;
pub mod event;
pub mod signature;

pub use client::{StripeApiError, StripeClient, SubscriptionUpdater};
pub use event::{Event, EventData, Subscription, SUBSCRIPTION_CREATED};
pub use signature::{compute_signature, SignatureError, SignatureHeader, VersionCheck, WebhookVerifier};
