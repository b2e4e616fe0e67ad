//! Verified-event processing.
//!
//! ```text
//! Event → process_event() → EventOutcome
//! ```
//!
//! Only `customer.subscription.created` has a side effect: a fresh license
//! key is minted and written to the subscription's metadata.

use tracing::{info, warn};

use crate::license::{generate_license_key, LICENSE_METADATA_KEY};
use crate::stripe::{Event, StripeApiError, SubscriptionUpdater};

/// What happened to a verified, first-delivery event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// A license key was attached to the subscription.
    LicenseIssued {
        subscription_id: String,
        license_key: String,
    },
    /// The event was a subscription creation but carried no usable subscription.
    MissingSubscription,
    /// The event type is not one this service acts on.
    Ignored,
}

/// Route a verified event to its business action.
pub async fn process_event(
    updater: &dyn SubscriptionUpdater,
    event: &Event,
) -> Result<EventOutcome, StripeApiError> {
    if !event.is_subscription_created() {
        info!(
            event_id = %event.id,
            event_type = %event.event_type,
            "stripe_event_ignored"
        );
        return Ok(EventOutcome::Ignored);
    }

    let Some(subscription) = event.subscription() else {
        warn!(
            event_id = %event.id,
            event_type = %event.event_type,
            "stripe_event_missing_subscription"
        );
        return Ok(EventOutcome::MissingSubscription);
    };

    let license_key = generate_license_key();
    info!(
        event_id = %event.id,
        subscription_id = %subscription.id,
        customer_id = subscription.customer.as_deref().unwrap_or(""),
        license_key = %license_key,
        "license_key_generated"
    );

    updater
        .update_metadata(&subscription.id, &[(LICENSE_METADATA_KEY, license_key.as_str())])
        .await?;

    info!(
        event_id = %event.id,
        subscription_id = %subscription.id,
        "license_key_issued"
    );

    Ok(EventOutcome::LicenseIssued {
        subscription_id: subscription.id,
        license_key,
    })
}
