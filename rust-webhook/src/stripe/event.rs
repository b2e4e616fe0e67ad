//! Stripe event payload types.
//!
//! Only the envelope is typed. `data.object` stays opaque JSON and is
//! interpreted on demand for the event types this service acts on.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

/// Event type emitted when a customer starts a new subscription.
pub const SUBSCRIPTION_CREATED: &str = "customer.subscription.created";

/// A Stripe webhook event.
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    /// Provider-assigned unique identifier (`evt_...`)
    pub id: String,
    /// Event type, e.g. `customer.subscription.created`
    #[serde(rename = "type")]
    pub event_type: String,
    /// API version the payload was rendered with
    #[serde(default)]
    pub api_version: Option<String>,
    /// Unix timestamp of event creation
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub livemode: bool,
    pub data: EventData,
}

/// The `data` section of an event.
#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    /// The resource the event is about, shape depends on `type`
    pub object: Value,
}

/// The subset of a Stripe subscription object this service reads.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Subscription {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Event {
    pub fn is_subscription_created(&self) -> bool {
        self.event_type == SUBSCRIPTION_CREATED
    }

    /// Extract the subscription carried in `data.object`.
    ///
    /// Returns `None` unless the object is tagged `"object": "subscription"`
    /// and has a non-empty `id`.
    pub fn subscription(&self) -> Option<Subscription> {
        let object = &self.data.object;
        if object.get("object").and_then(Value::as_str) != Some("subscription") {
            return None;
        }

        serde_json::from_value::<Subscription>(object.clone())
            .ok()
            .filter(|s| !s.id.is_empty())
    }
}
