//! Outbound Stripe API calls.
//!
//! The webhook handler only needs one remote operation, updating a
//! subscription's metadata, so that is all [`SubscriptionUpdater`] exposes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::Config;

/// Errors from the Stripe API.
#[derive(Debug, Error)]
pub enum StripeApiError {
    #[error("Stripe API key is not configured")]
    MissingApiKey,

    #[error("Invalid Stripe API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Stripe request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Stripe API returned {status}: {message}")]
    Api { status: StatusCode, message: String },
}

/// Remote operation that attaches metadata to a subscription.
#[async_trait]
pub trait SubscriptionUpdater: Send + Sync {
    async fn update_metadata(
        &self,
        subscription_id: &str,
        metadata: &[(&str, &str)],
    ) -> Result<(), StripeApiError>;
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// reqwest-backed Stripe API client.
#[derive(Clone)]
pub struct StripeClient {
    http: Client,
    api_key: Option<String>,
    api_base: String,
    api_version: String,
    timeout: Duration,
}

impl StripeClient {
    pub fn new(
        http: Client,
        api_key: Option<String>,
        api_base: impl Into<String>,
        api_version: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            api_key,
            api_base: api_base.into(),
            api_version: api_version.into(),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Client::new(),
            config.stripe_api_key.clone(),
            config.stripe_api_base.clone(),
            config.stripe_api_version.clone(),
            Duration::from_millis(config.request_timeout_ms),
        )
    }

    /// `{base}/v1/subscriptions/{id}`, with the id escaped as a path segment.
    pub fn subscription_url(&self, subscription_id: &str) -> Result<Url, StripeApiError> {
        let mut url = Url::parse(&self.api_base)?;
        url.path_segments_mut()
            .map_err(|_| StripeApiError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(["v1", "subscriptions", subscription_id]);
        Ok(url)
    }
}

/// Encode metadata the way Stripe's form API expects: `metadata[key]=value`.
pub fn metadata_form(metadata: &[(&str, &str)]) -> Vec<(String, String)> {
    metadata
        .iter()
        .map(|(key, value)| (format!("metadata[{}]", key), value.to_string()))
        .collect()
}

#[async_trait]
impl SubscriptionUpdater for StripeClient {
    async fn update_metadata(
        &self,
        subscription_id: &str,
        metadata: &[(&str, &str)],
    ) -> Result<(), StripeApiError> {
        let api_key = self.api_key.as_deref().ok_or(StripeApiError::MissingApiKey)?;
        let url = self.subscription_url(subscription_id)?;

        info!(
            subscription_id = subscription_id,
            keys = metadata.len(),
            timeout_seconds = self.timeout.as_secs_f64(),
            "stripe_subscription_update_starting"
        );

        let response = self
            .http
            .post(url)
            .bearer_auth(api_key)
            .header("Stripe-Version", &self.api_version)
            .timeout(self.timeout)
            .form(&metadata_form(metadata))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    error!(
                        subscription_id = subscription_id,
                        timeout_seconds = self.timeout.as_secs_f64(),
                        error = %e,
                        "stripe_subscription_update_timeout"
                    );
                }
                StripeApiError::Transport(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorEnvelope>()
                .await
                .ok()
                .and_then(|envelope| envelope.error.message)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());

            error!(
                subscription_id = subscription_id,
                status_code = status.as_u16(),
                message = %message,
                "stripe_subscription_update_rejected"
            );
            return Err(StripeApiError::Api { status, message });
        }

        info!(
            subscription_id = subscription_id,
            status_code = status.as_u16(),
            "stripe_subscription_update_complete"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str, api_key: Option<&str>) -> StripeClient {
        StripeClient::new(
            Client::new(),
            api_key.map(str::to_string),
            base,
            "2024-06-20",
            Duration::from_millis(500),
        )
    }

    #[test]
    fn test_subscription_url() {
        let url = client("https://api.stripe.com", None)
            .subscription_url("sub_123")
            .unwrap();
        assert_eq!(url.as_str(), "https://api.stripe.com/v1/subscriptions/sub_123");
    }

    #[test]
    fn test_subscription_url_keeps_base_path_and_escapes_id() {
        let url = client("http://localhost:12111/stripe/", None)
            .subscription_url("sub/../x")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:12111/stripe/v1/subscriptions/sub%2F..%2Fx"
        );
    }

    #[test]
    fn test_subscription_url_invalid_base() {
        let result = client("not a url", None).subscription_url("sub_123");
        assert!(matches!(result, Err(StripeApiError::InvalidUrl(_))));
    }

    #[test]
    fn test_metadata_form() {
        let form = metadata_form(&[("license_key", "ABC-123")]);
        assert_eq!(
            form,
            vec![("metadata[license_key]".to_string(), "ABC-123".to_string())]
        );
    }

    #[tokio::test]
    async fn test_update_without_api_key_fails_before_network() {
        let result = client("http://127.0.0.1:9", None)
            .update_metadata("sub_123", &[("license_key", "X")])
            .await;
        assert!(matches!(result, Err(StripeApiError::MissingApiKey)));
    }

    #[tokio::test]
    async fn test_update_transport_failure() {
        // Port 9 (discard) is not expected to be listening.
        let result = client("http://127.0.0.1:9", Some("sk_test_123"))
            .update_metadata("sub_123", &[("license_key", "X")])
            .await;
        assert!(matches!(result, Err(StripeApiError::Transport(_))));
    }
}
