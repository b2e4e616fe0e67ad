//! Configuration module for environment variable parsing.
//!
//! Everything is read once at startup and handed to the web server through
//! [`crate::web::AppState`]; handlers never touch the process environment.

use std::env;
use tracing::warn;

/// Stripe API version this service pins outbound calls to.
pub const DEFAULT_STRIPE_API_VERSION: &str = "2024-06-20";

/// Default Stripe API base URL.
pub const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Secret key used to authenticate outbound Stripe API calls
    pub stripe_api_key: Option<String>,

    /// Signing secret used to verify inbound webhook signatures
    pub stripe_webhook_secret: Option<String>,

    /// Base URL of the Stripe API
    pub stripe_api_base: String,

    /// API version sent on outbound calls and compared against inbound events
    pub stripe_api_version: String,

    /// Maximum age in seconds for a signed webhook timestamp (0 disables)
    pub signature_tolerance_secs: u64,

    /// Timeout in milliseconds for outbound Stripe API calls
    pub request_timeout_ms: u64,

    /// Optional cap on the webhook request body. Unbounded when unset.
    pub max_body_bytes: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8080,
            stripe_api_key: None,
            stripe_webhook_secret: None,
            stripe_api_base: DEFAULT_STRIPE_API_BASE.to_string(),
            stripe_api_version: DEFAULT_STRIPE_API_VERSION.to_string(),
            signature_tolerance_secs: 300,
            request_timeout_ms: 10_000,
            max_body_bytes: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        Config {
            port: parse_number("PORT", defaults.port),

            stripe_api_key: parse_secret("STRIPE_API_KEY"),

            stripe_webhook_secret: parse_secret("STRIPE_WEBHOOK_SECRET"),

            stripe_api_base: env::var("STRIPE_API_BASE")
                .ok()
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.stripe_api_base),

            stripe_api_version: env::var("STRIPE_API_VERSION")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.stripe_api_version),

            signature_tolerance_secs: parse_number(
                "STRIPE_SIGNATURE_TOLERANCE_SECS",
                defaults.signature_tolerance_secs,
            ),

            request_timeout_ms: parse_number("STRIPE_REQUEST_TIMEOUT_MS", defaults.request_timeout_ms),

            max_body_bytes: env::var("WEBHOOK_MAX_BODY_BYTES").ok().and_then(|raw| {
                match raw.trim().parse() {
                    Ok(limit) => Some(limit),
                    Err(_) => {
                        warn!(env_var = "WEBHOOK_MAX_BODY_BYTES", value = %raw, "Invalid body limit, leaving body unbounded");
                        None
                    }
                }
            }),
        }
    }

    /// The webhook signing secret, if one is configured and non-blank.
    pub fn webhook_secret(&self) -> Option<&str> {
        self.stripe_webhook_secret
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }
}

/// Parse a numeric variable, falling back to `default` when unset or malformed.
fn parse_number<T: std::str::FromStr>(name: &str, default: T) -> T {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid number, using default");
            default
        }
    }
}

/// Read a secret, treating blank values as unset.
fn parse_secret(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
