//! Stripe webhook signature verification.
//!
//! Stripe signs webhook requests using HMAC-SHA256 over `"{t}.{body}"`.
//! Reference: https://docs.stripe.com/webhooks#verify-manually

use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, warn};

use super::event::Event;

type HmacSha256 = Hmac<Sha256>;

/// Why an inbound webhook was rejected.
///
/// The `Display` text is returned to the sender in the 400 response body.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Unable to extract timestamp from signature header")]
    MissingTimestamp,

    #[error("Invalid timestamp in signature header")]
    InvalidTimestamp,

    #[error("No signatures found with expected scheme v1")]
    NoSignatures,

    #[error("No signatures found matching the expected signature for payload")]
    SignatureMismatch,

    #[error("Timestamp outside the tolerance zone ({age_secs}s)")]
    OutsideTolerance { age_secs: u64 },

    #[error("Invalid JSON payload: {0}")]
    InvalidPayload(String),

    #[error("Received event with API version {received}, but expected {expected}")]
    ApiVersionMismatch { received: String, expected: String },
}

/// How to treat an event rendered with a different API version than ours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionCheck {
    /// Reject the event.
    Strict,
    /// Accept the event and log the mismatch.
    Relaxed,
}

/// Parsed components of a `Stripe-Signature` header.
///
/// Format: `t=<timestamp>,v1=<hex>[,v1=<hex>...][,v0=<hex>]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub v1_signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> Result<Self, SignatureError> {
        let mut timestamp = None;
        let mut v1_signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };

            match key {
                "t" => {
                    timestamp = Some(
                        value
                            .parse::<i64>()
                            .map_err(|_| SignatureError::InvalidTimestamp)?,
                    );
                }
                "v1" => {
                    // Undecodable entries can never match, so they are dropped.
                    if let Ok(sig) = hex::decode(value) {
                        v1_signatures.push(sig);
                    }
                }
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(SignatureError::MissingTimestamp)?;
        if v1_signatures.is_empty() {
            return Err(SignatureError::NoSignatures);
        }

        Ok(SignatureHeader {
            timestamp,
            v1_signatures,
        })
    }
}

/// Compute the hex v1 signature Stripe would send for `payload` at `timestamp`.
pub fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    hex::encode(signed_mac(secret, timestamp, payload).finalize().into_bytes())
}

fn signed_mac(secret: &str, timestamp: i64, payload: &[u8]) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac
}

/// Verifies webhook signatures and turns verified payloads into [`Event`]s.
#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: u64,
    api_version: Option<String>,
    version_check: VersionCheck,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs: 300,
            api_version: None,
            version_check: VersionCheck::Relaxed,
        }
    }

    /// Maximum accepted age of the signed timestamp. Zero disables the check.
    pub fn with_tolerance(mut self, tolerance_secs: u64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// API version inbound events are compared against.
    pub fn with_api_version(mut self, api_version: impl Into<String>, check: VersionCheck) -> Self {
        self.api_version = Some(api_version.into());
        self.version_check = check;
        self
    }

    /// Verify `signature_header` against the raw `payload` and parse the event.
    ///
    /// The HMAC covers the bytes as received; a body that is not UTF-8 JSON
    /// is reported as [`SignatureError::InvalidPayload`].
    pub fn construct_event(
        &self,
        payload: impl AsRef<[u8]>,
        signature_header: &str,
    ) -> Result<Event, SignatureError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        self.construct_event_at(payload, signature_header, now)
    }

    /// Same as [`construct_event`](Self::construct_event) with an explicit clock.
    pub fn construct_event_at(
        &self,
        payload: impl AsRef<[u8]>,
        signature_header: &str,
        now: i64,
    ) -> Result<Event, SignatureError> {
        let payload = payload.as_ref();
        self.verify_signature(payload, signature_header, now)?;

        let event: Event = serde_json::from_slice(payload)
            .map_err(|e| SignatureError::InvalidPayload(e.to_string()))?;

        self.check_api_version(&event)?;

        Ok(event)
    }

    /// Check the header's signatures and timestamp without parsing the body.
    pub fn verify_signature(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: i64,
    ) -> Result<(), SignatureError> {
        let header = SignatureHeader::parse(signature_header)?;

        let mac = signed_mac(&self.secret, header.timestamp, payload);
        let matched = header
            .v1_signatures
            .iter()
            .any(|sig| mac.clone().verify_slice(sig).is_ok());

        if !matched {
            warn!(
                signatures = header.v1_signatures.len(),
                "stripe_signature_mismatch"
            );
            return Err(SignatureError::SignatureMismatch);
        }

        let age_secs = now.abs_diff(header.timestamp);
        if self.tolerance_secs > 0 && age_secs > self.tolerance_secs {
            warn!(
                webhook_time = header.timestamp,
                current_time = now,
                age_seconds = age_secs,
                tolerance_seconds = self.tolerance_secs,
                "stripe_signature_stale"
            );
            return Err(SignatureError::OutsideTolerance { age_secs });
        }

        Ok(())
    }

    fn check_api_version(&self, event: &Event) -> Result<(), SignatureError> {
        let (Some(expected), Some(received)) = (&self.api_version, &event.api_version) else {
            return Ok(());
        };

        if expected == received {
            return Ok(());
        }

        match self.version_check {
            VersionCheck::Strict => Err(SignatureError::ApiVersionMismatch {
                received: received.clone(),
                expected: expected.clone(),
            }),
            VersionCheck::Relaxed => {
                debug!(
                    event_id = %event.id,
                    received = %received,
                    expected = %expected,
                    "stripe_api_version_mismatch_ignored"
                );
                Ok(())
            }
        }
    }
}
