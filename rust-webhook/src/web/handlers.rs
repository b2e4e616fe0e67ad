//! Webhook endpoint handlers.
//!
//! The Stripe handler runs a linear pipeline, each step a terminal exit on
//! failure:
//! 1. Require the `Stripe-Signature` header
//! 2. Require a configured signing secret
//! 3. Verify the signature and parse the event
//! 4. Drop redeliveries of an already-accepted event id
//! 5. Issue a license for `customer.subscription.created`
//!
//! Every path ends in an explicit HTTP response.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::dedupe::ProcessedEvents;
use crate::process::{process_event, EventOutcome};
use crate::stripe::{SubscriptionUpdater, VersionCheck, WebhookVerifier};
use crate::web::error::WebhookError;
use crate::Config;

/// Header carrying Stripe's webhook signature.
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// `None` when no signing secret is configured
    pub verifier: Option<Arc<WebhookVerifier>>,
    pub processed: ProcessedEvents,
    pub updater: Arc<dyn SubscriptionUpdater>,
}

impl AppState {
    pub fn new(config: &Config, updater: Arc<dyn SubscriptionUpdater>) -> Self {
        let verifier = config.webhook_secret().map(|secret| {
            Arc::new(
                WebhookVerifier::new(secret)
                    .with_tolerance(config.signature_tolerance_secs)
                    .with_api_version(config.stripe_api_version.clone(), VersionCheck::Relaxed),
            )
        });

        Self {
            verifier,
            processed: ProcessedEvents::new(),
            updater,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Stripe Webhook
// =============================================================================

/// Stripe webhook endpoint.
///
/// The body is taken as raw bytes so the signature covers exactly what was
/// sent and an undecodable body still reaches the checks below.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, WebhookError> {
    info!(body_length = body.len(), "stripe_webhook_received");

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let Some(signature) = signature else {
        warn!("stripe_signature_missing");
        return Err(WebhookError::MissingSignature);
    };

    let Some(verifier) = state.verifier.as_deref() else {
        error!("stripe_webhook_secret_missing");
        return Err(WebhookError::SecretNotConfigured);
    };

    let event = verifier.construct_event(&body, signature).map_err(|e| {
        warn!(reason = %e, "stripe_signature_invalid");
        WebhookError::Verification(e)
    })?;

    info!(
        event_id = %event.id,
        event_type = %event.event_type,
        livemode = event.livemode,
        "stripe_event_verified"
    );

    // The id is recorded before processing, so a failed update below is not
    // retried by redelivery.
    // TODO: release the id when process_event fails so Stripe's retry can reissue the license.
    if !state.processed.mark_processed(&event.id) {
        info!(event_id = %event.id, "stripe_event_duplicate");
        return Ok(StatusCode::OK);
    }

    match process_event(state.updater.as_ref(), &event).await {
        Ok(outcome) => {
            info!(
                event_id = %event.id,
                license_issued = matches!(outcome, EventOutcome::LicenseIssued { .. }),
                "stripe_event_acknowledged"
            );
            Ok(StatusCode::OK)
        }
        Err(e) => {
            error!(
                event_id = %event.id,
                event_type = %event.event_type,
                error = %e,
                error_detail = ?e,
                "stripe_webhook_failed"
            );
            Err(WebhookError::Processing(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use axum::{
        body::Body,
        http::{Request, Response},
        Router,
    };
    use tower::ServiceExt;

    use super::*;
    use crate::process::tests::RecordingUpdater;
    use crate::stripe::compute_signature;
    use crate::web::router;

    const SECRET: &str = "whsec_handler_test";

    fn config(secret: Option<&str>) -> Config {
        Config {
            stripe_webhook_secret: secret.map(str::to_string),
            ..Config::default()
        }
    }

    fn test_app(secret: Option<&str>, updater: Arc<RecordingUpdater>) -> (Router, AppState) {
        let state = AppState::new(&config(secret), updater);
        (router(state.clone(), None), state)
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    fn event_json(id: &str, event_type: &str) -> String {
        serde_json::json!({
            "id": id,
            "object": "event",
            "type": event_type,
            "api_version": "2019-12-03",
            "created": now(),
            "livemode": false,
            "data": {
                "object": {
                    "id": "sub_123",
                    "object": "subscription",
                    "customer": "cus_456",
                    "status": "active",
                    "metadata": {}
                }
            }
        })
        .to_string()
    }

    fn signed_header(payload: impl AsRef<[u8]>) -> String {
        let t = now();
        format!("t={},v1={}", t, compute_signature(SECRET, t, payload.as_ref()))
    }

    fn webhook_request(payload: impl AsRef<[u8]>, signature: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/webhooks/stripe")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        builder.body(Body::from(payload.as_ref().to_vec())).unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, String) {
        let response: Response<Body> = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = test_app(None, Arc::new(RecordingUpdater::default()));
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"status":"ok"}"#);
    }

    #[tokio::test]
    async fn test_missing_signature_header() {
        let updater = Arc::new(RecordingUpdater::default());
        let (app, state) = test_app(Some(SECRET), updater.clone());
        let payload = event_json("evt_missing", "customer.subscription.created");

        let (status, body) = send(app, webhook_request(&payload, None)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Missing Stripe-Signature header");
        assert!(state.processed.is_empty());
        assert!(updater.calls().is_empty());
    }

    #[tokio::test]
    async fn test_blank_signature_header() {
        let (app, state) = test_app(Some(SECRET), Arc::new(RecordingUpdater::default()));
        let payload = event_json("evt_blank", "customer.subscription.created");

        let (status, body) = send(app, webhook_request(&payload, Some("  "))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Missing Stripe-Signature header");
        assert!(state.processed.is_empty());
    }

    #[tokio::test]
    async fn test_secret_not_configured() {
        let updater = Arc::new(RecordingUpdater::default());
        let (app, state) = test_app(None, updater.clone());
        let payload = event_json("evt_nosecret", "customer.subscription.created");

        // A garbage signature would be a 400 if verification ran.
        let (status, body) = send(app, webhook_request(&payload, Some("t=1,v1=00"))).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.is_empty());
        assert!(state.processed.is_empty());
        assert!(updater.calls().is_empty());
    }

    #[tokio::test]
    async fn test_blank_secret_treated_as_unset() {
        let (app, _) = test_app(Some("   "), Arc::new(RecordingUpdater::default()));
        let payload = event_json("evt_blank_secret", "invoice.paid");

        let (status, _) = send(app, webhook_request(&payload, Some(&signed_header(&payload)))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_invalid_signature() {
        let updater = Arc::new(RecordingUpdater::default());
        let (app, state) = test_app(Some(SECRET), updater.clone());
        let payload = event_json("evt_forged", "customer.subscription.created");
        let forged = format!("t={},v1={}", now(), "ab".repeat(32));

        let (status, body) = send(app, webhook_request(&payload, Some(&forged))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            "Webhook signature verification failed: No signatures found matching the expected signature for payload"
        );
        assert!(state.processed.is_empty());
        assert!(updater.calls().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_signature_header() {
        let (app, state) = test_app(Some(SECRET), Arc::new(RecordingUpdater::default()));
        let payload = event_json("evt_malformed", "invoice.paid");

        let (status, body) = send(app, webhook_request(&payload, Some("not-a-signature"))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.starts_with("Webhook signature verification failed: "));
        assert!(state.processed.is_empty());
    }

    #[tokio::test]
    async fn test_signed_non_event_payload() {
        let (app, state) = test_app(Some(SECRET), Arc::new(RecordingUpdater::default()));
        let payload = r#"{"hello":"world"}"#;

        let (status, body) = send(app, webhook_request(payload, Some(&signed_header(payload)))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.starts_with("Webhook signature verification failed: Invalid JSON payload"));
        assert!(state.processed.is_empty());
    }

    #[tokio::test]
    async fn test_non_utf8_body_without_signature() {
        let updater = Arc::new(RecordingUpdater::default());
        let (app, state) = test_app(Some(SECRET), updater.clone());
        let payload: &[u8] = b"{\xff\xfe}";

        let (status, body) = send(app, webhook_request(payload, None)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Missing Stripe-Signature header");
        assert!(state.processed.is_empty());
        assert!(updater.calls().is_empty());
    }

    #[tokio::test]
    async fn test_non_utf8_body_with_valid_signature() {
        let updater = Arc::new(RecordingUpdater::default());
        let (app, state) = test_app(Some(SECRET), updater.clone());
        let payload: &[u8] = b"{\xff\xfe}";

        let (status, body) =
            send(app, webhook_request(payload, Some(&signed_header(payload)))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.starts_with("Webhook signature verification failed: Invalid JSON payload"));
        assert!(state.processed.is_empty());
        assert!(updater.calls().is_empty());
    }

    #[tokio::test]
    async fn test_subscription_created_issues_license() {
        let updater = Arc::new(RecordingUpdater::default());
        let (app, state) = test_app(Some(SECRET), updater.clone());
        let payload = event_json("evt_created", "customer.subscription.created");

        let (status, body) = send(app, webhook_request(&payload, Some(&signed_header(&payload)))).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
        assert!(state.processed.contains("evt_created"));

        let calls = updater.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "sub_123");
        assert_eq!(calls[0].1.len(), 1);
        let (key, license) = &calls[0].1[0];
        assert_eq!(key, "license_key");
        assert_eq!(license, &license.to_uppercase());
        assert_eq!(license.len(), 36);
    }

    #[tokio::test]
    async fn test_other_event_types_acknowledged_without_update() {
        let updater = Arc::new(RecordingUpdater::default());
        let (app, state) = test_app(Some(SECRET), updater.clone());

        for (id, event_type) in [
            ("evt_a", "customer.subscription.updated"),
            ("evt_b", "invoice.payment_succeeded"),
            ("evt_c", "checkout.session.completed"),
        ] {
            let payload = event_json(id, event_type);
            let (status, _) =
                send(app.clone(), webhook_request(&payload, Some(&signed_header(&payload)))).await;
            assert_eq!(status, StatusCode::OK);
        }

        assert_eq!(state.processed.len(), 3);
        assert!(updater.calls().is_empty());
    }

    #[tokio::test]
    async fn test_subscription_created_without_subscription_object() {
        let updater = Arc::new(RecordingUpdater::default());
        let (app, _) = test_app(Some(SECRET), updater.clone());
        let payload = serde_json::json!({
            "id": "evt_odd",
            "type": "customer.subscription.created",
            "data": { "object": { "id": "cus_1", "object": "customer" } }
        })
        .to_string();

        let (status, _) = send(app, webhook_request(&payload, Some(&signed_header(&payload)))).await;

        assert_eq!(status, StatusCode::OK);
        assert!(updater.calls().is_empty());
    }

    #[tokio::test]
    async fn test_replay_is_a_no_op() {
        let updater = Arc::new(RecordingUpdater::default());
        let (app, state) = test_app(Some(SECRET), updater.clone());
        let payload = event_json("evt_replayed", "customer.subscription.created");

        for _ in 0..5 {
            let (status, body) =
                send(app.clone(), webhook_request(&payload, Some(&signed_header(&payload)))).await;
            assert_eq!(status, StatusCode::OK);
            assert!(body.is_empty());
        }

        assert_eq!(updater.calls().len(), 1);
        assert_eq!(state.processed.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_deliveries_issue_one_license() {
        let updater = Arc::new(RecordingUpdater::default());
        let (app, _) = test_app(Some(SECRET), updater.clone());
        let payload = event_json("evt_raced", "customer.subscription.created");
        let header = signed_header(&payload);

        let deliveries: Vec<_> = (0..16)
            .map(|_| {
                let app = app.clone();
                let request = webhook_request(&payload, Some(&header));
                tokio::spawn(async move { send(app, request).await })
            })
            .collect();

        let results = futures::future::join_all(deliveries).await;

        for result in results {
            let (status, _) = result.unwrap();
            assert_eq!(status, StatusCode::OK);
        }
        assert_eq!(updater.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_update_failure_returns_500_and_is_not_retried() {
        let updater = Arc::new(RecordingUpdater::failing());
        let (app, state) = test_app(Some(SECRET), updater.clone());
        let payload = event_json("evt_fails", "customer.subscription.created");

        let (status, body) =
            send(app.clone(), webhook_request(&payload, Some(&signed_header(&payload)))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.is_empty());
        assert!(state.processed.contains("evt_fails"));

        // Stripe's redelivery lands on the already-recorded id.
        let (status, _) = send(app, webhook_request(&payload, Some(&signed_header(&payload)))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updater.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_body_limit_when_configured() {
        let state = AppState::new(&config(Some(SECRET)), Arc::new(RecordingUpdater::default()));
        let app = router(state.clone(), Some(64));
        let payload = event_json("evt_big", "invoice.paid");
        assert!(payload.len() > 64);

        let (status, _) = send(app, webhook_request(&payload, Some(&signed_header(&payload)))).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(state.processed.is_empty());
    }
}
