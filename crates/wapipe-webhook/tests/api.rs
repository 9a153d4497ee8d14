// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Routes exercised in-process through `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use chrono::Utc;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tower::ServiceExt;
use wapipe_config::{QueueConfig, RateLimitConfig};
use wapipe_core::types::InboundContent;
use wapipe_core::{InboundMessage, MessageStatusUpdate, ProviderRegistry, WapipeError};
use wapipe_queue::MessageQueue;
use wapipe_ratelimit::TenantRateLimiter;
use wapipe_storage::InMemoryStore;
use wapipe_test_utils::MockProvider;
use wapipe_webhook::{AppState, AuthConfig, HealthState, InboundSink, WebhookProcessor, router};

const TOKEN: &str = "api-token";

#[derive(Default)]
struct RecordingSink {
    messages: Mutex<Vec<(String, InboundMessage)>>,
}

#[async_trait]
impl InboundSink for RecordingSink {
    async fn on_message(
        &self,
        tenant_id: &str,
        message: InboundMessage,
    ) -> Result<(), WapipeError> {
        self.messages
            .lock()
            .await
            .push((tenant_id.to_string(), message));
        Ok(())
    }

    async fn on_status(
        &self,
        _tenant_id: &str,
        _update: MessageStatusUpdate,
    ) -> Result<(), WapipeError> {
        Ok(())
    }
}

struct TestApp {
    app: Router,
    sink: Arc<RecordingSink>,
}

fn inbound() -> InboundMessage {
    InboundMessage {
        provider_message_id: "wamid.IN".into(),
        from: "15550001111".into(),
        to: "PNID".into(),
        contact_name: Some("Ada".into()),
        timestamp: Utc::now(),
        content: InboundContent::Text {
            body: "hello".into(),
        },
        context: None,
    }
}

fn test_app_with(provider: MockProvider, bearer_token: Option<&str>) -> TestApp {
    let mut registry = ProviderRegistry::new();
    registry.register("acme", Arc::new(provider));
    let registry = Arc::new(registry);

    let limits = RateLimitConfig::default();
    let queue = Arc::new(MessageQueue::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(TenantRateLimiter::new(&limits)),
        QueueConfig::default(),
    ));
    let sink = Arc::new(RecordingSink::default());
    let processor = Arc::new(WebhookProcessor::new(registry.clone(), sink.clone()));

    let app = router(AppState {
        queue,
        registry,
        processor,
        auth: AuthConfig {
            bearer_token: bearer_token.map(str::to_string),
        },
        health: HealthState::new(),
    });
    TestApp { app, sink }
}

fn test_app() -> TestApp {
    test_app_with(MockProvider::new().with_inbound(inbound()), Some(TOKEN))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn authed(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"));
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

#[tokio::test]
async fn health_is_public() {
    let t = test_app();
    let (status, body) = send(
        &t.app,
        Request::get("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["tenants"], 1);
}

#[tokio::test]
async fn api_requires_matching_bearer_token() {
    let t = test_app();
    let (status, _) = send(
        &t.app,
        Request::get("/v1/stats").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &t.app,
        Request::get("/v1/stats")
            .header(header::AUTHORIZATION, "Bearer wrong-token")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&t.app, authed("GET", "/v1/stats", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["health"], "healthy");
}

#[tokio::test]
async fn api_without_configured_token_fails_closed() {
    let t = test_app_with(MockProvider::new(), None);
    let (status, _) = send(&t.app, authed("GET", "/v1/stats", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn enqueue_then_cancel() {
    let t = test_app();
    let (status, body) = send(
        &t.app,
        authed(
            "POST",
            "/v1/tenants/acme/messages",
            Some(json!({
                "to": "+1 (555) 000-1111",
                "payload": { "type": "text", "body": "Your order shipped" },
                "priority": "high",
                "idempotency_key": "order-17"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "queued");
    assert_eq!(body["priority"], "high");
    let id = body["id"].as_str().unwrap().to_string();

    let (status, body) = send(&t.app, authed("GET", &format!("/v1/messages/{id}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tenant_id"], "acme");

    let (status, body) =
        send(&t.app, authed("DELETE", &format!("/v1/messages/{id}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cancelled"], true);

    let (status, body) =
        send(&t.app, authed("DELETE", &format!("/v1/messages/{id}"), None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], "expired");

    let (status, _) = send(&t.app, authed("DELETE", "/v1/messages/missing", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn repeated_idempotency_key_returns_the_first_message() {
    let t = test_app();
    let request = || {
        authed(
            "POST",
            "/v1/tenants/acme/messages",
            Some(json!({
                "to": "15550001111",
                "payload": { "type": "text", "body": "Your code is 4711" },
                "idempotency_key": "otp-4711"
            })),
        )
    };
    let (status, first) = send(&t.app, request()).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let (status, second) = send(&t.app, request()).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(second["id"], first["id"]);

    let (_, stats) = send(&t.app, authed("GET", "/v1/stats", None)).await;
    assert_eq!(stats["total"], 1);
}

#[tokio::test]
async fn enqueue_rejects_bad_input_and_unknown_tenants() {
    let t = test_app();
    let message = json!({
        "to": "12",
        "payload": { "type": "text", "body": "hi" }
    });
    let (status, body) = send(
        &t.app,
        authed("POST", "/v1/tenants/acme/messages", Some(message.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("invalid request"));

    let (status, _) = send(
        &t.app,
        authed("POST", "/v1/tenants/initech/messages", Some(message)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn webhook_handshake_echoes_challenge() {
    let t = test_app();
    let response = t
        .app
        .clone()
        .oneshot(
            Request::get(
                "/webhooks/acme?hub.mode=subscribe&hub.verify_token=mock-verify&hub.challenge=1158201444",
            )
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"1158201444");

    let (status, _) = send(
        &t.app,
        Request::get("/webhooks/acme?hub.mode=subscribe&hub.verify_token=nope&hub.challenge=1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn webhook_delivers_inbound_to_sink() {
    let t = test_app();
    let (status, body) = send(
        &t.app,
        Request::post("/webhooks/acme")
            .header("x-hub-signature-256", "sha256=ignored-by-mock")
            .body(Body::from(r#"{"object":"whatsapp_business_account"}"#))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "inbound");

    let received = t.sink.messages.lock().await;
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].0, "acme");
    assert_eq!(received[0].1.provider_message_id, "wamid.IN");
}

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected() {
    let provider = MockProvider::new()
        .with_inbound(inbound())
        .rejecting_signatures();
    let t = test_app_with(provider, Some(TOKEN));
    let (status, _) = send(
        &t.app,
        Request::post("/webhooks/acme")
            .header("x-hub-signature-256", "sha256=00")
            .body(Body::from("{}"))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(t.sink.messages.lock().await.is_empty());
}

#[tokio::test]
async fn metrics_without_exporter_is_not_found() {
    let t = test_app();
    let (status, _) = send(
        &t.app,
        Request::get("/metrics").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
