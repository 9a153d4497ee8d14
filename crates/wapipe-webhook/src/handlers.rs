// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP handlers for webhooks and the queue API.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use wapipe_core::{MessagePayload, MessageStatus, Priority, QueuedMessage, WapipeError};
use wapipe_queue::EnqueueRequest;

use crate::metrics;
use crate::server::AppState;

/// Maps a [`WapipeError`] onto an HTTP status with a JSON body.
#[derive(Debug)]
pub struct ApiError(pub WapipeError);

impl From<WapipeError> for ApiError {
    fn from(e: WapipeError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            WapipeError::Invalid(_) => StatusCode::BAD_REQUEST,
            WapipeError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            WapipeError::NotFound { .. } => StatusCode::NOT_FOUND,
            WapipeError::Duplicate { .. } => StatusCode::CONFLICT,
            WapipeError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode", default)]
    pub mode: String,
    #[serde(rename = "hub.verify_token", default)]
    pub verify_token: String,
    #[serde(rename = "hub.challenge", default)]
    pub challenge: String,
}

/// GET /webhooks/{tenant}: subscription handshake. Echoes the challenge.
pub async fn verify_webhook(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    match state.processor.verify_subscription(
        &tenant_id,
        &query.mode,
        &query.verify_token,
        &query.challenge,
    ) {
        Ok(challenge) => (StatusCode::OK, challenge).into_response(),
        Err(WapipeError::NotFound { .. }) => StatusCode::NOT_FOUND.into_response(),
        Err(_) => StatusCode::FORBIDDEN.into_response(),
    }
}

/// POST /webhooks/{tenant}: raw body, so the signature covers exactly the
/// bytes received.
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let signature = state
        .processor
        .signature_header(&tenant_id)
        .and_then(|name| headers.get(name))
        .and_then(|v| v.to_str().ok());

    match state.processor.process(&tenant_id, &body, signature).await {
        Ok(outcome) => {
            metrics::record_webhook(&tenant_id, outcome.as_str());
            Ok(Json(json!({ "status": outcome.as_str() })))
        }
        Err(e) => {
            let outcome = match e {
                WapipeError::Unauthorized(_) => "unauthorized",
                _ => "error",
            };
            metrics::record_webhook(&tenant_id, outcome);
            Err(e.into())
        }
    }
}

/// Body of `POST /v1/tenants/{tenant}/messages`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnqueueBody {
    pub to: String,
    pub payload: MessagePayload,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub reply_to: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageView {
    pub id: String,
    pub tenant_id: String,
    pub status: MessageStatus,
    pub priority: Priority,
    pub retry_count: u32,
    pub scheduled_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl From<QueuedMessage> for MessageView {
    fn from(m: QueuedMessage) -> Self {
        Self {
            id: m.id,
            tenant_id: m.tenant_id,
            status: m.status,
            priority: m.priority,
            retry_count: m.retry_count,
            scheduled_at: m.scheduled_at,
            expires_at: m.expires_at,
            provider_message_id: m.provider_message_id,
            last_error: m.last_error,
        }
    }
}

/// POST /v1/tenants/{tenant}/messages
pub async fn enqueue_message(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Json(body): Json<EnqueueBody>,
) -> Result<(StatusCode, Json<MessageView>), ApiError> {
    state.registry.require(&tenant_id)?;
    let request = EnqueueRequest {
        tenant_id: tenant_id.clone(),
        customer_id: body.customer_id,
        to: body.to,
        payload: body.payload,
        priority: body.priority,
        scheduled_at: body.scheduled_at,
        expires_at: body.expires_at,
        max_retries: body.max_retries,
        idempotency_key: body.idempotency_key,
        reply_to: body.reply_to,
    };
    let message = state.queue.enqueue(request).await?;
    metrics::record_enqueued(&tenant_id);
    Ok((StatusCode::ACCEPTED, Json(message.into())))
}

/// GET /v1/messages/{id}
pub async fn get_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageView>, ApiError> {
    let message = state
        .queue
        .get(&id)
        .await?
        .ok_or(WapipeError::NotFound {
            entity: "message",
            id,
        })?;
    Ok(Json(message.into()))
}

/// DELETE /v1/messages/{id}: 409 once the message is in flight or done.
pub async fn cancel_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    if state.queue.cancel(&id).await? {
        return Ok((StatusCode::OK, Json(json!({ "id": id, "cancelled": true }))).into_response());
    }
    match state.queue.get(&id).await? {
        Some(message) => Ok((
            StatusCode::CONFLICT,
            Json(json!({
                "id": id,
                "cancelled": false,
                "status": message.status,
            })),
        )
            .into_response()),
        None => Err(WapipeError::NotFound {
            entity: "message",
            id,
        }
        .into()),
    }
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(default)]
    pub tenant: Option<String>,
}

/// GET /v1/stats
pub async fn get_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<Response, ApiError> {
    let stats = state.queue.statistics(query.tenant.as_deref()).await?;
    Ok(Json(stats).into_response())
}

/// GET /health (unauthenticated)
pub async fn get_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let limiter = state.queue.limiter().global().status();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.health.start_time.elapsed().as_secs(),
        "tenants": state.registry.len(),
        "rate_limit": {
            "tokens": limiter.tokens,
            "queued": limiter.queued,
            "sent_this_second": limiter.sent_this_second,
        },
    }))
}

/// GET /metrics (unauthenticated). 404 when no exporter is installed.
pub async fn get_metrics(State(state): State<AppState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
