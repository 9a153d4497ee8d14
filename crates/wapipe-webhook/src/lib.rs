// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook ingestion and the HTTP API.
//!
//! [`WebhookProcessor`] verifies and parses provider webhooks and hands the
//! result to an [`InboundSink`]. [`server`] exposes it over axum together with
//! the queue's enqueue, cancel and statistics operations.

pub mod auth;
pub mod handlers;
pub mod metrics;
pub mod processor;
pub mod server;
pub mod sink;

pub use auth::AuthConfig;
pub use metrics::register_metrics;
pub use processor::{WebhookOutcome, WebhookProcessor};
pub use server::{AppState, HealthState, ServerConfig, router, start_server};
pub use sink::{InboundSink, LoggingSink};
