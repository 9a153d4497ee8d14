// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the wapipe messaging pipeline.
//!
//! Ordinary control-flow outcomes (rate limiting, exhausted retries, expiry,
//! unsupported provider operations) are typed results, not errors. This enum
//! is reserved for infrastructure faults and rejected input.

use thiserror::Error;

/// The primary error type used across all wapipe crates.
#[derive(Debug, Error)]
pub enum WapipeError {
    /// Configuration errors (missing credentials, invalid values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Message store errors (database unreachable, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Provider API errors that are not part of a send outcome
    /// (provisioning, account lookups, malformed responses).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A request was rejected before reaching the queue (bad recipient,
    /// expiry already passed).
    #[error("invalid request: {0}")]
    Invalid(String),

    /// Webhook signature verification failed or an API credential was rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A uniqueness constraint rejected a write, e.g. a reused idempotency key.
    #[error("duplicate {entity}: {key}")]
    Duplicate { entity: &'static str, key: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl WapipeError {
    /// Wraps any error as a storage fault.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        WapipeError::Storage {
            source: Box::new(err),
        }
    }

    /// Builds a provider error from a message without an underlying cause.
    pub fn provider(message: impl Into<String>) -> Self {
        WapipeError::Provider {
            message: message.into(),
            source: None,
        }
    }
}
