// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the wapipe messaging pipeline.
//!
//! This crate provides the canonical message model, the provider and store
//! adapter traits, the error type, and small shared utilities (clock,
//! signature verification, provider registry) used throughout the workspace.

pub mod clock;
pub mod error;
pub mod registry;
pub mod signature;
pub mod traits;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::WapipeError;
pub use registry::ProviderRegistry;
pub use signature::{sign_hmac_sha256, verify_hmac_sha256};
pub use types::{
    AdapterType, Capability, HealthStatus, InboundMessage, MessagePayload, MessageStatus,
    MessageStatusUpdate, OutboundMessage, Priority, ProviderKind, QueuedMessage, SendFailure,
    SendOutcome,
};

pub use traits::{
    GroupField, MessageFilter, MessageOrder, MessagePatch, MessageStore, PluginAdapter,
    ProviderAdapter,
};
