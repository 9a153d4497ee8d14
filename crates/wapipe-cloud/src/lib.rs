// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp Cloud API provider for wapipe.
//!
//! [`CloudApiProvider`] talks to the Graph API directly with a business
//! access token. It sends messages and reports account status, but cannot
//! provision numbers.
//!
//! The [`wire`], [`webhook`] and [`classify`] modules hold the Cloud API
//! message schema. 360dialog relays the same schema, so its adapter reuses
//! them.

pub mod classify;
pub mod provider;
pub mod webhook;
pub mod wire;

pub use classify::{RETRYABLE_GRAPH_CODES, is_retryable, is_retryable_http};
pub use provider::CloudApiProvider;
