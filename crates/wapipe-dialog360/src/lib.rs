// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! 360dialog provider for wapipe.
//!
//! Messages go through the 360dialog relay with a channel API key, using
//! the Cloud API message schema. With partner credentials configured the
//! adapter also provisions, verifies and releases numbers through the
//! partner hub.

pub mod hub;
pub mod provider;

pub use hub::PartnerHub;
pub use provider::Dialog360Provider;
