// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for wapipe integration tests.

pub mod failing_store;
pub mod fixtures;
pub mod mock_provider;

pub use failing_store::FailingStore;
pub use mock_provider::{MockProvider, MockSend};
