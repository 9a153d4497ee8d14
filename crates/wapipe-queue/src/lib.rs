// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Priority message queue for outbound WhatsApp messages.
//!
//! [`MessageQueue`] owns a message from `enqueue` until it reaches a terminal
//! status. Work is ordered by priority, then by scheduled time, and batches
//! skip tenants whose per-minute window is already full. Failed sends are
//! rescheduled along a fixed backoff table until the retry budget runs out.

pub mod queue;
pub mod request;
pub mod stats;

pub use queue::{MessageQueue, StatusDetails, SweepReport};
pub use request::{EnqueueRequest, normalize_recipient};
pub use stats::{QueueHealth, QueueStatistics};
