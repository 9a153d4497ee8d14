// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background workers for the wapipe queue.
//!
//! [`Dispatcher`] drains due messages to each tenant's provider under the
//! rate limiter, turning send outcomes into status changes and retries.
//! [`run_sweeper`] expires stale messages and prunes finished ones.

pub mod dispatcher;
pub mod metrics;
pub mod sweeper;

pub use dispatcher::{DispatchReport, Dispatcher, Disposition};
pub use metrics::register_metrics;
pub use sweeper::run_sweeper;
