// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A message store whose every operation fails.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use wapipe_core::traits::GroupCount;
use wapipe_core::{
    AdapterType, GroupField, HealthStatus, MessageFilter, MessageOrder, MessagePatch,
    MessageStore, PluginAdapter, QueuedMessage, WapipeError,
};

/// Stands in for an unreachable database.
#[derive(Default)]
pub struct FailingStore {
    calls: AtomicU64,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of operations attempted against this store.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> Result<T, WapipeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(WapipeError::Storage {
            source: "database unreachable".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for FailingStore {
    fn name(&self) -> &str {
        "failing"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Store
    }

    async fn health_check(&self) -> Result<HealthStatus, WapipeError> {
        Ok(HealthStatus::Unhealthy("database unreachable".into()))
    }

    async fn shutdown(&self) -> Result<(), WapipeError> {
        Ok(())
    }
}

#[async_trait]
impl MessageStore for FailingStore {
    async fn create(&self, _message: &QueuedMessage) -> Result<(), WapipeError> {
        self.fail()
    }

    async fn find_many(
        &self,
        _filter: &MessageFilter,
        _order: MessageOrder,
        _limit: Option<usize>,
    ) -> Result<Vec<QueuedMessage>, WapipeError> {
        self.fail()
    }

    async fn update(&self, _id: &str, _patch: &MessagePatch) -> Result<bool, WapipeError> {
        self.fail()
    }

    async fn update_many(
        &self,
        _filter: &MessageFilter,
        _patch: &MessagePatch,
    ) -> Result<u64, WapipeError> {
        self.fail()
    }

    async fn count(&self, _filter: &MessageFilter) -> Result<u64, WapipeError> {
        self.fail()
    }

    async fn group_by(
        &self,
        _field: GroupField,
        _filter: &MessageFilter,
    ) -> Result<Vec<GroupCount>, WapipeError> {
        self.fail()
    }
}
