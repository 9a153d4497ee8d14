// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable store with an in-process fallback.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;
use wapipe_core::traits::GroupCount;
use wapipe_core::{
    AdapterType, GroupField, HealthStatus, MessageFilter, MessageOrder, MessagePatch,
    MessageStore, PluginAdapter, QueuedMessage, WapipeError,
};

/// Routes every operation to a primary store and degrades to a fallback
/// store when the primary fails.
///
/// Each degradation logs a warning. Reads merge both stores so messages
/// written during an outage stay visible. Updates for messages the primary
/// does not hold go to the fallback.
pub struct FallbackStore {
    primary: Arc<dyn MessageStore>,
    fallback: Arc<dyn MessageStore>,
}

impl FallbackStore {
    pub fn new(primary: Arc<dyn MessageStore>, fallback: Arc<dyn MessageStore>) -> Self {
        Self { primary, fallback }
    }

    fn degraded(&self, operation: &'static str, error: &WapipeError) {
        warn!(
            operation,
            primary = self.primary.name(),
            error = %error,
            "primary message store failed, using in-process fallback"
        );
    }

    /// Primary result, or `default` after logging the failure.
    fn or_degraded<T>(
        &self,
        operation: &'static str,
        result: Result<T, WapipeError>,
        default: T,
    ) -> T {
        result.unwrap_or_else(|e| {
            self.degraded(operation, &e);
            default
        })
    }
}

#[async_trait]
impl PluginAdapter for FallbackStore {
    fn name(&self) -> &str {
        "fallback"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Store
    }

    async fn health_check(&self) -> Result<HealthStatus, WapipeError> {
        match self.primary.health_check().await {
            Ok(HealthStatus::Healthy) => Ok(HealthStatus::Healthy),
            Ok(HealthStatus::Degraded(reason)) | Ok(HealthStatus::Unhealthy(reason)) => Ok(
                HealthStatus::Degraded(format!("primary store: {reason}")),
            ),
            Err(e) => Ok(HealthStatus::Degraded(format!("primary store: {e}"))),
        }
    }

    async fn shutdown(&self) -> Result<(), WapipeError> {
        self.primary.shutdown().await?;
        self.fallback.shutdown().await
    }
}

#[async_trait]
impl MessageStore for FallbackStore {
    async fn create(&self, message: &QueuedMessage) -> Result<(), WapipeError> {
        match self.primary.create(message).await {
            Ok(()) => Ok(()),
            // The primary is up and said no.
            Err(e @ WapipeError::Duplicate { .. }) => Err(e),
            Err(e) => {
                self.degraded("create", &e);
                self.fallback.create(message).await
            }
        }
    }

    async fn find_many(
        &self,
        filter: &MessageFilter,
        order: MessageOrder,
        limit: Option<usize>,
    ) -> Result<Vec<QueuedMessage>, WapipeError> {
        let primary = self.primary.find_many(filter, order, limit).await;
        let mut merged = self.or_degraded("find_many", primary, Vec::new());
        let fallback = self.fallback.find_many(filter, order, limit).await?;
        if !fallback.is_empty() {
            let seen: HashSet<String> = merged.iter().map(|m| m.id.clone()).collect();
            merged.extend(fallback.into_iter().filter(|m| !seen.contains(&m.id)));
            merged.sort_by(|a, b| order.compare(a, b));
        }
        if let Some(limit) = limit {
            merged.truncate(limit);
        }
        Ok(merged)
    }

    async fn update(&self, id: &str, patch: &MessagePatch) -> Result<bool, WapipeError> {
        match self.primary.update(id, patch).await {
            Ok(true) => Ok(true),
            Ok(false) => self.fallback.update(id, patch).await,
            Err(e) => {
                self.degraded("update", &e);
                self.fallback.update(id, patch).await
            }
        }
    }

    async fn update_many(
        &self,
        filter: &MessageFilter,
        patch: &MessagePatch,
    ) -> Result<u64, WapipeError> {
        let primary = self.primary.update_many(filter, patch).await;
        let primary = self.or_degraded("update_many", primary, 0);
        Ok(primary + self.fallback.update_many(filter, patch).await?)
    }

    async fn count(&self, filter: &MessageFilter) -> Result<u64, WapipeError> {
        let primary = self.primary.count(filter).await;
        let primary = self.or_degraded("count", primary, 0);
        Ok(primary + self.fallback.count(filter).await?)
    }

    async fn group_by(
        &self,
        field: GroupField,
        filter: &MessageFilter,
    ) -> Result<Vec<GroupCount>, WapipeError> {
        let primary = self.primary.group_by(field, filter).await;
        let primary = self.or_degraded("group_by", primary, Vec::new());
        let mut groups: BTreeMap<String, u64> = BTreeMap::new();
        for (key, count) in primary
            .into_iter()
            .chain(self.fallback.group_by(field, filter).await?)
        {
            *groups.entry(key).or_default() += count;
        }
        Ok(groups.into_iter().collect())
    }

    /// Prunes the fallback only; the primary keeps its history.
    async fn prune_terminal(&self, before: DateTime<Utc>) -> Result<u64, WapipeError> {
        self.fallback.prune_terminal(before).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryStore;
    use tracing_test::traced_test;
    use wapipe_core::MessageStatus;
    use wapipe_test_utils::FailingStore;
    use wapipe_test_utils::fixtures::queued_message;

    #[tokio::test]
    #[traced_test]
    async fn duplicate_rejection_is_not_a_degradation() {
        let primary = Arc::new(InMemoryStore::new());
        let fallback = Arc::new(InMemoryStore::new());
        let store = FallbackStore::new(primary.clone(), fallback.clone());

        let mut first = queued_message("m-1", "acme", Utc::now());
        first.idempotency_key = Some("order-7".into());
        store.create(&first).await.unwrap();

        let mut replay = queued_message("m-2", "acme", Utc::now());
        replay.idempotency_key = Some("order-7".into());
        let err = store.create(&replay).await.unwrap_err();
        assert!(matches!(err, WapipeError::Duplicate { .. }));
        assert_eq!(primary.len(), 1);
        assert_eq!(fallback.len(), 0);
        assert!(!logs_contain("primary message store failed"));
    }

    #[tokio::test]
    #[traced_test]
    async fn failing_primary_degrades_to_memory_with_a_warning() {
        let primary = Arc::new(FailingStore::new());
        let fallback = Arc::new(InMemoryStore::new());
        let store = FallbackStore::new(primary.clone(), fallback.clone());

        store
            .create(&queued_message("m-1", "acme", Utc::now()))
            .await
            .expect("fallback accepts the write");
        assert_eq!(fallback.len(), 1);
        assert!(logs_contain("primary message store failed"));
        assert!(logs_contain("operation=\"create\""));

        let found = store
            .find_many(&MessageFilter::default(), MessageOrder::Dispatch, None)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        assert!(
            store
                .update("m-1", &MessagePatch::status(MessageStatus::Sent))
                .await
                .unwrap()
        );
        assert_eq!(store.count(&MessageFilter::default()).await.unwrap(), 1);
        assert_eq!(primary.calls(), 4);

        match store.health_check().await.unwrap() {
            HealthStatus::Degraded(reason) => assert!(reason.contains("primary store")),
            other => panic!("expected degraded health, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fallback_errors_still_surface() {
        let store = FallbackStore::new(Arc::new(FailingStore::new()), Arc::new(FailingStore::new()));
        assert!(
            store
                .create(&queued_message("m-1", "acme", Utc::now()))
                .await
                .is_err()
        );
    }
}
