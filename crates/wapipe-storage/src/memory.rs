// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process message store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use wapipe_core::traits::GroupCount;
use wapipe_core::{
    AdapterType, GroupField, HealthStatus, MessageFilter, MessageOrder, MessagePatch,
    MessageStore, PluginAdapter, QueuedMessage, WapipeError,
};

/// Message store held entirely in memory.
///
/// Used on its own when durability is off, and as the fallback behind
/// [`FallbackStore`](crate::FallbackStore). Unlike durable stores it prunes
/// old terminal messages.
#[derive(Default)]
pub struct InMemoryStore {
    messages: Mutex<HashMap<String, QueuedMessage>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, QueuedMessage>> {
        self.messages.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PluginAdapter for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Store
    }

    async fn health_check(&self) -> Result<HealthStatus, WapipeError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), WapipeError> {
        Ok(())
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn create(&self, message: &QueuedMessage) -> Result<(), WapipeError> {
        let mut messages = self.lock();
        if messages.contains_key(&message.id) {
            return Err(WapipeError::Duplicate {
                entity: "message id",
                key: message.id.clone(),
            });
        }
        if let Some(key) = &message.idempotency_key
            && messages.values().any(|m| {
                m.tenant_id == message.tenant_id && m.idempotency_key.as_ref() == Some(key)
            })
        {
            return Err(WapipeError::Duplicate {
                entity: "idempotency key",
                key: format!("{}/{key}", message.tenant_id),
            });
        }
        messages.insert(message.id.clone(), message.clone());
        Ok(())
    }

    async fn find_many(
        &self,
        filter: &MessageFilter,
        order: MessageOrder,
        limit: Option<usize>,
    ) -> Result<Vec<QueuedMessage>, WapipeError> {
        let mut found: Vec<QueuedMessage> = self
            .lock()
            .values()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();
        found.sort_by(|a, b| order.compare(a, b));
        if let Some(limit) = limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn update(&self, id: &str, patch: &MessagePatch) -> Result<bool, WapipeError> {
        match self.lock().get_mut(id) {
            Some(message) => {
                patch.apply(message);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_many(
        &self,
        filter: &MessageFilter,
        patch: &MessagePatch,
    ) -> Result<u64, WapipeError> {
        let mut changed = 0;
        for message in self.lock().values_mut().filter(|m| filter.matches(m)) {
            patch.apply(message);
            changed += 1;
        }
        Ok(changed)
    }

    async fn count(&self, filter: &MessageFilter) -> Result<u64, WapipeError> {
        Ok(self.lock().values().filter(|m| filter.matches(m)).count() as u64)
    }

    async fn group_by(
        &self,
        field: GroupField,
        filter: &MessageFilter,
    ) -> Result<Vec<GroupCount>, WapipeError> {
        let mut groups: BTreeMap<String, u64> = BTreeMap::new();
        for message in self.lock().values().filter(|m| filter.matches(m)) {
            *groups.entry(field.key_of(message)).or_default() += 1;
        }
        Ok(groups.into_iter().collect())
    }

    async fn prune_terminal(&self, before: DateTime<Utc>) -> Result<u64, WapipeError> {
        let mut messages = self.lock();
        let start = messages.len();
        messages.retain(|_, m| {
            !(m.status.is_terminal() && m.processed_at.is_some_and(|at| at < before))
        });
        let pruned = (start - messages.len()) as u64;
        if pruned > 0 {
            debug!(pruned, "pruned terminal messages from memory");
        }
        Ok(pruned)
    }
}
