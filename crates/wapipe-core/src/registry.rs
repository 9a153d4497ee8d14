// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tenant to provider lookup.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::WapipeError;
use crate::traits::{PluginAdapter, ProviderAdapter};

/// Maps each tenant to the provider adapter that sends on its behalf.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the provider for `tenant_id`.
    pub fn register(&mut self, tenant_id: impl Into<String>, provider: Arc<dyn ProviderAdapter>) {
        self.providers.insert(tenant_id.into(), provider);
    }

    pub fn get(&self, tenant_id: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.providers.get(tenant_id).cloned()
    }

    pub fn require(&self, tenant_id: &str) -> Result<Arc<dyn ProviderAdapter>, WapipeError> {
        self.get(tenant_id).ok_or_else(|| WapipeError::NotFound {
            entity: "tenant",
            id: tenant_id.to_string(),
        })
    }

    pub fn tenants(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (tenant, provider) in &self.providers {
            map.entry(tenant, &provider.name());
        }
        map.finish()
    }
}
