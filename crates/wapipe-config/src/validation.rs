// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Collects every error instead of failing fast.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::{TenantProviderConfig, WapipeConfig};

pub fn validate_config(config: &WapipeConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    let addr = config.service.bind_address.trim();
    if addr.is_empty() {
        fail("service.bind_address must not be empty".to_string());
    } else if addr.parse::<std::net::IpAddr>().is_err()
        && !addr
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        fail(format!(
            "service.bind_address `{addr}` is not a valid IP address or hostname"
        ));
    }

    if config.storage.durable && config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty when storage.durable is set".to_string());
    }

    let rl = &config.rate_limit;
    if rl.messages_per_second == 0 {
        fail("rate_limit.messages_per_second must be at least 1".to_string());
    }
    if rl.burst_size == 0 {
        fail("rate_limit.burst_size must be at least 1".to_string());
    }
    if rl.window_ms == 0 {
        fail("rate_limit.window_ms must be at least 1".to_string());
    }
    if rl.tenant_limit_per_minute == 0 {
        fail("rate_limit.tenant_limit_per_minute must be at least 1".to_string());
    }

    let q = &config.queue;
    if q.retry_backoff_ms.is_empty() {
        fail("queue.retry_backoff_ms must list at least one delay".to_string());
    }
    if q.default_expiry_secs == 0 {
        fail("queue.default_expiry_secs must be at least 1".to_string());
    }
    if q.sweep_interval_secs == 0 {
        fail("queue.sweep_interval_secs must be at least 1".to_string());
    }
    if q.degraded_backlog > q.overloaded_backlog {
        fail(format!(
            "queue.degraded_backlog ({}) must not exceed queue.overloaded_backlog ({})",
            q.degraded_backlog, q.overloaded_backlog
        ));
    }
    for (key, rate) in [
        ("degraded_failure_rate", q.degraded_failure_rate),
        ("overloaded_failure_rate", q.overloaded_failure_rate),
    ] {
        if !(0.0..=1.0).contains(&rate) {
            fail(format!("queue.{key} must be between 0 and 1, got {rate}"));
        }
    }
    if q.degraded_failure_rate > q.overloaded_failure_rate {
        fail("queue.degraded_failure_rate must not exceed queue.overloaded_failure_rate".to_string());
    }

    if config.dispatch.batch_size == 0 {
        fail("dispatch.batch_size must be at least 1".to_string());
    }
    if config.dispatch.send_timeout_secs == 0 {
        fail("dispatch.send_timeout_secs must be at least 1".to_string());
    }
    if config.dispatch.poll_interval_ms == 0 {
        fail("dispatch.poll_interval_ms must be at least 1".to_string());
    }
    if q.stale_sending_secs <= config.dispatch.send_timeout_secs {
        fail(format!(
            "queue.stale_sending_secs ({}) must exceed dispatch.send_timeout_secs ({})",
            q.stale_sending_secs, config.dispatch.send_timeout_secs
        ));
    }

    let mut seen = HashSet::new();
    for (i, tenant) in config.tenants.iter().enumerate() {
        if tenant.id.trim().is_empty() {
            fail(format!("tenants[{i}].id must not be empty"));
        } else if !seen.insert(tenant.id.as_str()) {
            fail(format!("duplicate tenant id `{}` in [[tenants]]", tenant.id));
        }
        if tenant.limit_per_minute == Some(0) {
            fail(format!("tenants[{i}].limit_per_minute must be at least 1"));
        }
        match &tenant.provider {
            TenantProviderConfig::CloudApi(cloud) => {
                if cloud.access_token.trim().is_empty() {
                    fail(format!("tenants[{i}].provider.access_token must not be empty"));
                }
                if cloud.phone_number_id.trim().is_empty() {
                    fail(format!(
                        "tenants[{i}].provider.phone_number_id must not be empty"
                    ));
                }
            }
            TenantProviderConfig::Dialog360(d360) => {
                if d360.api_key.trim().is_empty() {
                    fail(format!("tenants[{i}].provider.api_key must not be empty"));
                }
                if d360.partner_token.is_some() != d360.partner_id.is_some() {
                    fail(format!(
                        "tenants[{i}].provider.partner_id and partner_token must be set together"
                    ));
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
