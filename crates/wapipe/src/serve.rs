// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `wapipe serve` command implementation.
//!
//! Builds the store stack, rate limiter, queue and provider registry from
//! configuration, then runs the dispatcher, the sweeper and the HTTP server
//! until a shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info, warn};
use wapipe_cloud::CloudApiProvider;
use wapipe_config::{TenantProviderConfig, WapipeConfig};
use wapipe_core::{HealthStatus, PluginAdapter, ProviderAdapter, ProviderRegistry, WapipeError};
use wapipe_dialog360::Dialog360Provider;
use wapipe_dispatch::{Dispatcher, run_sweeper};
use wapipe_queue::MessageQueue;
use wapipe_ratelimit::TenantRateLimiter;
use wapipe_webhook::{
    AppState, AuthConfig, HealthState, LoggingSink, ServerConfig, WebhookProcessor, start_server,
};

use crate::shutdown;

type RenderFn = Arc<dyn Fn() -> String + Send + Sync>;

pub async fn run_serve(config: WapipeConfig) -> Result<(), WapipeError> {
    init_tracing(&config.service.log_level);
    info!(
        name = %config.service.name,
        tenants = config.tenants.len(),
        "starting wapipe serve"
    );

    let prometheus_render = install_metrics();

    let store = wapipe_storage::open_store(&config.storage).await?;
    let limiter = Arc::new(build_limiter(&config));
    let queue = Arc::new(MessageQueue::new(
        store.clone(),
        limiter,
        config.queue.clone(),
    ));
    let registry = Arc::new(build_registry(&config)?);
    log_provider_health(&registry).await;

    let cancel = shutdown::install_signal_handler();

    let dispatcher = Dispatcher::new(queue.clone(), registry.clone(), config.dispatch.clone());
    let dispatch_task = tokio::spawn({
        let cancel = cancel.clone();
        async move { dispatcher.run(cancel).await }
    });
    let sweeper_task = tokio::spawn(run_sweeper(
        queue.clone(),
        Duration::from_secs(config.queue.sweep_interval_secs),
        cancel.clone(),
    ));

    if config.service.api_token.is_none() {
        warn!("service.api_token is not set, API routes will reject every request");
    }
    let state = AppState {
        queue,
        registry: registry.clone(),
        processor: Arc::new(WebhookProcessor::new(registry.clone(), Arc::new(LoggingSink))),
        auth: AuthConfig {
            bearer_token: config.service.api_token.clone(),
        },
        health: HealthState {
            start_time: std::time::Instant::now(),
            prometheus_render,
        },
    };
    let server_config = ServerConfig {
        host: config.service.bind_address.clone(),
        port: config.service.port,
    };
    let served = start_server(&server_config, state, cancel.clone()).await;

    // A server failure takes the workers down with it.
    cancel.cancel();
    if let Err(e) = dispatch_task.await {
        error!(error = %e, "dispatcher task failed");
    }
    if let Err(e) = sweeper_task.await {
        error!(error = %e, "sweeper task failed");
    }

    for tenant_id in registry.tenants() {
        if let Some(provider) = registry.get(tenant_id)
            && let Err(e) = provider.shutdown().await
        {
            warn!(tenant_id, error = %e, "provider shutdown failed");
        }
    }
    if let Err(e) = store.shutdown().await {
        warn!(error = %e, "store shutdown failed");
    }

    info!("wapipe stopped");
    served
}

/// Global limiter plus per-tenant window overrides from `[[tenants]]`.
pub fn build_limiter(config: &WapipeConfig) -> TenantRateLimiter {
    config
        .tenants
        .iter()
        .filter_map(|t| t.limit_per_minute.map(|limit| (t.id.as_str(), limit)))
        .fold(
            TenantRateLimiter::new(&config.rate_limit),
            |limiter, (tenant_id, limit)| limiter.with_override(tenant_id, limit),
        )
}

/// One provider adapter per configured tenant.
pub fn build_registry(config: &WapipeConfig) -> Result<ProviderRegistry, WapipeError> {
    let mut registry = ProviderRegistry::new();
    for tenant in &config.tenants {
        let provider: Arc<dyn ProviderAdapter> = match &tenant.provider {
            TenantProviderConfig::CloudApi(settings) => {
                Arc::new(CloudApiProvider::new(settings.clone())?)
            }
            TenantProviderConfig::Dialog360(settings) => {
                Arc::new(Dialog360Provider::new(settings.clone())?)
            }
        };
        info!(
            tenant_id = %tenant.id,
            provider = %provider.kind(),
            provisioning = provider.supports_provisioning(),
            "tenant provider registered"
        );
        registry.register(tenant.id.clone(), provider);
    }
    Ok(registry)
}

async fn log_provider_health(registry: &ProviderRegistry) {
    for tenant_id in registry.tenants() {
        let Some(provider) = registry.get(tenant_id) else {
            continue;
        };
        match provider.health_check().await {
            Ok(HealthStatus::Healthy) => {}
            Ok(status) => warn!(tenant_id, ?status, "provider not fully healthy"),
            Err(e) => warn!(tenant_id, error = %e, "provider health check failed"),
        }
    }
}

/// Installs the Prometheus recorder. Without it the service still runs and
/// `/metrics` answers 404.
fn install_metrics() -> Option<RenderFn> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            wapipe_dispatch::register_metrics();
            wapipe_webhook::register_metrics();
            info!("prometheus metrics recorder installed");
            Some(Arc::new(move || handle.render()) as RenderFn)
        }
        Err(e) => {
            warn!(error = %e, "prometheus initialization failed, continuing without metrics");
            None
        }
    }
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("wapipe={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use wapipe_core::ProviderKind;

    const TWO_TENANTS: &str = r#"
[rate_limit]
tenant_limit_per_minute = 50

[[tenants]]
id = "acme"
limit_per_minute = 5

[tenants.provider]
kind = "cloud_api"
access_token = "EAAG-test"
phone_number_id = "1234567890"

[[tenants]]
id = "globex"

[tenants.provider]
kind = "dialog360"
api_key = "d360-test"
partner_id = "p-1"
partner_token = "pt-1"
"#;

    #[test]
    fn registry_has_one_provider_per_tenant() {
        let config = wapipe_config::load_and_validate_str(TWO_TENANTS).unwrap();
        let registry = build_registry(&config).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("acme").unwrap().kind(), ProviderKind::CloudApi);
        let globex = registry.get("globex").unwrap();
        assert_eq!(globex.kind(), ProviderKind::Dialog360);
        assert!(globex.supports_provisioning());
        assert!(registry.get("initech").is_none());
    }

    #[test]
    fn tenant_overrides_reach_the_limiter() {
        let config = wapipe_config::load_and_validate_str(TWO_TENANTS).unwrap();
        let limiter = build_limiter(&config);

        assert_eq!(limiter.limit_for("acme"), 5);
        assert_eq!(limiter.limit_for("globex"), 50);
    }
}
