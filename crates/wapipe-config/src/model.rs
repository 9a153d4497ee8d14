// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the wapipe messaging pipeline.
//!
//! Section structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup. Provider settings sit behind an internally tagged
//! enum, which serde cannot combine with `deny_unknown_fields`.

use serde::{Deserialize, Serialize};

/// Top-level wapipe configuration.
///
/// All sections are optional and default to sensible values. Tenants default
/// to none, which leaves the service able to start but unable to dispatch.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WapipeConfig {
    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// One entry per tenant and its messaging provider.
    #[serde(default)]
    pub tenants: Vec<TenantConfig>,
}

impl WapipeConfig {
    pub fn tenant(&self, id: &str) -> Option<&TenantConfig> {
        self.tenants.iter().find(|t| t.id == id)
    }
}

/// Process identity and HTTP surface.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Bearer token for the `/v1` API. `None` leaves the API open.
    #[serde(default)]
    pub api_token: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            bind_address: default_bind_address(),
            port: default_port(),
            api_token: None,
        }
    }
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("name", &self.name)
            .field("log_level", &self.log_level)
            .field("bind_address", &self.bind_address)
            .field("port", &self.port)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

fn default_service_name() -> String {
    "wapipe".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Message store settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// When false, messages live only in process memory.
    #[serde(default = "default_durable")]
    pub durable: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            durable: default_durable(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("wapipe").join("wapipe.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("wapipe.db"))
        .display()
        .to_string()
}

fn default_durable() -> bool {
    true
}

/// Global token bucket and per-tenant window settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Provider-imposed hard cap on sends per wall-clock second.
    #[serde(default = "default_messages_per_second")]
    pub messages_per_second: u32,

    /// Bucket capacity. Clamped to `messages_per_second` at runtime.
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,

    /// Refill window in milliseconds.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Suspend callers until a token is available instead of rejecting.
    #[serde(default)]
    pub queue_excess: bool,

    /// Default rolling one-minute cap per tenant.
    #[serde(default = "default_tenant_limit_per_minute")]
    pub tenant_limit_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            messages_per_second: default_messages_per_second(),
            burst_size: default_burst_size(),
            window_ms: default_window_ms(),
            queue_excess: false,
            tenant_limit_per_minute: default_tenant_limit_per_minute(),
        }
    }
}

fn default_messages_per_second() -> u32 {
    80
}

fn default_burst_size() -> u32 {
    80
}

fn default_window_ms() -> u64 {
    1000
}

fn default_tenant_limit_per_minute() -> u32 {
    50
}

/// Retry, expiry and health classification settings for the queue.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Default retry budget for newly enqueued messages.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff per retry attempt; the last entry repeats.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: Vec<u64>,

    /// Lifetime of a message that sets no explicit expiry.
    #[serde(default = "default_expiry_secs")]
    pub default_expiry_secs: u64,

    /// How long terminal messages stay in the in-process store.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// A message left in `sending` longer than this is handed back to the
    /// queue by the sweep. Must exceed `dispatch.send_timeout_secs`.
    #[serde(default = "default_stale_sending_secs")]
    pub stale_sending_secs: u64,

    /// Pending backlog at which the queue reports `degraded`.
    #[serde(default = "default_degraded_backlog")]
    pub degraded_backlog: u64,

    /// Pending backlog at which the queue reports `overloaded`.
    #[serde(default = "default_overloaded_backlog")]
    pub overloaded_backlog: u64,

    /// Failure ratio over the last hour at which the queue reports `degraded`.
    #[serde(default = "default_degraded_failure_rate")]
    pub degraded_failure_rate: f64,

    #[serde(default = "default_overloaded_failure_rate")]
    pub overloaded_failure_rate: f64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            default_expiry_secs: default_expiry_secs(),
            retention_secs: default_retention_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            stale_sending_secs: default_stale_sending_secs(),
            degraded_backlog: default_degraded_backlog(),
            overloaded_backlog: default_overloaded_backlog(),
            degraded_failure_rate: default_degraded_failure_rate(),
            overloaded_failure_rate: default_overloaded_failure_rate(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> Vec<u64> {
    vec![5_000, 30_000, 120_000]
}

fn default_expiry_secs() -> u64 {
    86_400
}

fn default_retention_secs() -> u64 {
    86_400
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_stale_sending_secs() -> u64 {
    120
}

fn default_degraded_backlog() -> u64 {
    500
}

fn default_overloaded_backlog() -> u64 {
    2_000
}

fn default_degraded_failure_rate() -> f64 {
    0.10
}

fn default_overloaded_failure_rate() -> f64 {
    0.25
}

/// Dispatcher loop settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum messages pulled per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Upper bound on a single provider call.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            batch_size: default_batch_size(),
            send_timeout_secs: default_send_timeout_secs(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_batch_size() -> usize {
    20
}

fn default_send_timeout_secs() -> u64 {
    10
}

/// A tenant and the provider that sends on its behalf.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TenantConfig {
    pub id: String,

    /// Overrides `rate_limit.tenant_limit_per_minute` for this tenant.
    #[serde(default)]
    pub limit_per_minute: Option<u32>,

    pub provider: TenantProviderConfig,
}

/// Provider selection, tagged by `kind`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TenantProviderConfig {
    CloudApi(CloudApiSettings),
    Dialog360(Dialog360Settings),
}

/// Direct Cloud API credentials owned by the business.
#[derive(Clone, Deserialize, Serialize)]
pub struct CloudApiSettings {
    pub access_token: String,
    pub phone_number_id: String,

    /// WhatsApp Business Account id, needed for usage analytics.
    #[serde(default)]
    pub business_account_id: Option<String>,

    /// App secret used to verify `X-Hub-Signature-256`.
    #[serde(default)]
    pub app_secret: Option<String>,

    /// Token echoed in the webhook subscription handshake.
    #[serde(default)]
    pub verify_token: Option<String>,

    #[serde(default = "default_graph_api_version")]
    pub api_version: String,

    #[serde(default = "default_graph_base_url")]
    pub base_url: String,
}

impl std::fmt::Debug for CloudApiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudApiSettings")
            .field("access_token", &"[REDACTED]")
            .field("phone_number_id", &self.phone_number_id)
            .field("business_account_id", &self.business_account_id)
            .field("app_secret", &self.app_secret.as_ref().map(|_| "[REDACTED]"))
            .field("api_version", &self.api_version)
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn default_graph_api_version() -> String {
    "v21.0".to_string()
}

fn default_graph_base_url() -> String {
    "https://graph.facebook.com".to_string()
}

/// 360dialog channel credentials, plus optional partner credentials for
/// number provisioning.
#[derive(Clone, Deserialize, Serialize)]
pub struct Dialog360Settings {
    /// Channel API key sent as `D360-API-KEY`.
    pub api_key: String,

    #[serde(default)]
    pub channel_id: Option<String>,

    #[serde(default)]
    pub partner_id: Option<String>,

    /// Partner hub bearer token.
    #[serde(default)]
    pub partner_token: Option<String>,

    /// Shared secret for webhook signatures, if one was set up.
    #[serde(default)]
    pub webhook_secret: Option<String>,

    #[serde(default = "default_d360_messaging_url")]
    pub messaging_url: String,

    #[serde(default = "default_d360_hub_url")]
    pub hub_url: String,
}

impl std::fmt::Debug for Dialog360Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dialog360Settings")
            .field("api_key", &"[REDACTED]")
            .field("channel_id", &self.channel_id)
            .field("partner_id", &self.partner_id)
            .field(
                "partner_token",
                &self.partner_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("messaging_url", &self.messaging_url)
            .field("hub_url", &self.hub_url)
            .finish()
    }
}

fn default_d360_messaging_url() -> String {
    "https://waba-v2.360dialog.io".to_string()
}

fn default_d360_hub_url() -> String {
    "https://hub.360dialog.io/api/v2".to_string()
}
