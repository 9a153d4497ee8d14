// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the wapipe configuration system.

use wapipe_config::diagnostic::ConfigError;
use wapipe_config::model::TenantProviderConfig;
use wapipe_config::{default_config_toml, load_and_validate_str, load_config_from_str};

const FULL: &str = r#"
[service]
name = "wapipe-test"
log_level = "debug"
bind_address = "0.0.0.0"
port = 9000
api_token = "secret-token"

[storage]
database_path = "/tmp/wapipe-test.db"
durable = false

[rate_limit]
messages_per_second = 20
burst_size = 20
window_ms = 1000
queue_excess = true
tenant_limit_per_minute = 10

[queue]
max_retries = 5
retry_backoff_ms = [1000, 2000]
default_expiry_secs = 3600

[dispatch]
poll_interval_ms = 100
batch_size = 50
send_timeout_secs = 5

[[tenants]]
id = "acme"
limit_per_minute = 100

[tenants.provider]
kind = "cloud_api"
access_token = "EAAG123"
phone_number_id = "1098765"
app_secret = "app-secret"

[[tenants]]
id = "globex"

[tenants.provider]
kind = "dialog360"
api_key = "d360-key"
"#;

#[test]
fn full_toml_deserializes() {
    let config = load_and_validate_str(FULL).expect("valid config");
    assert_eq!(config.service.name, "wapipe-test");
    assert_eq!(config.service.port, 9000);
    assert_eq!(config.service.api_token.as_deref(), Some("secret-token"));
    assert!(!config.storage.durable);
    assert_eq!(config.rate_limit.messages_per_second, 20);
    assert!(config.rate_limit.queue_excess);
    assert_eq!(config.queue.retry_backoff_ms, vec![1000, 2000]);
    // Unset keys in a present section keep their defaults.
    assert_eq!(config.queue.sweep_interval_secs, 60);
    assert_eq!(config.dispatch.batch_size, 50);

    assert_eq!(config.tenants.len(), 2);
    let acme = config.tenant("acme").expect("acme tenant");
    assert_eq!(acme.limit_per_minute, Some(100));
    match &acme.provider {
        TenantProviderConfig::CloudApi(cloud) => {
            assert_eq!(cloud.phone_number_id, "1098765");
            assert_eq!(cloud.api_version, "v21.0");
            assert_eq!(cloud.base_url, "https://graph.facebook.com");
        }
        other => panic!("expected cloud_api, got {other:?}"),
    }
    match &config.tenant("globex").expect("globex tenant").provider {
        TenantProviderConfig::Dialog360(d360) => {
            assert_eq!(d360.api_key, "d360-key");
            assert!(d360.webhook_secret.is_none());
        }
        other => panic!("expected dialog360, got {other:?}"),
    }
}

#[test]
fn empty_toml_uses_defaults() {
    let config = load_and_validate_str("").expect("defaults are valid");
    assert_eq!(config.service.port, 8080);
    assert_eq!(config.rate_limit.burst_size, 80);
    assert!(config.tenants.is_empty());
}

#[test]
fn unknown_key_gets_a_suggestion() {
    let errors = load_and_validate_str("[rate_limit]\nburst_sise = 10\n").unwrap_err();
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } => {
            assert_eq!(key, "burst_sise");
            assert_eq!(suggestion.as_deref(), Some("burst_size"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
fn unknown_provider_kind_is_rejected() {
    let toml = r#"
[[tenants]]
id = "acme"

[tenants.provider]
kind = "twilio"
api_key = "x"
"#;
    assert!(load_config_from_str(toml).is_err());
}

#[test]
fn wrong_type_is_reported() {
    let errors = load_and_validate_str("[service]\nport = \"eighty\"\n").unwrap_err();
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { .. })),
        "got {errors:?}"
    );
}

#[test]
fn validation_collects_every_error() {
    let toml = r#"
[rate_limit]
messages_per_second = 0
tenant_limit_per_minute = 0

[queue]
retry_backoff_ms = []

[[tenants]]
id = "acme"
[tenants.provider]
kind = "dialog360"
api_key = "k"

[[tenants]]
id = "acme"
[tenants.provider]
kind = "cloud_api"
access_token = ""
phone_number_id = "1"
"#;
    let errors = load_and_validate_str(toml).unwrap_err();
    let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    let has = |needle: &str| messages.iter().any(|m| m.contains(needle));
    assert!(has("messages_per_second"), "{messages:?}");
    assert!(has("tenant_limit_per_minute"), "{messages:?}");
    assert!(has("retry_backoff_ms"), "{messages:?}");
    assert!(has("duplicate tenant id `acme`"), "{messages:?}");
    assert!(has("access_token"), "{messages:?}");
}

#[test]
fn burst_above_rate_is_not_a_config_error() {
    // Clamped by the limiter at runtime instead.
    let config =
        load_and_validate_str("[rate_limit]\nmessages_per_second = 10\nburst_size = 100\n")
            .expect("valid");
    assert_eq!(config.rate_limit.burst_size, 100);
}

#[test]
fn rendered_defaults_load_back() {
    let rendered = default_config_toml().expect("defaults serialize");
    let config = load_and_validate_str(&rendered).expect("rendered defaults are valid");
    assert_eq!(config.queue.retry_backoff_ms, vec![5_000, 30_000, 120_000]);
}

#[test]
fn stale_sending_window_must_outlast_the_send_timeout() {
    let toml = "[queue]\nstale_sending_secs = 10\n\n[dispatch]\nsend_timeout_secs = 10\n";
    let errors = load_and_validate_str(toml).unwrap_err();
    assert!(
        errors
            .iter()
            .any(|e| e.to_string().contains("stale_sending_secs (10)")),
        "{errors:?}"
    );

    let config = load_and_validate_str("").unwrap();
    assert_eq!(config.queue.stale_sending_secs, 120);
}
