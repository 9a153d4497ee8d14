// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the wapipe messaging pipeline.
//!
//! TOML parsing with strict validation (`deny_unknown_fields`), layered file
//! lookup, `WAPIPE_*` environment overrides, and miette diagnostics with typo
//! suggestions.
//!
//! ```no_run
//! use wapipe_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("tenants: {}", config.tenants.len());
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::Path;

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{
    CloudApiSettings, Dialog360Settings, DispatchConfig, QueueConfig, RateLimitConfig,
    ServiceConfig, StorageConfig, TenantConfig, TenantProviderConfig, WapipeConfig,
};

/// Load configuration from the standard hierarchy and validate it.
pub fn load_and_validate() -> Result<WapipeConfig, Vec<ConfigError>> {
    finish(loader::load_config(), collect_toml_sources)
}

/// Load configuration from an explicit file (plus env overrides) and validate it.
pub fn load_and_validate_path(path: &Path) -> Result<WapipeConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_path(path), || {
        std::fs::read_to_string(path)
            .map(|content| vec![(path.display().to_string(), content)])
            .unwrap_or_default()
    })
}

/// Load configuration from a TOML string and validate it.
pub fn load_and_validate_str(toml_content: &str) -> Result<WapipeConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_str(toml_content), || {
        vec![("<inline>".to_string(), toml_content.to_string())]
    })
}

/// Compiled defaults rendered as TOML, for seeding a new config file.
pub fn default_config_toml() -> Result<String, toml::ser::Error> {
    toml::to_string_pretty(&WapipeConfig::default())
}

fn finish(
    loaded: Result<WapipeConfig, figment::Error>,
    sources: impl FnOnce() -> Vec<(String, String)>,
) -> Result<WapipeConfig, Vec<ConfigError>> {
    match loaded {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(diagnostic::figment_to_config_errors(err, &sources())),
    }
}

/// TOML sources for error span resolution.
fn collect_toml_sources() -> Vec<(String, String)> {
    let mut sources = Vec::new();

    if let Ok(content) = std::fs::read_to_string("wapipe.toml") {
        let path = std::env::current_dir()
            .map(|d| d.join("wapipe.toml").display().to_string())
            .unwrap_or_else(|_| "wapipe.toml".to_string());
        sources.push((path, content));
    }

    if let Some(config_dir) = dirs::config_dir() {
        let path = config_dir.join("wapipe/wapipe.toml");
        if let Ok(content) = std::fs::read_to_string(&path) {
            sources.push((path.display().to_string(), content));
        }
    }

    let system_path = Path::new("/etc/wapipe/wapipe.toml");
    if let Ok(content) = std::fs::read_to_string(system_path) {
        sources.push((system_path.display().to_string(), content));
    }

    sources
}
