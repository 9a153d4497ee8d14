// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Lookup order: `./wapipe.toml` > `~/.config/wapipe/wapipe.toml` > `/etc/wapipe/wapipe.toml`,
//! with environment variable overrides via the `WAPIPE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::WapipeConfig;

/// Sections addressable through environment variables. Longest first, so
/// `rate_limit_` wins over any shorter prefix.
const ENV_SECTIONS: &[&str] = &["rate_limit", "dispatch", "service", "storage", "queue"];

/// Load configuration from the standard hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/wapipe/wapipe.toml`
/// 3. `~/.config/wapipe/wapipe.toml`
/// 4. `./wapipe.toml`
/// 5. `WAPIPE_*` environment variables
pub fn load_config() -> Result<WapipeConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no file lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<WapipeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(WapipeConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<WapipeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(WapipeConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The layered Figment before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(WapipeConfig::default()))
        .merge(Toml::file("/etc/wapipe/wapipe.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("wapipe/wapipe.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("wapipe.toml"))
        .merge(env_provider())
}

/// Maps `WAPIPE_<SECTION>_<KEY>` to `<section>.<key>`.
///
/// Splitting on `_` would be ambiguous (`WAPIPE_RATE_LIMIT_BURST_SIZE`), so
/// the section is matched against the known prefixes instead.
fn env_provider() -> Env {
    Env::prefixed("WAPIPE_").map(|key| {
        let key_str = key.as_str();
        for section in ENV_SECTIONS {
            if let Some(rest) = key_str
                .strip_prefix(section)
                .and_then(|r| r.strip_prefix('_'))
            {
                return format!("{section}.{rest}").into();
            }
        }
        key_str.to_string().into()
    })
}
