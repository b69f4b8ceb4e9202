// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./taxsort.toml` > `~/.config/taxsort/taxsort.toml` > `/etc/taxsort/taxsort.toml`
//! with environment variable overrides via `TAXSORT_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::TaxsortConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/taxsort/taxsort.toml` (system-wide)
/// 3. `~/.config/taxsort/taxsort.toml` (user XDG config)
/// 4. `./taxsort.toml` (local directory)
/// 5. `TAXSORT_*` environment variables
pub fn load_config() -> Result<TaxsortConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<TaxsortConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TaxsortConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<TaxsortConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TaxsortConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(TaxsortConfig::default()))
        .merge(Toml::file("/etc/taxsort/taxsort.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("taxsort/taxsort.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("taxsort.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `TAXSORT_LLM_EMBEDDING_DEPLOYMENT` must map to
/// `llm.embedding_deployment`, not `llm.embedding.deployment`.
fn env_provider() -> Env {
    Env::prefixed("TAXSORT_").map(|key| map_env_key(&key.as_str().to_ascii_lowercase()).into())
}

/// Maps a prefix-stripped env key onto its dotted config path.
///
/// Figment hands keys over in their original case, so callers lowercase
/// them first.
pub(crate) fn map_env_key(key: &str) -> String {
    const SECTIONS: [&str; 7] = [
        "agent", "llm", "storage", "memory", "catalog", "merge", "worker",
    ];
    for section in SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
