// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Taxsort classification pipeline.
//!
//! Provides TOML configuration parsing with strict validation (`deny_unknown_fields`),
//! XDG file hierarchy lookup, environment variable overrides, and diagnostic
//! error rendering with typo suggestions.
//!
//! # Usage
//!
//! ```no_run
//! use taxsort_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("Database: {}", config.storage.database_path);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::{render_errors, ConfigError, ConfigSource};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::TaxsortConfig;
pub use validation::validate_credentials;

use std::path::{Path, PathBuf};

/// Load configuration from the XDG hierarchy and validate it.
///
/// Figment errors become miette diagnostics with typo suggestions; a
/// config that deserializes is then checked by [`validation::validate_config`].
pub fn load_and_validate() -> Result<TaxsortConfig, Vec<ConfigError>> {
    finish(loader::load_config(), collect_toml_sources)
}

/// Load configuration from an explicit file (plus env overrides) and validate it.
pub fn load_and_validate_path(path: &Path) -> Result<TaxsortConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_path(path), || {
        read_source(path).into_iter().collect()
    })
}

/// Load configuration from a TOML string and validate it.
pub fn load_and_validate_str(toml_content: &str) -> Result<TaxsortConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_str(toml_content), || {
        vec![ConfigSource::new("<inline>", toml_content)]
    })
}

/// Sources are only read back when extraction failed.
fn finish(
    loaded: Result<TaxsortConfig, figment::Error>,
    sources: impl FnOnce() -> Vec<ConfigSource>,
) -> Result<TaxsortConfig, Vec<ConfigError>> {
    let config = loaded.map_err(|err| diagnostic::figment_to_config_errors(err, &sources()))?;
    validation::validate_config(&config)?;
    Ok(config)
}

fn read_source(path: &Path) -> Option<ConfigSource> {
    let content = std::fs::read_to_string(path).ok()?;
    Some(ConfigSource::new(path.display().to_string(), content))
}

/// The TOML files of the XDG hierarchy that exist, for span resolution.
fn collect_toml_sources() -> Vec<ConfigSource> {
    let local = std::env::current_dir()
        .map(|d| d.join("taxsort.toml"))
        .unwrap_or_else(|_| PathBuf::from("taxsort.toml"));
    let user = dirs::config_dir().map(|d| d.join("taxsort/taxsort.toml"));

    [Some(local), user, Some(PathBuf::from("/etc/taxsort/taxsort.toml"))]
        .into_iter()
        .flatten()
        .filter_map(|path| read_source(&path))
        .collect()
}
