// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as non-empty paths, temperature ranges and non-zero budgets.
//! Credentials are validated separately by [`validate_credentials`] because
//! commands that never call the LLM must not require them.

use crate::diagnostic::ConfigError;
use crate::model::TaxsortConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &TaxsortConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.agent.log_level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "agent.log_level `{}` must be one of {}",
                config.agent.log_level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.memory.enabled && config.memory.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "memory.database_path must not be empty when memory is enabled".to_string(),
        });
    }

    if config.memory.search_limit == 0 {
        errors.push(ConfigError::Validation {
            message: "memory.search_limit must be at least 1".to_string(),
        });
    }

    if !(0.0..=2.0).contains(&config.llm.temperature) {
        errors.push(ConfigError::Validation {
            message: format!(
                "llm.temperature must be between 0.0 and 2.0, got {}",
                config.llm.temperature
            ),
        });
    }

    if config.llm.max_tokens == 0 || config.llm.classification_max_tokens == 0 {
        errors.push(ConfigError::Validation {
            message: "llm.max_tokens and llm.classification_max_tokens must be positive"
                .to_string(),
        });
    }

    if config.llm.timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "llm.timeout_secs must be positive".to_string(),
        });
    }

    if let Some(endpoint) = config.llm.endpoint.as_deref()
        && !endpoint.trim().is_empty()
        && !(endpoint.starts_with("https://") || endpoint.starts_with("http://"))
    {
        errors.push(ConfigError::Validation {
            message: format!("llm.endpoint `{endpoint}` must be an http(s) URL"),
        });
    }

    if let Some(path) = config.catalog.path.as_deref()
        && path.trim().is_empty()
    {
        errors.push(ConfigError::Validation {
            message: "catalog.path must not be empty when set".to_string(),
        });
    }

    if config.merge.output_dir.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "merge.output_dir must not be empty".to_string(),
        });
    }

    if config.worker.queue_name.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "worker.queue_name must not be empty".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate that every credential needed for completion calls is present.
pub fn validate_credentials(config: &TaxsortConfig) -> Result<(), Vec<ConfigError>> {
    let missing = config.llm.missing_credentials();
    if missing.is_empty() {
        return Ok(());
    }
    Err(missing
        .into_iter()
        .map(|key| ConfigError::MissingKey {
            key: key.to_string(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = TaxsortConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = TaxsortConfig::default();
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("database_path"))));
    }

    #[test]
    fn out_of_range_temperature_fails_validation() {
        let mut config = TaxsortConfig::default();
        config.llm.temperature = 3.5;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("temperature"))));
    }

    #[test]
    fn bad_log_level_and_endpoint_are_both_reported() {
        let mut config = TaxsortConfig::default();
        config.agent.log_level = "loud".to_string();
        config.llm.endpoint = Some("example.openai.azure.com".to_string());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn zero_timeout_fails_validation() {
        let mut config = TaxsortConfig::default();
        config.llm.timeout_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn credentials_report_each_missing_key() {
        let mut config = TaxsortConfig::default();
        config.llm.api_key = Some("secret".to_string());
        let errors = validate_credentials(&config).unwrap_err();
        let keys: Vec<String> = errors
            .iter()
            .filter_map(|e| match e {
                ConfigError::MissingKey { key } => Some(key.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(keys, vec!["llm.endpoint", "llm.deployment"]);
    }

    #[test]
    fn complete_credentials_validate() {
        let mut config = TaxsortConfig::default();
        config.llm.api_key = Some("secret".to_string());
        config.llm.endpoint = Some("https://example.openai.azure.com".to_string());
        config.llm.deployment = Some("gpt-4o".to_string());
        assert!(validate_credentials(&config).is_ok());
    }

    #[test]
    fn merge_dirs_parsed_from_toml_validate() {
        let toml_str = r#"
[merge]
header_pages_dir = "/srv/taxsort/headers"
output_dir = "/srv/taxsort/merged"
"#;
        let config: TaxsortConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.merge.header_pages_dir, "/srv/taxsort/headers");
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn misspelled_section_key_is_rejected_by_toml() {
        let toml_str = r#"
[worker]
queue = "jobs"
"#;
        assert!(toml::from_str::<TaxsortConfig>(toml_str).is_err());
    }
}
