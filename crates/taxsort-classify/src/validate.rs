// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pre-flight checks run before any classification work starts.

use std::path::Path;

use tracing::{info, warn};

use taxsort_config::TaxsortConfig;
use taxsort_config::validate_credentials;

use crate::catalog::CategoryCatalog;

/// Checks credentials and loads the configured catalog.
///
/// Every problem is collected rather than stopping at the first, so one run
/// of `taxsort validate` reports everything that needs fixing.
pub fn validate_workflow(config: &TaxsortConfig) -> Result<CategoryCatalog, Vec<String>> {
    let mut problems = Vec::new();

    if let Err(errors) = validate_credentials(config) {
        problems.extend(errors.iter().map(ToString::to_string));
    }

    let catalog = match CategoryCatalog::load(config.catalog.path.as_deref().map(Path::new)) {
        Ok(catalog) => Some(catalog),
        Err(e) => {
            problems.push(e.to_string());
            None
        }
    };

    match catalog {
        Some(catalog) if problems.is_empty() => {
            info!(categories = catalog.len(), "workflow configuration is valid");
            Ok(catalog)
        }
        _ => {
            for problem in &problems {
                warn!(problem = %problem, "workflow validation failed");
            }
            Err(problems)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> TaxsortConfig {
        let mut config = TaxsortConfig::default();
        config.llm.api_key = Some("secret".into());
        config.llm.endpoint = Some("https://example.openai.azure.com".into());
        config.llm.deployment = Some("gpt-4o".into());
        config
    }

    #[test]
    fn complete_configuration_passes() {
        let catalog = validate_workflow(&configured()).unwrap();
        assert_eq!(catalog.len(), 20);
    }

    #[test]
    fn all_problems_are_reported_together() {
        let mut config = configured();
        config.llm.endpoint = None;
        config.catalog.path = Some("/nonexistent/categories.json".into());
        let problems = validate_workflow(&config).unwrap_err();
        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("llm.endpoint"));
        assert!(problems[1].contains("category catalog"));
    }

    #[test]
    fn incomplete_catalog_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("categories.json");
        std::fs::write(
            &path,
            r#"[{"id": 1, "category_german": "Fragebogen", "english_translation": "Questionnaire", "description": "x"}]"#,
        )
        .unwrap();
        let mut config = configured();
        config.catalog.path = Some(path.to_string_lossy().into_owned());
        let problems = validate_workflow(&config).unwrap_err();
        assert!(problems[0].contains("missing ids"));
    }
}
