// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The fixed catalog of twenty tax-document categories.
//!
//! Loaded once and read-only afterwards. A catalog that does not cover every
//! id in `1..=20` is rejected at load time so classification never runs
//! against a partial scaffold.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use taxsort_core::{CategoryId, TaxsortError};

/// The catalog shipped with the binary.
const BUILTIN_CATALOG: &str = include_str!("../data/categories.json");

/// One classification bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    #[serde(rename = "category_german")]
    pub german_name: String,
    #[serde(rename = "english_translation")]
    pub english_name: String,
    pub description: String,
    #[serde(default)]
    pub content_info: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub typical_documents: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

/// The shape each category takes inside a prompt.
#[derive(Serialize)]
struct PromptCategory<'a> {
    id: CategoryId,
    german: &'a str,
    english: &'a str,
    description: &'a str,
    content_info: &'a str,
    keywords: &'a [String],
    typical_documents: &'a [String],
    examples: &'a [String],
}

/// All twenty categories, ordered by id.
#[derive(Debug, Clone)]
pub struct CategoryCatalog {
    categories: Vec<Category>,
}

impl CategoryCatalog {
    /// Loads the catalog from `path`, or the built-in catalog when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, TaxsortError> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    TaxsortError::Config(format!(
                        "category catalog not found at {}: {e}",
                        path.display()
                    ))
                })?;
                let catalog = Self::from_json_str(&raw)?;
                info!(path = %path.display(), "loaded category catalog");
                Ok(catalog)
            }
            None => Self::builtin(),
        }
    }

    /// The catalog embedded at compile time.
    pub fn builtin() -> Result<Self, TaxsortError> {
        let catalog = Self::from_json_str(BUILTIN_CATALOG)?;
        debug!("loaded built-in category catalog");
        Ok(catalog)
    }

    /// Parses and validates a JSON array of categories.
    pub fn from_json_str(raw: &str) -> Result<Self, TaxsortError> {
        let categories: Vec<Category> = serde_json::from_str(raw)
            .map_err(|e| TaxsortError::Config(format!("invalid category catalog: {e}")))?;
        Self::from_categories(categories)
    }

    /// Validates that every id from 1 to 20 appears exactly once.
    pub fn from_categories(mut categories: Vec<Category>) -> Result<Self, TaxsortError> {
        if categories.is_empty() {
            return Err(TaxsortError::Config("category catalog is empty".into()));
        }

        let mut seen = BTreeSet::new();
        for category in &categories {
            if !seen.insert(category.id) {
                return Err(TaxsortError::Config(format!(
                    "category catalog lists id {} more than once",
                    category.id
                )));
            }
        }
        let missing: Vec<String> = CategoryId::all()
            .filter(|id| !seen.contains(id))
            .map(|id| id.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(TaxsortError::Config(format!(
                "category catalog is missing ids: {}",
                missing.join(", ")
            )));
        }

        categories.sort_by_key(|c| c.id);
        Ok(Self { categories })
    }

    /// The ordered list of categories.
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// The category for a validated id. Always present in a loaded catalog.
    pub fn get(&self, id: CategoryId) -> &Category {
        &self.categories[usize::from(id.get()) - 1]
    }

    /// Looks up a raw id, failing with `NotFound` outside `1..=20`.
    pub fn lookup(&self, id: i64) -> Result<&Category, TaxsortError> {
        CategoryId::new(id)
            .map(|id| self.get(id))
            .ok_or_else(|| TaxsortError::not_found("category", id))
    }

    /// The sentinel category for documents that fit nowhere.
    pub fn unclassifiable(&self) -> &Category {
        self.get(CategoryId::UNCLASSIFIABLE)
    }

    /// Pretty JSON of every category with keywords, typical documents and
    /// examples, for inclusion in prompts.
    pub fn render_for_prompt(&self) -> String {
        let entries: Vec<PromptCategory<'_>> = self
            .categories
            .iter()
            .map(|c| PromptCategory {
                id: c.id,
                german: &c.german_name,
                english: &c.english_name,
                description: &c.description,
                content_info: &c.content_info,
                keywords: &c.keywords,
                typical_documents: &c.typical_documents,
                examples: &c.examples,
            })
            .collect();
        serde_json::to_string_pretty(&entries).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use taxsort_core::types::CATEGORY_COUNT;

    use super::*;

    fn category(id: i64) -> Category {
        Category {
            id: CategoryId::new(id).unwrap(),
            german_name: format!("Kategorie {id}"),
            english_name: format!("Category {id}"),
            description: String::new(),
            content_info: String::new(),
            keywords: vec![],
            typical_documents: vec![],
            examples: vec![],
        }
    }

    #[test]
    fn builtin_catalog_is_complete_and_ordered() {
        let catalog = CategoryCatalog::builtin().unwrap();
        assert_eq!(catalog.len(), usize::from(CATEGORY_COUNT));
        let ids: Vec<u8> = catalog.categories().iter().map(|c| c.id.get()).collect();
        assert_eq!(ids, (1..=20).collect::<Vec<u8>>());
        assert_eq!(catalog.unclassifiable().german_name, "Nicht Verwendbar");
        assert_eq!(catalog.lookup(13).unwrap().german_name, "KAP");
    }

    #[test]
    fn lookup_outside_range_is_not_found() {
        let catalog = CategoryCatalog::builtin().unwrap();
        assert!(catalog.lookup(0).unwrap_err().is_not_found());
        assert!(catalog.lookup(21).unwrap_err().is_not_found());
    }

    #[test]
    fn empty_catalog_is_config_error() {
        let err = CategoryCatalog::from_json_str("[]").unwrap_err();
        assert!(matches!(err, TaxsortError::Config(msg) if msg.contains("empty")));
    }

    #[test]
    fn partial_catalog_names_missing_ids() {
        let categories: Vec<Category> = (1..=18).map(category).collect();
        let err = CategoryCatalog::from_categories(categories).unwrap_err();
        assert!(matches!(err, TaxsortError::Config(msg) if msg.contains("19, 20")));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut categories: Vec<Category> = (1..=20).map(category).collect();
        categories.push(category(4));
        assert!(CategoryCatalog::from_categories(categories).is_err());
    }

    #[test]
    fn out_of_range_id_in_file_is_config_error() {
        let raw = r#"[{"id": 21, "category_german": "x", "english_translation": "x", "description": "x"}]"#;
        assert!(matches!(
            CategoryCatalog::from_json_str(raw),
            Err(TaxsortError::Config(_))
        ));
    }

    #[test]
    fn unordered_input_is_sorted() {
        let categories: Vec<Category> = (1..=20).rev().map(category).collect();
        let catalog = CategoryCatalog::from_categories(categories).unwrap();
        assert_eq!(catalog.get(CategoryId::new(1).unwrap()).german_name, "Kategorie 1");
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = CategoryCatalog::load(Some(Path::new("/nonexistent/categories.json"))).unwrap_err();
        assert!(matches!(err, TaxsortError::Config(msg) if msg.contains("not found")));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("categories.json");
        std::fs::write(&path, BUILTIN_CATALOG).unwrap();
        let catalog = CategoryCatalog::load(Some(&path)).unwrap();
        assert_eq!(catalog.len(), 20);
    }

    #[test]
    fn prompt_rendering_includes_enrichment_fields() {
        let catalog = CategoryCatalog::builtin().unwrap();
        let rendered = catalog.render_for_prompt();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        let first = &value[0];
        assert_eq!(first["id"], 1);
        assert_eq!(first["german"], "Fragebogen");
        assert!(first["keywords"].as_array().is_some_and(|k| !k.is_empty()));
        assert!(first["typical_documents"].is_array());
        assert!(first["examples"].is_array());
        assert_eq!(value.as_array().map(Vec::len), Some(20));
    }
}
