// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Classification history and document summaries.

use serde_json::Value;
use tracing::debug;

use taxsort_core::types::{CategoryId, DocumentSummary};

use crate::store::MemoryStore;
use crate::types::{MemoryEntry, MemoryType, Metadata};

fn classification_content(
    file_name: &str,
    category_id: CategoryId,
    category_name: &str,
    reasoning: Option<&str>,
) -> String {
    let mut content =
        format!("Classified document '{file_name}' as category {category_id} ({category_name})");
    if let Some(reasoning) = reasoning.filter(|r| !r.is_empty()) {
        content.push_str(". Reason: ");
        content.push_str(reasoning);
    }
    content
}

fn classification_metadata(
    file_name: &str,
    category_id: CategoryId,
    category_name: &str,
    confidence: Option<f64>,
    reasoning: Option<&str>,
) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("file_name".into(), Value::from(file_name));
    metadata.insert("category_id".into(), Value::from(i64::from(category_id)));
    metadata.insert("category_name".into(), Value::from(category_name));
    metadata.insert("confidence".into(), confidence.map_or(Value::Null, Value::from));
    metadata.insert("reasoning".into(), reasoning.map_or(Value::Null, Value::from));
    metadata
}

impl MemoryStore {
    /// Appends a classification entry without checking for an earlier one.
    pub async fn add_classification_result(
        &self,
        file_name: &str,
        category_id: CategoryId,
        category_name: &str,
        confidence: Option<f64>,
        reasoning: Option<&str>,
    ) -> String {
        self.add(
            &classification_content(file_name, category_id, category_name, reasoning),
            classification_metadata(file_name, category_id, category_name, confidence, reasoning),
            MemoryType::Classification,
        )
        .await
    }

    /// The most recent classification entry for an exact file name.
    pub async fn find_classification_by_file_name(&self, file_name: &str) -> Option<MemoryEntry> {
        self.latest_for_file_name(MemoryType::Classification, file_name)
            .await
    }

    /// Writes a classification entry, replacing the file's earlier entry in
    /// place when there is one.
    pub async fn update_classification(
        &self,
        file_name: &str,
        category_id: CategoryId,
        category_name: &str,
        confidence: Option<f64>,
        reasoning: Option<&str>,
    ) -> String {
        let content = classification_content(file_name, category_id, category_name, reasoning);
        let metadata =
            classification_metadata(file_name, category_id, category_name, confidence, reasoning);

        if let Some(existing) = self.find_classification_by_file_name(file_name).await
            && self.update(&existing.id, &content, metadata.clone()).await
        {
            debug!(file_name, "updated classification memory");
            return existing.id;
        }
        self.add(&content, metadata, MemoryType::Classification)
            .await
    }

    /// Stores a preprocessing summary for later similarity lookups.
    pub async fn add_document_summary(&self, summary: &DocumentSummary) -> String {
        let mut lines = vec![
            format!("Document: {}", summary.file_name),
            format!("Summary: {}", summary.summary),
        ];
        if !summary.keywords.is_empty() {
            lines.push(format!("Keywords: {}", summary.keywords.join(", ")));
        }
        if !summary.document_type.is_empty() {
            lines.push(format!("Document Type: {}", summary.document_type));
        }

        let mut metadata = Metadata::new();
        metadata.insert("file_name".into(), Value::from(summary.file_name.clone()));
        metadata.insert("summary".into(), Value::from(summary.summary.clone()));
        metadata.insert("keywords".into(), Value::from(summary.keywords.clone()));
        metadata.insert(
            "document_type".into(),
            Value::from(summary.document_type.clone()),
        );
        metadata.insert(
            "key_entities".into(),
            serde_json::to_value(&summary.key_entities).unwrap_or_default(),
        );
        if let Some(file_id) = summary.file_id {
            metadata.insert("file_id".into(), Value::from(file_id));
        }

        self.add(&lines.join("\n"), metadata, MemoryType::Summary)
            .await
    }

    /// Summaries that resemble the given text.
    pub async fn find_similar_documents(&self, summary: &str, limit: usize) -> Vec<MemoryEntry> {
        self.search(summary, limit, Some(MemoryType::Summary)).await
    }

    /// The last `limit` classifications rendered as a prompt section.
    pub async fn classification_context(&self, limit: usize) -> String {
        let recent = self.recent(Some(MemoryType::Classification), limit).await;
        if recent.is_empty() {
            return "No previous classification history available.".to_string();
        }

        let mut lines = vec!["Previous classification history:".to_string()];
        for entry in recent {
            let text = if entry.content.is_empty() {
                format!(
                    "Classified '{}' as category {} ({})",
                    entry.metadata_str("file_name").unwrap_or("unknown"),
                    entry
                        .metadata_i64("category_id")
                        .map_or_else(|| "?".to_string(), |id| id.to_string()),
                    entry.metadata_str("category_name").unwrap_or_default(),
                )
            } else {
                entry.content
            };
            lines.push(format!("- {text}"));
        }
        lines.join("\n")
    }

    /// Every entry of a type, newest first, up to `limit`.
    pub async fn get_all(&self, memory_type: Option<MemoryType>, limit: usize) -> Vec<MemoryEntry> {
        self.recent(memory_type, limit).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn cat(id: i64) -> CategoryId {
        CategoryId::new(id).unwrap()
    }

    #[tokio::test]
    async fn empty_history_has_placeholder_context() {
        let store = MemoryStore::local();
        assert_eq!(
            store.classification_context(10).await,
            "No previous classification history available."
        );
    }

    #[tokio::test]
    async fn context_lists_recent_classifications() {
        let store = MemoryStore::local();
        store
            .add_classification_result("lohn.pdf", cat(11), "N", Some(0.9), Some("Lohnsteuerbescheinigung"))
            .await;
        let context = store.classification_context(10).await;
        assert!(context.starts_with("Previous classification history:"));
        assert!(context.contains(
            "- Classified document 'lohn.pdf' as category 11 (N). Reason: Lohnsteuerbescheinigung"
        ));
    }

    #[tokio::test]
    async fn update_classification_replaces_instead_of_duplicating() {
        let store = MemoryStore::local();
        let first = store
            .update_classification("a.pdf", cat(3), "Kind", None, None)
            .await;
        let second = store
            .update_classification("a.pdf", cat(7), "V", Some(0.7), Some("rent"))
            .await;
        assert_eq!(first, second);

        let all = store.get_all(Some(MemoryType::Classification), 10).await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].metadata_i64("category_id"), Some(7));
        assert!(all[0].content.ends_with("Reason: rent"));
    }

    #[tokio::test]
    async fn find_by_file_name_is_exact() {
        let store = MemoryStore::local();
        store
            .add_classification_result("a.pdf", cat(1), "Allgemein", None, None)
            .await;
        assert!(store.find_classification_by_file_name("a.pdf").await.is_some());
        assert!(store.find_classification_by_file_name("a.pd").await.is_none());
    }

    #[tokio::test]
    async fn summaries_are_searchable() {
        let store = MemoryStore::local();
        let summary = DocumentSummary {
            file_id: Some(4),
            file_name: "miete.pdf".into(),
            file_path: None,
            summary: "Rental agreement for apartment".into(),
            keywords: vec!["Miete".into(), "Vertrag".into()],
            document_type: "contract".into(),
            key_entities: BTreeMap::new(),
        };
        store.add_document_summary(&summary).await;

        let similar = store.find_similar_documents("rental agreement", 5).await;
        assert_eq!(similar.len(), 1);
        assert!(similar[0].content.contains("Keywords: Miete, Vertrag"));
        assert!(similar[0].content.contains("Document Type: contract"));
        assert_eq!(similar[0].metadata_i64("file_id"), Some(4));
    }
}
