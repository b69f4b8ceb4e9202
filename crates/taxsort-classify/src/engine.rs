// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batch classification of preprocessed documents.
//!
//! One completion call per batch. The model's reply is recovered by the
//! [`ResponseParser`] and validated into [`ClassificationRecord`]s here, at
//! the parse boundary, so nothing downstream sees raw JSON.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use taxsort_config::model::LlmConfig;
use taxsort_core::types::{ClassificationRecord, CompletionRequest, DocumentSummary};
use taxsort_core::{CategoryId, CompletionAdapter, TaxsortError};
use taxsort_memory::MemoryStore;

use crate::catalog::CategoryCatalog;
use crate::parser::ResponseParser;
use crate::prompts;

/// Token budget, temperature and wall-clock bound for classification calls.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl EngineSettings {
    pub fn from_config(llm: &LlmConfig) -> Self {
        Self {
            max_tokens: llm.classification_max_tokens,
            temperature: llm.temperature,
            timeout: Duration::from_secs(llm.timeout_secs),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&LlmConfig::default())
    }
}

/// Results accumulated by one workflow invocation.
///
/// Owned by the caller and threaded through each batch, so concurrent
/// workflows never share result state.
#[derive(Debug, Clone, Default)]
pub struct ClassificationContext {
    records: Vec<ClassificationRecord>,
}

impl ClassificationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record, renumbering it to the next sequential id.
    pub fn push(&mut self, mut record: ClassificationRecord) {
        record.id = u32::try_from(self.records.len() + 1).unwrap_or(u32::MAX);
        self.records.push(record);
    }

    pub fn records(&self) -> &[ClassificationRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ClassificationRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records per category id.
    pub fn category_counts(&self) -> BTreeMap<CategoryId, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.category_id).or_default() += 1;
        }
        counts
    }
}

/// One element of the model's reply before validation.
///
/// Every field is optional and loosely typed: a single sloppy element must
/// not sink the batch.
#[derive(Debug, Default, Deserialize)]
struct RawClassification {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    category_id: Option<Value>,
    #[serde(default)]
    confidence: Option<Value>,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Integer from a JSON number or numeric string.
pub fn loose_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.is_finite())
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Confidence clamped to `[0, 1]`. Non-numeric values count as absent.
fn loose_confidence(value: &Value) -> Option<f64> {
    let raw = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok(),
        _ => None,
    }?;
    raw.is_finite().then(|| raw.clamp(0.0, 1.0))
}

/// Elements of the reply: a bare array, or an object wrapping one under
/// `classifications`.
fn reply_elements(value: Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(mut map) => match map.remove("classifications") {
            Some(Value::Array(items)) => Some(items),
            _ => None,
        },
        _ => None,
    }
}

pub struct ClassificationEngine {
    provider: Arc<dyn CompletionAdapter>,
    catalog: Arc<CategoryCatalog>,
    memory: Arc<MemoryStore>,
    parser: ResponseParser,
    settings: EngineSettings,
}

impl ClassificationEngine {
    pub fn new(
        provider: Arc<dyn CompletionAdapter>,
        catalog: Arc<CategoryCatalog>,
        memory: Arc<MemoryStore>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            provider,
            catalog,
            memory,
            parser: ResponseParser::default(),
            settings,
        }
    }

    pub fn catalog(&self) -> &CategoryCatalog {
        &self.catalog
    }

    /// The memory section for the next prompt.
    pub async fn memory_context(&self) -> String {
        self.memory
            .classification_context(self.memory.context_limit())
            .await
    }

    /// Classifies `documents` in one completion call.
    ///
    /// A provider error or timeout fails the batch. An unparseable reply
    /// yields an empty list. Records come back in input order with ids
    /// `1..=N`, and each is mirrored into memory.
    pub async fn classify(
        &self,
        documents: &[DocumentSummary],
        memory_context: &str,
    ) -> Result<Vec<ClassificationRecord>, TaxsortError> {
        if documents.is_empty() {
            debug!("no documents to classify");
            return Ok(Vec::new());
        }

        let prompt = prompts::classification_prompt(&self.catalog, documents, memory_context);
        debug!(
            documents = documents.len(),
            prompt_chars = prompt.len(),
            "sending classification prompt"
        );
        let request = CompletionRequest {
            prompt,
            system_prompt: Some(prompts::CLASSIFIER_SYSTEM_PROMPT.to_string()),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        let response = tokio::time::timeout(self.settings.timeout, self.provider.complete(request))
            .await
            .map_err(|_elapsed| {
                warn!(
                    timeout_secs = self.settings.timeout.as_secs(),
                    "classification call timed out"
                );
                TaxsortError::Timeout {
                    duration: self.settings.timeout,
                }
            })??;

        let value = match self.parser.parse(&response.content) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "classification reply could not be parsed");
                return Ok(Vec::new());
            }
        };
        let Some(elements) = reply_elements(value) else {
            warn!("classification reply is not a list of classifications");
            return Ok(Vec::new());
        };

        let records = self.validate(documents, elements);
        for record in &records {
            self.memory
                .update_classification(
                    &record.file_name,
                    record.category_id,
                    &record.category_name,
                    record.confidence,
                    Some(record.reasoning.as_str()),
                )
                .await;
        }
        info!(
            documents = documents.len(),
            classified = records.len(),
            "classification batch complete"
        );
        Ok(records)
    }

    /// Classifies a batch and appends its records to `context`.
    pub async fn classify_batch(
        &self,
        mut context: ClassificationContext,
        documents: &[DocumentSummary],
        memory_context: &str,
    ) -> Result<ClassificationContext, TaxsortError> {
        for record in self.classify(documents, memory_context).await? {
            context.push(record);
        }
        Ok(context)
    }

    /// Turns reply elements into records matched against the input documents.
    fn validate(&self, documents: &[DocumentSummary], elements: Vec<Value>) -> Vec<ClassificationRecord> {
        let mut claimed = vec![false; documents.len()];
        let mut matched: Vec<(usize, ClassificationRecord)> = Vec::new();
        let mut unmatched: Vec<ClassificationRecord> = Vec::new();

        for element in elements {
            let raw: RawClassification = match serde_json::from_value(element) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(error = %e, "skipping malformed classification entry");
                    continue;
                }
            };

            let index = self.match_document(documents, &claimed, &raw);
            let file_name = match (index, raw.file_name.as_deref()) {
                (Some(i), _) => documents[i].file_name.clone(),
                (None, Some(name)) if !name.trim().is_empty() => name.to_string(),
                (None, _) => "unknown".to_string(),
            };
            if index.is_none()
                && raw.file_name.as_deref().is_some_and(|name| {
                    documents.iter().any(|d| d.file_name.eq_ignore_ascii_case(name))
                })
            {
                warn!(file_name = %file_name, "dropping duplicate classification for file");
                continue;
            }

            let category_id = match raw.category_id.as_ref().and_then(loose_i64) {
                Some(id) => CategoryId::new(id).unwrap_or_else(|| {
                    warn!(file_name = %file_name, category_id = id, "category id out of range, using 20");
                    CategoryId::UNCLASSIFIABLE
                }),
                None => {
                    warn!(
                        file_name = %file_name,
                        category_id = ?raw.category_id,
                        "category id missing or not a number, using 20"
                    );
                    CategoryId::UNCLASSIFIABLE
                }
            };
            let category = self.catalog.get(category_id);
            let document = index.map(|i| &documents[i]);

            let record = ClassificationRecord {
                id: 0,
                file_id: document.and_then(|d| d.file_id),
                file_name,
                file_path: document.and_then(|d| d.file_path.clone()),
                category_id,
                category_name: category.german_name.clone(),
                category_english: category.english_name.clone(),
                confidence: raw.confidence.as_ref().and_then(loose_confidence),
                reasoning: raw.reasoning.unwrap_or_default(),
                reclassified: false,
                reclassified_at: None,
            };
            match index {
                Some(i) => {
                    claimed[i] = true;
                    matched.push((i, record));
                }
                None => {
                    warn!(file_name = %record.file_name, "classification does not match any input document");
                    unmatched.push(record);
                }
            }
        }

        for (i, doc) in documents.iter().enumerate() {
            if !claimed[i] {
                warn!(file_name = %doc.file_name, "model returned no classification for document");
            }
        }

        matched.sort_by_key(|(i, _)| *i);
        let mut context = ClassificationContext::new();
        for record in matched.into_iter().map(|(_, r)| r).chain(unmatched) {
            context.push(record);
        }
        context.into_records()
    }

    /// Finds the unclaimed input document an entry refers to: exact file
    /// name, then case-insensitive name, then the positional `id` when the
    /// entry carries no name.
    fn match_document(
        &self,
        documents: &[DocumentSummary],
        claimed: &[bool],
        raw: &RawClassification,
    ) -> Option<usize> {
        let open = |i: &usize| !claimed[*i];
        if let Some(name) = raw.file_name.as_deref().map(str::trim) {
            return (0..documents.len())
                .filter(open)
                .find(|&i| documents[i].file_name == name)
                .or_else(|| {
                    (0..documents.len())
                        .filter(open)
                        .find(|&i| documents[i].file_name.eq_ignore_ascii_case(name))
                });
        }
        raw.id
            .as_ref()
            .and_then(loose_i64)
            .and_then(|id| usize::try_from(id).ok())
            .and_then(|id| id.checked_sub(1))
            .filter(|i| *i < documents.len() && open(i))
    }
}
