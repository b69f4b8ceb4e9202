// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and the Taxsort pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Identifier of a project (one taxpayer's batch of uploaded documents).
pub type ProjectId = i64;

/// Identifier of a single uploaded file within a project.
pub type FileId = i64;

/// Confidence assumed wherever a classification carries none.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Number of fixed classification categories.
pub const CATEGORY_COUNT: u8 = 20;

/// A category id, guaranteed to lie in `1..=20`.
///
/// Deserializing an out-of-range integer fails; callers that want the
/// permissive LLM behavior use [`CategoryId::coerce`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct CategoryId(u8);

impl CategoryId {
    /// The sentinel "not usable / unclassifiable" category.
    pub const UNCLASSIFIABLE: CategoryId = CategoryId(CATEGORY_COUNT);

    /// Returns the id if it is within `1..=20`.
    pub fn new(id: i64) -> Option<Self> {
        if (1..=i64::from(CATEGORY_COUNT)).contains(&id) {
            Some(CategoryId(id as u8))
        } else {
            None
        }
    }

    /// Maps a missing or out-of-range id onto [`CategoryId::UNCLASSIFIABLE`].
    pub fn coerce(id: Option<i64>) -> Self {
        id.and_then(Self::new).unwrap_or(Self::UNCLASSIFIABLE)
    }

    /// Raw numeric value.
    pub fn get(self) -> u8 {
        self.0
    }

    /// All twenty categories in ascending order.
    pub fn all() -> impl Iterator<Item = CategoryId> {
        (1..=CATEGORY_COUNT).map(CategoryId)
    }
}

impl TryFrom<i64> for CategoryId {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        CategoryId::new(value)
            .ok_or_else(|| format!("category id {value} outside 1..={CATEGORY_COUNT}"))
    }
}

impl From<CategoryId> for i64 {
    fn from(id: CategoryId) -> Self {
        i64::from(id.0)
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the type of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Provider,
    Embedding,
    Storage,
    Extractor,
    Memory,
}

// --- Provider types ---

/// A single-shot completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// The user prompt.
    pub prompt: String,
    /// Optional system prompt sent ahead of the user prompt.
    pub system_prompt: Option<String>,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    /// Sampling temperature. Low values favor deterministic output.
    pub temperature: f32,
}

/// The text returned by a completion call.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

// --- Embedding types ---

/// Input for an embedding adapter.
#[derive(Debug, Clone)]
pub struct EmbeddingInput {
    pub texts: Vec<String>,
}

/// Output from an embedding adapter, one vector per input text.
#[derive(Debug, Clone)]
pub struct EmbeddingOutput {
    pub embeddings: Vec<Vec<f32>>,
    pub dimensions: usize,
}

// --- Extraction types ---

/// Text extracted from a document by a [`crate::ContentExtractor`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub success: bool,
    pub content: String,
    pub page_contents: Vec<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

// --- Classification types ---

/// Preprocessing output for one document, consumed by the classifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub file_id: Option<FileId>,
    pub file_name: String,
    pub file_path: Option<String>,
    pub summary: String,
    pub keywords: Vec<String>,
    pub document_type: String,
    pub key_entities: BTreeMap<String, Vec<String>>,
}

/// The assignment of one file to a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRecord {
    /// Sequential result id within the batch or snapshot (1-based).
    pub id: u32,
    pub file_id: Option<FileId>,
    pub file_name: String,
    #[serde(default)]
    pub file_path: Option<String>,
    pub category_id: CategoryId,
    pub category_name: String,
    pub category_english: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub reclassified: bool,
    #[serde(default)]
    pub reclassified_at: Option<String>,
}

impl ClassificationRecord {
    /// Confidence with the workspace-wide default applied.
    pub fn confidence_or_default(&self) -> f64 {
        self.confidence.unwrap_or(DEFAULT_CONFIDENCE)
    }
}

/// A document reference stored alongside a project snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDocument {
    pub file_id: FileId,
    pub file_name: String,
    pub file_path: String,
}

/// Full set of classification records for a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectResultSet {
    pub project_id: ProjectId,
    pub classifications: Vec<ClassificationRecord>,
    #[serde(default)]
    pub documents: Vec<ProjectDocument>,
    #[serde(default)]
    pub merged_pdf_path: Option<String>,
    pub total_documents: usize,
    pub updated_at: String,
}

impl ProjectResultSet {
    /// Looks up the record for a file id.
    pub fn record_for_file(&self, file_id: FileId) -> Option<&ClassificationRecord> {
        self.classifications
            .iter()
            .find(|r| r.file_id == Some(file_id))
    }
}

// --- Persistent store types ---

/// Processing state of a project.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// A project row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub status: ProjectStatus,
    pub merged_pdf_path: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A file row, including its preprocessing output and current category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFile {
    pub id: FileId,
    pub project_id: ProjectId,
    pub file_path: String,
    pub file_type: String,
    pub summary: Option<String>,
    pub keywords: Vec<String>,
    pub document_type: Option<String>,
    pub key_entities: BTreeMap<String, Vec<String>>,
    pub category_id: Option<CategoryId>,
    pub category_german: Option<String>,
    pub category_english: Option<String>,
    pub confidence: Option<f64>,
    pub reasoning: Option<String>,
    pub reclassified: bool,
    pub reclassified_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ProjectFile {
    /// The final path component, or the whole path if it has none.
    pub fn file_name(&self) -> String {
        Path::new(&self.file_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file_path.clone())
    }

    /// True once preprocessing has stored a summary.
    pub fn is_preprocessed(&self) -> bool {
        self.summary.is_some()
    }

    /// Builds the classifier input from the stored preprocessing fields.
    pub fn to_document_summary(&self) -> DocumentSummary {
        DocumentSummary {
            file_id: Some(self.id),
            file_name: self.file_name(),
            file_path: Some(self.file_path.clone()),
            summary: self.summary.clone().unwrap_or_default(),
            keywords: self.keywords.clone(),
            document_type: self.document_type.clone().unwrap_or_default(),
            key_entities: self.key_entities.clone(),
        }
    }

    /// Builds a classification record from the stored category, if any.
    pub fn to_classification_record(&self, id: u32) -> Option<ClassificationRecord> {
        let category_id = self.category_id?;
        Some(ClassificationRecord {
            id,
            file_id: Some(self.id),
            file_name: self.file_name(),
            file_path: Some(self.file_path.clone()),
            category_id,
            category_name: self.category_german.clone().unwrap_or_default(),
            category_english: self.category_english.clone().unwrap_or_default(),
            confidence: self.confidence,
            reasoning: self.reasoning.clone().unwrap_or_default(),
            reclassified: self.reclassified,
            reclassified_at: self.reclassified_at.clone(),
        })
    }

    /// Builds the snapshot document reference for this file.
    pub fn to_project_document(&self) -> ProjectDocument {
        ProjectDocument {
            file_id: self.id,
            file_name: self.file_name(),
            file_path: self.file_path.clone(),
        }
    }
}

/// First-time classification written to a file row.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryAssignment {
    pub category_id: CategoryId,
    pub category_german: String,
    pub category_english: String,
    pub confidence: Option<f64>,
    pub reasoning: String,
}

/// A reclassification written to a file row. The reasoning is appended to
/// the existing trail rather than replacing it.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryChange {
    pub category_id: CategoryId,
    pub category_german: String,
    pub category_english: String,
    pub reasoning: String,
}

/// Outcome of a committed [`CategoryChange`].
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedChange {
    pub old_category_id: Option<CategoryId>,
    pub reasoning_trail: String,
}

/// A job queue entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: i64,
    pub queue_name: String,
    pub payload: String,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub created_at: String,
    pub updated_at: String,
    pub locked_until: Option<String>,
}
