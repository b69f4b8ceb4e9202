// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory domain types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use taxsort_core::types::{CategoryId, FileId};

/// Metadata attached to every memory entry.
pub type Metadata = Map<String, Value>;

/// What a memory entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// One file's classification outcome.
    Classification,
    /// A preprocessing summary of one document.
    Summary,
    /// A full project snapshot.
    ProjectResults,
    /// Free-form context.
    Context,
}

impl MemoryType {
    /// Convert to string for SQLite storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Classification => "classification",
            MemoryType::Summary => "summary",
            MemoryType::ProjectResults => "project_results",
            MemoryType::Context => "context",
        }
    }

    /// Parse from SQLite string. Unknown values map to `Context`.
    pub fn from_str_value(s: &str) -> Self {
        match s {
            "classification" => MemoryType::Classification,
            "summary" => MemoryType::Summary,
            "project_results" => MemoryType::ProjectResults,
            _ => MemoryType::Context,
        }
    }
}

/// A unit of storage in a memory backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Opaque identifier (UUID for the vector backend, `mem_<seq>_<ts>` locally).
    pub id: String,
    pub content: String,
    /// Caller metadata merged with `type` and `timestamp`.
    pub metadata: Metadata,
    pub memory_type: MemoryType,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// Similarity score when returned from a semantic search.
    #[serde(skip)]
    pub score: Option<f32>,
}

impl MemoryEntry {
    /// Integer metadata field, if present.
    pub fn metadata_i64(&self, key: &str) -> Option<i64> {
        self.metadata.get(key).and_then(Value::as_i64)
    }

    /// String metadata field, if present.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// One item of a bulk project-snapshot update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectClassificationUpdate {
    pub file_id: FileId,
    pub category_id: CategoryId,
    pub category_name: String,
    pub category_english: String,
    pub reasoning: Option<String>,
}

/// A bulk update item that could not be applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedUpdate {
    pub file_id: FileId,
    pub error: String,
}

/// Outcome of a bulk project-snapshot update. Never an error: unmatched
/// file ids are collected in `failed_updates`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkUpdateOutcome {
    pub success: bool,
    pub updated_count: usize,
    pub failed_updates: Vec<FailedUpdate>,
}

/// Counts reported by [`crate::MemoryStore::stats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryStats {
    /// `vector` when the semantic backend is active, `local` otherwise.
    pub backend: String,
    pub total: usize,
    pub by_type: BTreeMap<String, usize>,
}

/// Convert f32 vector to bytes for SQLite BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert SQLite BLOB back to f32 vector. Trailing partial chunks are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity between two vectors. Returns `None` on a dimension
/// mismatch or a zero vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a * norm_b))
}

/// Current UTC time as ISO 8601 with millisecond precision.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
