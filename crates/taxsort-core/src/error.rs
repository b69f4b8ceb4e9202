// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Taxsort classification pipeline.

use thiserror::Error;

/// The primary error type used across all Taxsort adapter traits and core operations.
///
/// Partial failures (a single file that could not be reclassified, a document
/// missing on disk during a merge) are never represented here. Those are
/// reported through per-item result structs so that a batch keeps going.
#[derive(Debug, Error)]
pub enum TaxsortError {
    /// Configuration errors (missing credentials, incomplete category catalog).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// LLM provider errors (API failure, unexpected response shape).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// LLM output could not be recovered as structured data.
    #[error("parse error: {message} (raw output starts with: {excerpt:?})")]
    Parse { message: String, excerpt: String },

    /// A project, file, or other addressed entity does not exist.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// The semantic memory backend is unreachable or returned an error.
    #[error("memory backend error: {message}")]
    MemoryBackend { message: String },

    /// Text extraction failed for a document.
    #[error("extraction failed for {path}: {message}")]
    Extraction { path: String, message: String },

    /// The merged PDF artifact could not be produced.
    #[error("merge error: {0}")]
    Merge(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TaxsortError {
    /// Builds a [`TaxsortError::Parse`] keeping only a short prefix of the raw text.
    pub fn parse(message: impl Into<String>, raw: &str) -> Self {
        TaxsortError::Parse {
            message: message.into(),
            excerpt: raw.chars().take(PARSE_EXCERPT_CHARS).collect(),
        }
    }

    /// Builds a [`TaxsortError::NotFound`] for the given entity kind.
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        TaxsortError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Returns true for the "expected" not-found outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TaxsortError::NotFound { .. })
    }
}

/// Number of characters of raw LLM output kept in parse diagnostics.
pub const PARSE_EXCERPT_CHARS: usize = 200;
