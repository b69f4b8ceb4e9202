// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Taxsort tax-document classification pipeline.
//!
//! This crate provides the error type, the domain types shared by the
//! classification, memory, reclassification and merge crates, and the
//! adapter traits behind which every external collaborator sits.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::TaxsortError;
pub use types::{AdapterType, CategoryId, FileId, HealthStatus, ProjectId};

// Re-export all adapter traits at crate root.
pub use traits::{
    CompletionAdapter, ContentExtractor, EmbeddingAdapter, PluginAdapter, StorageAdapter,
};
