// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backend seam for the memory store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use taxsort_core::{ProjectId, TaxsortError};

use crate::types::{MemoryEntry, MemoryType, Metadata};

/// A place memory entries live.
///
/// Implemented by the SQLite vector backend and by the in-process
/// fallback. Metadata passed to [`MemoryBackend::insert`] already carries
/// the `type` and `timestamp` keys.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// Short backend name reported in stats and logs.
    fn kind(&self) -> &'static str;

    /// Stores a new entry and returns it with its assigned id.
    async fn insert(
        &self,
        content: &str,
        metadata: Metadata,
        memory_type: MemoryType,
    ) -> Result<MemoryEntry, TaxsortError>;

    /// Ranked search. Filters by type after ranking when a type is given.
    async fn search(
        &self,
        query: &str,
        limit: usize,
        memory_type: Option<MemoryType>,
    ) -> Result<Vec<MemoryEntry>, TaxsortError>;

    /// Entries newest first.
    async fn list(
        &self,
        memory_type: Option<MemoryType>,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>, TaxsortError>;

    async fn get(&self, id: &str) -> Result<Option<MemoryEntry>, TaxsortError>;

    /// Most recent entry of `memory_type` whose metadata `project_id` matches exactly.
    async fn latest_for_project(
        &self,
        memory_type: MemoryType,
        project_id: ProjectId,
    ) -> Result<Option<MemoryEntry>, TaxsortError>;

    /// Most recent entry of `memory_type` whose metadata `file_name` matches exactly.
    async fn latest_for_file_name(
        &self,
        memory_type: MemoryType,
        file_name: &str,
    ) -> Result<Option<MemoryEntry>, TaxsortError>;

    /// Replaces content and metadata in place. Returns false for an unknown id.
    async fn update(
        &self,
        id: &str,
        content: &str,
        metadata: Metadata,
    ) -> Result<bool, TaxsortError>;

    async fn delete(&self, id: &str) -> Result<bool, TaxsortError>;

    /// Removes every entry of `memory_type` scoped to the project.
    async fn delete_for_project(
        &self,
        memory_type: MemoryType,
        project_id: ProjectId,
    ) -> Result<usize, TaxsortError>;

    async fn clear(&self) -> Result<(), TaxsortError>;

    /// Entry counts keyed by type name.
    async fn counts(&self) -> Result<BTreeMap<String, usize>, TaxsortError>;

    /// Releases held connections. Must be safe to call more than once.
    async fn close(&self) -> Result<(), TaxsortError>;
}
