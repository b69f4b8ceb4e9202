// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rebuilding the memory snapshot from the persistent store.
//!
//! The persistent store is authoritative. After any mutation the project's
//! snapshot is regenerated from its file rows, never patched in reverse.

use tracing::info;

use taxsort_core::types::{ClassificationRecord, ProjectFile, ProjectResultSet};
use taxsort_core::{ProjectId, StorageAdapter, TaxsortError};
use taxsort_memory::{MemoryStore, now_timestamp};

/// Classification records for every categorized file, numbered `1..=N` in
/// upload order.
pub fn classified_records(files: &[ProjectFile]) -> Vec<ClassificationRecord> {
    files
        .iter()
        .filter(|f| f.category_id.is_some())
        .enumerate()
        .filter_map(|(i, f)| f.to_classification_record(u32::try_from(i + 1).unwrap_or(u32::MAX)))
        .collect()
}

/// Rebuilds and stores the project's snapshot from the persistent store.
pub async fn resync(
    storage: &dyn StorageAdapter,
    memory: &MemoryStore,
    project_id: ProjectId,
) -> Result<ProjectResultSet, TaxsortError> {
    let project = storage
        .get_project(project_id)
        .await?
        .ok_or_else(|| TaxsortError::not_found("project", project_id))?;
    let files = storage.list_files(project_id).await?;

    let classifications = classified_records(&files);
    let result_set = ProjectResultSet {
        project_id,
        total_documents: classifications.len(),
        classifications,
        documents: files.iter().map(ProjectFile::to_project_document).collect(),
        merged_pdf_path: project.merged_pdf_path,
        updated_at: now_timestamp(),
    };
    memory.save_result_set(&result_set).await;
    info!(
        project_id,
        classified = result_set.total_documents,
        files = result_set.documents.len(),
        "resynced project memory"
    );
    Ok(result_set)
}
