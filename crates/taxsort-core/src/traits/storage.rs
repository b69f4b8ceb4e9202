// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for the persistent store (SQLite, etc.).

use async_trait::async_trait;

use crate::error::TaxsortError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    AppliedChange, CategoryAssignment, CategoryChange, DocumentSummary, FileId, Project,
    ProjectFile, ProjectId, ProjectStatus, QueueEntry,
};

/// Adapter for the persistent store.
///
/// The persistent store is the source of truth for per-file category state.
/// The memory store is always rebuilt from it, never the reverse.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), TaxsortError>;

    /// Closes the storage backend, flushing pending writes and releasing connections.
    async fn close(&self) -> Result<(), TaxsortError>;

    // --- Project operations ---

    /// Creates a project in the `pending` state.
    async fn create_project(&self, name: &str) -> Result<Project, TaxsortError>;

    /// Retrieves a project by ID.
    async fn get_project(&self, id: ProjectId) -> Result<Option<Project>, TaxsortError>;

    /// Lists all projects, newest first.
    async fn list_projects(&self) -> Result<Vec<Project>, TaxsortError>;

    /// Updates the processing status of a project.
    async fn set_project_status(
        &self,
        id: ProjectId,
        status: ProjectStatus,
    ) -> Result<(), TaxsortError>;

    /// Records the path of the project's current merged artifact.
    async fn set_merged_pdf_path(&self, id: ProjectId, path: &str) -> Result<(), TaxsortError>;

    // --- File operations ---

    /// Registers an uploaded file with a project.
    async fn add_file(
        &self,
        project_id: ProjectId,
        file_path: &str,
    ) -> Result<ProjectFile, TaxsortError>;

    /// Retrieves a file scoped to its project. A file id from another
    /// project yields `None`.
    async fn get_file(
        &self,
        project_id: ProjectId,
        file_id: FileId,
    ) -> Result<Option<ProjectFile>, TaxsortError>;

    /// Lists all files of a project in upload order.
    async fn list_files(&self, project_id: ProjectId) -> Result<Vec<ProjectFile>, TaxsortError>;

    /// Stores preprocessing output on the file row.
    async fn save_preprocessing(
        &self,
        file_id: FileId,
        summary: &DocumentSummary,
    ) -> Result<(), TaxsortError>;

    /// Writes a first-time classification to the file row.
    async fn record_classification(
        &self,
        file_id: FileId,
        assignment: &CategoryAssignment,
    ) -> Result<(), TaxsortError>;

    /// Reclassifies a file inside one transaction, appending the reasoning
    /// to the existing trail. Returns `None` if the file does not belong to
    /// the project.
    async fn apply_category_change(
        &self,
        project_id: ProjectId,
        file_id: FileId,
        change: &CategoryChange,
    ) -> Result<Option<AppliedChange>, TaxsortError>;

    // --- Queue operations ---

    /// Enqueues a job payload. Returns the queue entry ID.
    async fn enqueue(&self, queue_name: &str, payload: &str) -> Result<i64, TaxsortError>;

    /// Claims the next pending entry, if any.
    async fn dequeue(&self, queue_name: &str) -> Result<Option<QueueEntry>, TaxsortError>;

    /// Marks an entry as completed.
    async fn ack(&self, id: i64) -> Result<(), TaxsortError>;

    /// Records a failed attempt for an entry.
    async fn fail(&self, id: i64) -> Result<(), TaxsortError>;
}
