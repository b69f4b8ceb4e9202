// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use taxsort_config::model::StorageConfig;
use taxsort_core::types::{
    AppliedChange, CategoryAssignment, CategoryChange, DocumentSummary, FileId, Project,
    ProjectFile, ProjectId, ProjectStatus, QueueEntry,
};
use taxsort_core::{AdapterType, HealthStatus, PluginAdapter, StorageAdapter, TaxsortError};

use crate::database::Database;
use crate::queries;

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules. The database is lazily initialized on the first
/// call to [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    ///
    /// The database connection is not opened until [`StorageAdapter::initialize`] is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Wraps an already opened database (used with in-memory databases).
    pub fn from_database(db: Database) -> Self {
        Self {
            config: StorageConfig {
                database_path: ":memory:".to_string(),
                wal_mode: false,
            },
            db: OnceCell::new_with(Some(db)),
        }
    }

    /// Returns a reference to the underlying Database, or an error if not initialized.
    fn db(&self) -> Result<&Database, TaxsortError> {
        self.db.get().ok_or_else(|| TaxsortError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, TaxsortError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TaxsortError> {
        if let Some(db) = self.db.get() {
            db.close().await?;
            debug!("shutdown: storage closed");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), TaxsortError> {
        let db = Database::open_with_wal(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| TaxsortError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), TaxsortError> {
        self.db()?.close().await
    }

    // --- Project operations ---

    async fn create_project(&self, name: &str) -> Result<Project, TaxsortError> {
        queries::projects::create_project(self.db()?, name).await
    }

    async fn get_project(&self, id: ProjectId) -> Result<Option<Project>, TaxsortError> {
        queries::projects::get_project(self.db()?, id).await
    }

    async fn list_projects(&self) -> Result<Vec<Project>, TaxsortError> {
        queries::projects::list_projects(self.db()?).await
    }

    async fn set_project_status(
        &self,
        id: ProjectId,
        status: ProjectStatus,
    ) -> Result<(), TaxsortError> {
        queries::projects::set_status(self.db()?, id, status).await
    }

    async fn set_merged_pdf_path(&self, id: ProjectId, path: &str) -> Result<(), TaxsortError> {
        queries::projects::set_merged_pdf_path(self.db()?, id, path).await
    }

    // --- File operations ---

    async fn add_file(
        &self,
        project_id: ProjectId,
        file_path: &str,
    ) -> Result<ProjectFile, TaxsortError> {
        queries::files::add_file(self.db()?, project_id, file_path).await
    }

    async fn get_file(
        &self,
        project_id: ProjectId,
        file_id: FileId,
    ) -> Result<Option<ProjectFile>, TaxsortError> {
        queries::files::get_file(self.db()?, project_id, file_id).await
    }

    async fn list_files(&self, project_id: ProjectId) -> Result<Vec<ProjectFile>, TaxsortError> {
        queries::files::list_files(self.db()?, project_id).await
    }

    async fn save_preprocessing(
        &self,
        file_id: FileId,
        summary: &DocumentSummary,
    ) -> Result<(), TaxsortError> {
        queries::files::save_preprocessing(self.db()?, file_id, summary).await
    }

    async fn record_classification(
        &self,
        file_id: FileId,
        assignment: &CategoryAssignment,
    ) -> Result<(), TaxsortError> {
        queries::files::record_classification(self.db()?, file_id, assignment).await
    }

    async fn apply_category_change(
        &self,
        project_id: ProjectId,
        file_id: FileId,
        change: &CategoryChange,
    ) -> Result<Option<AppliedChange>, TaxsortError> {
        queries::files::apply_category_change(self.db()?, project_id, file_id, change).await
    }

    // --- Queue operations ---

    async fn enqueue(&self, queue_name: &str, payload: &str) -> Result<i64, TaxsortError> {
        queries::queue::enqueue(self.db()?, queue_name, payload).await
    }

    async fn dequeue(&self, queue_name: &str) -> Result<Option<QueueEntry>, TaxsortError> {
        queries::queue::dequeue(self.db()?, queue_name).await
    }

    async fn ack(&self, id: i64) -> Result<(), TaxsortError> {
        queries::queue::ack(self.db()?, id).await
    }

    async fn fail(&self, id: i64) -> Result<(), TaxsortError> {
        queries::queue::fail(self.db()?, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taxsort_core::CategoryId;
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        }
    }

    #[tokio::test]
    async fn sqlite_storage_implements_plugin_adapter() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        assert_eq!(storage.name(), "sqlite");
        assert_eq!(storage.version(), semver::Version::new(0, 1, 0));
        assert_eq!(storage.adapter_type(), AdapterType::Storage);
    }

    #[tokio::test]
    async fn initialize_twice_returns_error() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("double_init.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        storage.initialize().await.unwrap();
        assert!(db_path.exists(), "database file should be created");
        assert!(storage.initialize().await.is_err(), "second initialize should fail");
    }

    #[tokio::test]
    async fn health_check_tracks_initialization() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("health.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        assert!(storage.health_check().await.is_err());
        storage.initialize().await.unwrap();
        assert_eq!(storage.health_check().await.unwrap(), HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn project_lifecycle_through_adapter() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("lifecycle.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));
        storage.initialize().await.unwrap();

        let project = storage.create_project("Familie Muster 2025").await.unwrap();
        let file = storage
            .add_file(project.id, "/uploads/kontoauszug.pdf")
            .await
            .unwrap();

        storage
            .record_classification(
                file.id,
                &CategoryAssignment {
                    category_id: CategoryId::new(13).unwrap(),
                    category_german: "KAP".into(),
                    category_english: "Capital income".into(),
                    confidence: Some(0.92),
                    reasoning: "Jahressteuerbescheinigung".into(),
                },
            )
            .await
            .unwrap();

        let applied = storage
            .apply_category_change(
                project.id,
                file.id,
                &CategoryChange {
                    category_id: CategoryId::new(19).unwrap(),
                    category_german: "Sonstiges".into(),
                    category_english: "Other".into(),
                    reasoning: "user moved it".into(),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(applied.old_category_id, CategoryId::new(13));

        let files = storage.list_files(project.id).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].category_id, CategoryId::new(19));

        storage
            .set_project_status(project.id, ProjectStatus::Completed)
            .await
            .unwrap();
        let fetched = storage.get_project(project.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, ProjectStatus::Completed);

        storage.close().await.unwrap();
    }

    #[tokio::test]
    async fn queue_operations_through_adapter() {
        let db = Database::open_in_memory().await.unwrap();
        let storage = SqliteStorage::from_database(db);

        let id = storage
            .enqueue("classification", r#"{"kind":"classify","project_id":1}"#)
            .await
            .unwrap();
        let entry = storage.dequeue("classification").await.unwrap().unwrap();
        assert_eq!(entry.id, id);
        storage.ack(entry.id).await.unwrap();
        assert!(storage.dequeue("classification").await.unwrap().is_none());
    }
}
