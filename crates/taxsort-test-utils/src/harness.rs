// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles a complete pipeline environment with a mock
//! provider, a temp SQLite database, an in-process memory store and a
//! configuration whose paths all point into the temp directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use taxsort_config::model::{StorageConfig, TaxsortConfig};
use taxsort_core::types::{DocumentSummary, Project, ProjectFile};
use taxsort_core::{StorageAdapter, TaxsortError};
use taxsort_memory::MemoryStore;
use taxsort_storage::SqliteStorage;

use crate::mock_provider::MockProvider;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    responses: Vec<String>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            responses: Vec::new(),
        }
    }

    /// Set mock provider responses.
    pub fn with_mock_responses(mut self, responses: Vec<String>) -> Self {
        self.responses = responses;
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, TaxsortError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| TaxsortError::Storage { source: e.into() })?;
        let root = temp_dir.path();
        for dir in ["uploads", "headers", "merged"] {
            std::fs::create_dir_all(root.join(dir))
                .map_err(|e| TaxsortError::Storage { source: e.into() })?;
        }

        let mut config = TaxsortConfig::default();
        config.storage = StorageConfig {
            database_path: root.join("taxsort.db").to_string_lossy().into_owned(),
            wal_mode: true,
        };
        config.memory.enabled = false;
        config.memory.database_path = root.join("memory.db").to_string_lossy().into_owned();
        config.merge.header_pages_dir = root.join("headers").to_string_lossy().into_owned();
        config.merge.output_dir = root.join("merged").to_string_lossy().into_owned();
        config.llm.api_key = Some("test-key".into());
        config.llm.endpoint = Some("https://example.openai.azure.com".into());
        config.llm.deployment = Some("test-deployment".into());

        let storage = SqliteStorage::new(config.storage.clone());
        storage.initialize().await?;
        let storage: Arc<dyn StorageAdapter> = Arc::new(storage);

        let mock_provider = Arc::new(MockProvider::with_responses(self.responses));

        Ok(TestHarness {
            mock_provider,
            storage,
            memory: Arc::new(MemoryStore::local()),
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment with mock adapters and temp storage.
pub struct TestHarness {
    /// The mock completion provider.
    pub mock_provider: Arc<MockProvider>,
    /// SQLite storage adapter (temp DB, cleaned up on drop).
    pub storage: Arc<dyn StorageAdapter>,
    /// In-process memory store.
    pub memory: Arc<MemoryStore>,
    /// Configuration with every path inside the temp directory.
    pub config: TaxsortConfig,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// The temp directory every path lives under.
    pub fn root(&self) -> &Path {
        self._temp_dir.path()
    }

    /// Writes an upload into `uploads/` and returns its path.
    pub fn write_upload(&self, name: &str, contents: &[u8]) -> Result<PathBuf, TaxsortError> {
        let path = self.root().join("uploads").join(name);
        std::fs::write(&path, contents).map_err(|e| TaxsortError::Storage { source: e.into() })?;
        Ok(path)
    }

    /// Writes the twenty category header pages into the configured directory.
    pub fn write_header_pages(&self) -> Result<(), TaxsortError> {
        crate::pdf::write_header_pages(Path::new(&self.config.merge.header_pages_dir))
    }

    /// Writes a PDF upload with one page per label and returns its path.
    pub fn write_pdf_upload(&self, name: &str, labels: &[&str]) -> Result<PathBuf, TaxsortError> {
        let path = self.root().join("uploads").join(name);
        crate::pdf::write_pdf(&path, labels)?;
        Ok(path)
    }

    /// Creates a project with one preprocessed file per `(name, summary)` pair.
    ///
    /// Files are written to disk so merge and extraction can find them.
    pub async fn seed_project(
        &self,
        name: &str,
        files: &[(&str, &str)],
    ) -> Result<(Project, Vec<ProjectFile>), TaxsortError> {
        let project = self.storage.create_project(name).await?;
        for (file_name, summary) in files {
            let path = self.write_upload(file_name, summary.as_bytes())?;
            let file = self
                .storage
                .add_file(project.id, &path.to_string_lossy())
                .await?;
            let doc = DocumentSummary {
                file_id: Some(file.id),
                file_name: (*file_name).to_string(),
                file_path: Some(file.file_path.clone()),
                summary: (*summary).to_string(),
                keywords: Vec::new(),
                document_type: "document".into(),
                key_entities: Default::default(),
            };
            self.storage.save_preprocessing(file.id, &doc).await?;
        }
        let files = self.storage.list_files(project.id).await?;
        Ok((project, files))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn harness_builds_with_defaults() {
        let harness = TestHarness::builder().build().await.unwrap();
        assert!(harness.storage.list_projects().await.unwrap().is_empty());
        assert!(harness.root().join("headers").is_dir());
        assert!(harness.config.llm.missing_credentials().is_empty());
    }

    #[tokio::test]
    async fn seed_project_writes_files_and_summaries() {
        let harness = TestHarness::builder().build().await.unwrap();
        let (project, files) = harness
            .seed_project("Mustermann 2025", &[("lohn.pdf", "wage certificate"), ("kap.pdf", "bank")])
            .await
            .unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.project_id == project.id));
        assert!(files.iter().all(ProjectFile::is_preprocessed));
        assert!(Path::new(&files[0].file_path).exists());
    }

    #[tokio::test]
    async fn header_pages_land_in_configured_dir() {
        let harness = TestHarness::builder().build().await.unwrap();
        harness.write_header_pages().unwrap();
        let headers = Path::new(&harness.config.merge.header_pages_dir);
        assert!(headers.join("page_013.pdf").exists());
    }

    #[tokio::test]
    async fn harness_provider_replays_responses() {
        use taxsort_core::CompletionAdapter;
        use taxsort_core::types::CompletionRequest;

        let harness = TestHarness::builder()
            .with_mock_responses(vec!["[]".into()])
            .build()
            .await
            .unwrap();
        let reply = harness
            .mock_provider
            .complete(CompletionRequest {
                prompt: "p".into(),
                system_prompt: None,
                max_tokens: 10,
                temperature: 0.0,
            })
            .await
            .unwrap();
        assert_eq!(reply.content, "[]");
    }
}
