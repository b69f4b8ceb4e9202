// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end ingestion for one project.
//!
//! Stages run in order: preprocess pending files, classify the unclassified
//! ones in a single batch, persist each record, snapshot into memory, merge,
//! and finally resync memory from the persistent store.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use taxsort_classify::{CategoryCatalog, ClassificationContext, ClassificationEngine, EngineSettings};
use taxsort_config::model::TaxsortConfig;
use taxsort_core::types::{CategoryAssignment, ClassificationRecord, ProjectFile, ProjectStatus};
use taxsort_core::{CategoryId, CompletionAdapter, ProjectId, StorageAdapter, TaxsortError};
use taxsort_memory::MemoryStore;
use taxsort_merge::{DocumentMergeCoordinator, LopdfPageSource, MergeInput, MergeResult, PageSource};
use taxsort_reclassify::resync;

use crate::preprocess::Preprocessor;

/// What one pipeline run did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineOutcome {
    pub project_id: ProjectId,
    pub documents_processed: usize,
    pub preprocessing_failures: Vec<String>,
    pub documents_classified: usize,
    pub category_counts: BTreeMap<CategoryId, usize>,
    pub merge: Option<MergeResult>,
}

pub struct ClassificationPipeline<S: PageSource = LopdfPageSource> {
    storage: Arc<dyn StorageAdapter>,
    memory: Arc<MemoryStore>,
    preprocessor: Preprocessor,
    engine: ClassificationEngine,
    merger: Arc<DocumentMergeCoordinator<S>>,
}

impl ClassificationPipeline {
    /// Wires the pipeline from configuration with the lopdf page source.
    pub fn from_config(
        config: &TaxsortConfig,
        storage: Arc<dyn StorageAdapter>,
        memory: Arc<MemoryStore>,
        catalog: Arc<CategoryCatalog>,
        provider: Arc<dyn CompletionAdapter>,
    ) -> Self {
        let classification = EngineSettings::from_config(&config.llm);
        let analysis = EngineSettings {
            max_tokens: config.llm.max_tokens,
            ..classification
        };
        Self::new(
            Arc::clone(&storage),
            Arc::clone(&memory),
            Preprocessor::new(Arc::clone(&provider), analysis),
            ClassificationEngine::new(provider, catalog, memory, classification),
            Arc::new(DocumentMergeCoordinator::from_config(&config.merge)),
        )
    }
}

impl<S: PageSource> ClassificationPipeline<S> {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        memory: Arc<MemoryStore>,
        preprocessor: Preprocessor,
        engine: ClassificationEngine,
        merger: Arc<DocumentMergeCoordinator<S>>,
    ) -> Self {
        Self {
            storage,
            memory,
            preprocessor,
            engine,
            merger,
        }
    }

    /// Runs every stage for `project_id`.
    ///
    /// The project moves to `processing` first and to `completed` or
    /// `failed` at the end. Files preprocessed before a failure stay
    /// preprocessed.
    pub async fn run(&self, project_id: ProjectId) -> Result<PipelineOutcome, TaxsortError> {
        let project = self
            .storage
            .get_project(project_id)
            .await?
            .ok_or_else(|| TaxsortError::not_found("project", project_id))?;
        self.storage
            .set_project_status(project_id, ProjectStatus::Processing)
            .await?;
        info!(project_id, name = %project.name, "pipeline started");

        match self.stages(project_id, &project.name).await {
            Ok(outcome) => {
                self.storage
                    .set_project_status(project_id, ProjectStatus::Completed)
                    .await?;
                info!(
                    project_id,
                    processed = outcome.documents_processed,
                    classified = outcome.documents_classified,
                    "pipeline completed"
                );
                Ok(outcome)
            }
            Err(e) => {
                error!(project_id, error = %e, "pipeline failed");
                if let Err(status_err) = self
                    .storage
                    .set_project_status(project_id, ProjectStatus::Failed)
                    .await
                {
                    warn!(project_id, error = %status_err, "could not mark project failed");
                }
                Err(e)
            }
        }
    }

    async fn stages(
        &self,
        project_id: ProjectId,
        project_name: &str,
    ) -> Result<PipelineOutcome, TaxsortError> {
        let mut outcome = PipelineOutcome {
            project_id,
            ..PipelineOutcome::default()
        };

        for file in self.storage.list_files(project_id).await? {
            if file.is_preprocessed() {
                continue;
            }
            match self.preprocessor.preprocess(self.storage.as_ref(), &file).await {
                Ok(_) => outcome.documents_processed += 1,
                Err(e) => {
                    warn!(project_id, file_id = file.id, error = %e, "preprocessing failed");
                    outcome
                        .preprocessing_failures
                        .push(format!("{}: {e}", file.file_name()));
                }
            }
        }

        let files = self.storage.list_files(project_id).await?;
        let pending: Vec<_> = files
            .iter()
            .filter(|f| f.is_preprocessed() && f.category_id.is_none())
            .map(ProjectFile::to_document_summary)
            .collect();

        let memory_context = self.engine.memory_context().await;
        let context = self
            .engine
            .classify_batch(ClassificationContext::new(), &pending, &memory_context)
            .await?;
        outcome.category_counts = context.category_counts();

        let records = context.into_records();
        outcome.documents_classified = self.persist(project_id, &records).await?;

        let files = self.storage.list_files(project_id).await?;
        self.memory
            .save_project_results(
                project_id,
                records,
                files.iter().map(ProjectFile::to_project_document).collect(),
                None,
            )
            .await;

        let inputs: Vec<MergeInput> = files
            .iter()
            .filter(|f| f.category_id.is_some())
            .map(MergeInput::from)
            .collect();
        if inputs.is_empty() {
            warn!(project_id, "no classified files, skipping merge");
        } else {
            let merged = self.merger.merge(project_id, Some(project_name), inputs).await;
            if let Some(path) = merged.merged_pdf_path.as_deref().filter(|_| merged.success) {
                self.storage.set_merged_pdf_path(project_id, path).await?;
            }
            outcome.merge = Some(merged);
        }

        resync(self.storage.as_ref(), &self.memory, project_id).await?;
        Ok(outcome)
    }

    /// Writes each record to its file row. Records the model attached to
    /// no known file are skipped.
    async fn persist(
        &self,
        project_id: ProjectId,
        records: &[ClassificationRecord],
    ) -> Result<usize, TaxsortError> {
        let mut written = 0;
        for record in records {
            let Some(file_id) = record.file_id else {
                warn!(project_id, file_name = %record.file_name, "classification names no project file");
                continue;
            };
            self.storage
                .record_classification(
                    file_id,
                    &CategoryAssignment {
                        category_id: record.category_id,
                        category_german: record.category_name.clone(),
                        category_english: record.category_english.clone(),
                        confidence: record.confidence,
                        reasoning: record.reasoning.clone(),
                    },
                )
                .await?;
            written += 1;
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use taxsort_test_utils::TestHarness;

    use super::*;

    fn analysis(summary: &str) -> String {
        json!({
            "summary": summary,
            "keywords": [],
            "document_type": "document",
            "key_entities": {}
        })
        .to_string()
    }

    async fn project_with_uploads(harness: &TestHarness) -> ProjectId {
        let project = harness.storage.create_project("Mustermann").await.unwrap();
        for (name, label) in [("lohn.pdf", "Lohnsteuerbescheinigung"), ("miete.pdf", "Mietvertrag")] {
            let path = harness.write_pdf_upload(name, &[label]).unwrap();
            harness
                .storage
                .add_file(project.id, &path.to_string_lossy())
                .await
                .unwrap();
        }
        project.id
    }

    fn pipeline(harness: &TestHarness) -> ClassificationPipeline {
        ClassificationPipeline::from_config(
            &harness.config,
            Arc::clone(&harness.storage),
            Arc::clone(&harness.memory),
            Arc::new(CategoryCatalog::builtin().unwrap()),
            harness.mock_provider.clone(),
        )
    }

    #[tokio::test]
    async fn run_classifies_merges_and_snapshots() {
        let harness = TestHarness::builder()
            .with_mock_responses(vec![
                analysis("Wage statement"),
                analysis("Rental contract"),
                json!([
                    {"id": 1, "file_name": "lohn.pdf", "category_id": 11, "confidence": 0.9, "reasoning": "wage"},
                    {"id": 2, "file_name": "miete.pdf", "category_id": 99, "reasoning": "unsure"}
                ])
                .to_string(),
            ])
            .build()
            .await
            .unwrap();
        harness.write_header_pages().unwrap();
        let project_id = project_with_uploads(&harness).await;

        let outcome = pipeline(&harness).run(project_id).await.unwrap();
        assert_eq!(outcome.documents_processed, 2);
        assert_eq!(outcome.documents_classified, 2);
        assert_eq!(outcome.category_counts[&CategoryId::new(11).unwrap()], 1);
        assert_eq!(outcome.category_counts[&CategoryId::UNCLASSIFIABLE], 1);
        let merge = outcome.merge.unwrap();
        assert!(merge.success);
        assert_eq!(merge.documents_merged, 2);

        let project = harness.storage.get_project(project_id).await.unwrap().unwrap();
        assert_eq!(project.status, ProjectStatus::Completed);
        assert_eq!(project.merged_pdf_path, merge.merged_pdf_path);

        let snapshot = harness.memory.get_project_results(project_id).await.unwrap();
        assert_eq!(snapshot.total_documents, 2);
        assert_eq!(snapshot.merged_pdf_path, merge.merged_pdf_path);
        let files = harness.storage.list_files(project_id).await.unwrap();
        assert_eq!(
            snapshot.record_for_file(files[1].id).unwrap().category_id,
            CategoryId::UNCLASSIFIABLE
        );
    }

    #[tokio::test]
    async fn provider_failure_marks_project_failed() {
        let harness = TestHarness::builder()
            .with_mock_responses(vec![analysis("a"), analysis("b")])
            .build()
            .await
            .unwrap();
        harness.mock_provider.add_failure("service unavailable").await;
        let project_id = project_with_uploads(&harness).await;

        let err = pipeline(&harness).run(project_id).await.unwrap_err();
        assert!(matches!(err, TaxsortError::Provider { .. }));

        let project = harness.storage.get_project(project_id).await.unwrap().unwrap();
        assert_eq!(project.status, ProjectStatus::Failed);
        let files = harness.storage.list_files(project_id).await.unwrap();
        assert!(files.iter().all(|f| f.is_preprocessed() && f.category_id.is_none()));
    }

    #[tokio::test]
    async fn rerun_leaves_classified_files_alone() {
        let harness = TestHarness::builder()
            .with_mock_responses(vec![
                analysis("a"),
                analysis("b"),
                json!([
                    {"file_name": "lohn.pdf", "category_id": 11},
                    {"file_name": "miete.pdf", "category_id": 19}
                ])
                .to_string(),
            ])
            .build()
            .await
            .unwrap();
        harness.write_header_pages().unwrap();
        let project_id = project_with_uploads(&harness).await;
        let pipeline = pipeline(&harness);
        pipeline.run(project_id).await.unwrap();
        assert_eq!(harness.mock_provider.call_count().await, 3);

        let outcome = pipeline.run(project_id).await.unwrap();
        assert_eq!(outcome.documents_processed, 0);
        assert_eq!(outcome.documents_classified, 0);
        assert_eq!(harness.mock_provider.call_count().await, 3);
        assert_eq!(outcome.merge.unwrap().documents_merged, 2);
    }

    #[tokio::test]
    async fn missing_project_is_not_found() {
        let harness = TestHarness::builder().build().await.unwrap();
        let err = pipeline(&harness).run(77).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
