// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command implementations. Each returns a serializable result that `main`
//! prints as JSON.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use taxsort_agent::{ClassificationPipeline, JobPayload, PipelineOutcome, Worker, WorkerStats};
use taxsort_classify::{ClassificationSummary, summarize, validate_workflow, write_results_report};
use taxsort_core::types::{Project, ProjectFile, ProjectResultSet};
use taxsort_core::{CategoryId, FileId, ProjectId, TaxsortError};
use taxsort_memory::MemoryStore;
use taxsort_merge::{DocumentMergeCoordinator, MergeInput, MergeResult};
use taxsort_reclassify::{
    ReclassificationEngine, ReclassificationResult, ReclassificationUpdate, reclassification_settings,
    resync,
};

use crate::app::App;

/// Parses `FILE_ID=CATEGORY_ID`.
pub fn parse_update(raw: &str) -> Result<(FileId, CategoryId), String> {
    let (file, category) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected FILE_ID=CATEGORY_ID, got `{raw}`"))?;
    let file_id = file
        .trim()
        .parse::<FileId>()
        .map_err(|e| format!("invalid file id `{file}`: {e}"))?;
    let category = category
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(CategoryId::new)
        .ok_or_else(|| format!("category must be between 1 and 20, got `{category}`"))?;
    Ok((file_id, category))
}

pub async fn create_project(app: &App, name: &str) -> Result<Project, TaxsortError> {
    let project = app.storage.create_project(name).await?;
    info!(project_id = project.id, name, "created project");
    Ok(project)
}

pub async fn list_projects(app: &App) -> Result<Vec<Project>, TaxsortError> {
    app.storage.list_projects().await
}

/// Registers files with a project. Paths are stored absolute.
pub async fn add_files(
    app: &App,
    project_id: ProjectId,
    paths: &[PathBuf],
) -> Result<Vec<ProjectFile>, TaxsortError> {
    require_project(app, project_id).await?;
    let mut added = Vec::with_capacity(paths.len());
    for path in paths {
        let absolute = std::fs::canonicalize(path).map_err(|e| TaxsortError::Extraction {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        added.push(
            app.storage
                .add_file(project_id, &absolute.to_string_lossy())
                .await?,
        );
    }
    Ok(added)
}

pub async fn classify(app: &App, project_id: ProjectId) -> Result<PipelineOutcome, TaxsortError> {
    let provider = app.provider()?;
    app.with_memory(async |memory| {
        ClassificationPipeline::from_config(
            &app.config,
            Arc::clone(&app.storage),
            memory,
            Arc::clone(&app.catalog),
            provider,
        )
        .run(project_id)
        .await
    })
    .await
}

#[derive(Debug, Serialize)]
pub struct ResultsView {
    #[serde(flatten)]
    pub results: ProjectResultSet,
    pub summary: ClassificationSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
}

/// The project's snapshot, rebuilt from the persistent store when memory
/// has none.
pub async fn results(
    app: &App,
    project_id: ProjectId,
    report_dir: Option<&Path>,
) -> Result<ResultsView, TaxsortError> {
    let results = app
        .with_memory(async |memory| match memory.get_project_results(project_id).await {
            Some(results) => Ok(results),
            None => resync(app.storage.as_ref(), &memory, project_id).await,
        })
        .await?;

    let report_path = match report_dir {
        Some(dir) => Some(write_results_report(&results.classifications, dir).await?),
        None => None,
    };
    Ok(ResultsView {
        summary: summarize(&results.classifications),
        results,
        report_path,
    })
}

fn reclassifier(
    app: &App,
    memory: Arc<MemoryStore>,
) -> Result<ReclassificationEngine, TaxsortError> {
    Ok(ReclassificationEngine::new(
        Arc::clone(&app.storage),
        memory,
        Arc::clone(&app.catalog),
        app.provider()?,
        Arc::new(DocumentMergeCoordinator::from_config(&app.config.merge)),
        reclassification_settings(&app.config.llm),
    ))
}

pub async fn reclassify(
    app: &App,
    project_id: ProjectId,
    prompt: &str,
    regenerate_pdf: bool,
) -> Result<ReclassificationResult, TaxsortError> {
    app.with_memory(async |memory| {
        let engine = reclassifier(app, memory)?;
        Ok(engine
            .reclassify_with_prompt(project_id, prompt, regenerate_pdf)
            .await)
    })
    .await
}

/// Applies explicit updates. No model call is made, but the engine still
/// needs a provider, so credentials are checked as for `reclassify`.
pub async fn apply(
    app: &App,
    project_id: ProjectId,
    updates: &[(FileId, CategoryId)],
    reasoning: Option<&str>,
    regenerate_pdf: bool,
) -> Result<ReclassificationResult, TaxsortError> {
    let updates: Vec<ReclassificationUpdate> = updates
        .iter()
        .map(|(file_id, category)| {
            let update = ReclassificationUpdate::new(*file_id, *category);
            match reasoning {
                Some(reasoning) => update.with_reasoning(reasoning),
                None => update,
            }
        })
        .collect();
    app.with_memory(async |memory| {
        let engine = reclassifier(app, memory)?;
        Ok(engine.apply(project_id, &updates, regenerate_pdf).await)
    })
    .await
}

/// Rebuilds the merged document from the current classifications.
pub async fn merge(app: &App, project_id: ProjectId) -> Result<MergeResult, TaxsortError> {
    let project = require_project(app, project_id).await?;
    let inputs: Vec<MergeInput> = app
        .storage
        .list_files(project_id)
        .await?
        .iter()
        .filter(|f| f.category_id.is_some())
        .map(MergeInput::from)
        .collect();
    if inputs.is_empty() {
        warn!(project_id, "no classified files to merge");
    }

    let result = DocumentMergeCoordinator::from_config(&app.config.merge)
        .merge(project_id, Some(&project.name), inputs)
        .await;
    if let Some(path) = result.merged_pdf_path.as_deref().filter(|_| result.success) {
        app.storage.set_merged_pdf_path(project_id, path).await?;
        app.with_memory(async |memory| {
            resync(app.storage.as_ref(), &memory, project_id).await
        })
        .await?;
    }
    Ok(result)
}

pub async fn resync_project(
    app: &App,
    project_id: ProjectId,
) -> Result<ProjectResultSet, TaxsortError> {
    app.with_memory(async |memory| resync(app.storage.as_ref(), &memory, project_id).await)
        .await
}

#[derive(Debug, Serialize)]
pub struct Enqueued {
    pub job_id: i64,
    pub queue: String,
    pub kind: &'static str,
    pub project_id: ProjectId,
}

pub async fn enqueue(app: &App, job: &JobPayload) -> Result<Enqueued, TaxsortError> {
    let queue = app.config.worker.queue_name.clone();
    let job_id = app.storage.enqueue(&queue, &job.to_json()?).await?;
    info!(job_id, kind = job.kind(), project_id = job.project_id(), "enqueued job");
    Ok(Enqueued {
        job_id,
        queue,
        kind: job.kind(),
        project_id: job.project_id(),
    })
}

pub async fn worker(app: &App, drain: bool) -> Result<WorkerStats, TaxsortError> {
    let worker = Worker::new(
        app.config.clone(),
        Arc::clone(&app.storage),
        app.provider()?,
        app.embedder(),
        Arc::clone(&app.catalog),
    );
    if drain {
        worker.drain().await
    } else {
        worker.run(taxsort_agent::install_signal_handler()).await
    }
}

#[derive(Debug, Serialize)]
pub struct Validation {
    pub valid: bool,
    pub categories: usize,
    pub problems: Vec<String>,
}

pub fn validate(app: &App) -> Validation {
    match validate_workflow(&app.config) {
        Ok(catalog) => Validation {
            valid: true,
            categories: catalog.len(),
            problems: Vec::new(),
        },
        Err(problems) => Validation {
            valid: false,
            categories: app.catalog.len(),
            problems,
        },
    }
}

async fn require_project(app: &App, project_id: ProjectId) -> Result<Project, TaxsortError> {
    app.storage
        .get_project(project_id)
        .await?
        .ok_or_else(|| TaxsortError::not_found("project", project_id))
}

#[cfg(test)]
mod tests {
    use taxsort_core::types::CategoryAssignment;
    use taxsort_test_utils::TestHarness;

    use super::*;

    async fn app(harness: &TestHarness) -> App {
        App::open(harness.config.clone()).await.unwrap()
    }

    #[test]
    fn update_pairs_are_validated() {
        assert_eq!(parse_update("12=9"), Ok((12, CategoryId::new(9).unwrap())));
        assert_eq!(parse_update(" 3 = 20 "), Ok((3, CategoryId::new(20).unwrap())));
        assert!(parse_update("12").unwrap_err().contains("FILE_ID=CATEGORY_ID"));
        assert!(parse_update("12=21").unwrap_err().contains("between 1 and 20"));
        assert!(parse_update("x=2").unwrap_err().contains("invalid file id"));
    }

    #[tokio::test]
    async fn project_files_and_results_round_trip() {
        let harness = TestHarness::builder().build().await.unwrap();
        let app = app(&harness).await;
        let project = create_project(&app, "Schmidt 2024").await.unwrap();
        let upload = harness.write_upload("lohn.txt", b"Lohn").unwrap();

        let files = add_files(&app, project.id, &[upload]).await.unwrap();
        assert_eq!(files.len(), 1);
        app.storage
            .record_classification(
                files[0].id,
                &CategoryAssignment {
                    category_id: CategoryId::new(11).unwrap(),
                    category_german: "N".into(),
                    category_english: "Employment".into(),
                    confidence: Some(1.0),
                    reasoning: "manual".into(),
                },
            )
            .await
            .unwrap();

        let report_dir = harness.root().join("reports");
        let view = results(&app, project.id, Some(&report_dir)).await.unwrap();
        assert_eq!(view.results.total_documents, 1);
        assert_eq!(view.summary.categories_used, 1);
        assert!(view.report_path.unwrap().exists());
        assert_eq!(list_projects(&app).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn adding_files_to_unknown_project_fails() {
        let harness = TestHarness::builder().build().await.unwrap();
        let app = app(&harness).await;
        let err = add_files(&app, 99, &[]).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn merge_records_artifact_on_project() {
        let harness = TestHarness::builder().build().await.unwrap();
        harness.write_header_pages().unwrap();
        let app = app(&harness).await;
        let project = create_project(&app, "p").await.unwrap();
        let upload = harness.write_pdf_upload("a.pdf", &["Rente"]).unwrap();
        let files = add_files(&app, project.id, &[upload]).await.unwrap();
        app.storage
            .record_classification(
                files[0].id,
                &CategoryAssignment {
                    category_id: CategoryId::new(3).unwrap(),
                    category_german: "R".into(),
                    category_english: "Pensions".into(),
                    confidence: None,
                    reasoning: String::new(),
                },
            )
            .await
            .unwrap();

        let result = merge(&app, project.id).await.unwrap();
        assert!(result.success);
        assert_eq!(result.total_pages, 21);
        let stored = app.storage.get_project(project.id).await.unwrap().unwrap();
        assert_eq!(stored.merged_pdf_path, result.merged_pdf_path);
    }

    #[tokio::test]
    async fn enqueue_writes_tagged_payload() {
        let harness = TestHarness::builder().build().await.unwrap();
        let app = app(&harness).await;
        let enqueued = enqueue(&app, &JobPayload::Resync { project_id: 5 }).await.unwrap();
        assert_eq!(enqueued.kind, "resync");

        let entry = app
            .storage
            .dequeue(&app.config.worker.queue_name)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.id, enqueued.job_id);
        assert_eq!(
            JobPayload::from_json(&entry.payload).unwrap(),
            JobPayload::Resync { project_id: 5 }
        );
    }

    #[tokio::test]
    async fn missing_credentials_block_model_commands() {
        let harness = TestHarness::builder().build().await.unwrap();
        let mut config = harness.config.clone();
        config.llm.api_key = None;
        config.llm.endpoint = None;
        let app = App::open(config).await.unwrap();

        let err = classify(&app, 1).await.unwrap_err();
        assert!(matches!(err, TaxsortError::Config(_)));
        assert!(!validate(&app).valid);
    }
}
