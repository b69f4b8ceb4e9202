// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue worker.
//!
//! The worker owns one [`MemoryStore`] for its whole lifetime. The store is
//! opened when the loop starts and closed after it ends, whether the loop
//! stopped on cancellation, an empty queue or a storage error.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use taxsort_classify::CategoryCatalog;
use taxsort_config::model::TaxsortConfig;
use taxsort_core::types::QueueEntry;
use taxsort_core::{CompletionAdapter, EmbeddingAdapter, StorageAdapter, TaxsortError};
use taxsort_memory::MemoryStore;
use taxsort_merge::DocumentMergeCoordinator;
use taxsort_reclassify::{ReclassificationEngine, ReclassificationResult, reclassification_settings};

use crate::jobs::JobPayload;
use crate::pipeline::ClassificationPipeline;

/// Counts of jobs handled by one worker run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub completed: usize,
    pub failed: usize,
}

pub struct Worker {
    config: TaxsortConfig,
    storage: Arc<dyn StorageAdapter>,
    provider: Arc<dyn CompletionAdapter>,
    embedder: Option<Arc<dyn EmbeddingAdapter>>,
    catalog: Arc<CategoryCatalog>,
}

impl Worker {
    pub fn new(
        config: TaxsortConfig,
        storage: Arc<dyn StorageAdapter>,
        provider: Arc<dyn CompletionAdapter>,
        embedder: Option<Arc<dyn EmbeddingAdapter>>,
        catalog: Arc<CategoryCatalog>,
    ) -> Self {
        Self {
            config,
            storage,
            provider,
            embedder,
            catalog,
        }
    }

    /// Polls the queue until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) -> Result<WorkerStats, TaxsortError> {
        self.scoped(&cancel, false).await
    }

    /// Processes jobs until the queue is empty.
    pub async fn drain(&self) -> Result<WorkerStats, TaxsortError> {
        self.scoped(&CancellationToken::new(), true).await
    }

    async fn scoped(
        &self,
        cancel: &CancellationToken,
        until_idle: bool,
    ) -> Result<WorkerStats, TaxsortError> {
        let memory = Arc::new(MemoryStore::open(&self.config.memory, self.embedder.clone()).await);
        info!(
            queue = %self.config.worker.queue_name,
            backend = memory.backend_kind(),
            "worker started"
        );

        let result = self.poll(&memory, cancel, until_idle).await;

        if let Err(e) = memory.close().await {
            warn!(error = %e, "failed to close worker memory");
        }
        info!("worker memory closed");
        result
    }

    async fn poll(
        &self,
        memory: &Arc<MemoryStore>,
        cancel: &CancellationToken,
        until_idle: bool,
    ) -> Result<WorkerStats, TaxsortError> {
        let services = JobServices::new(self, memory);
        let queue = self.config.worker.queue_name.as_str();
        let interval = Duration::from_millis(self.config.worker.poll_interval_ms);
        let mut stats = WorkerStats::default();

        while !cancel.is_cancelled() {
            let Some(entry) = self.storage.dequeue(queue).await? else {
                if until_idle {
                    break;
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => continue,
                }
            };

            match services.execute(&entry).await {
                Ok(()) => {
                    self.storage.ack(entry.id).await?;
                    stats.completed += 1;
                }
                Err(e) => {
                    warn!(job_id = entry.id, attempts = entry.attempts + 1, error = %e, "job failed");
                    self.storage.fail(entry.id).await?;
                    stats.failed += 1;
                }
            }
        }

        info!(completed = stats.completed, failed = stats.failed, "worker stopped");
        Ok(stats)
    }
}

/// Engines bound to the worker's memory store.
struct JobServices {
    pipeline: ClassificationPipeline,
    reclassifier: ReclassificationEngine,
}

impl JobServices {
    fn new(worker: &Worker, memory: &Arc<MemoryStore>) -> Self {
        let pipeline = ClassificationPipeline::from_config(
            &worker.config,
            Arc::clone(&worker.storage),
            Arc::clone(memory),
            Arc::clone(&worker.catalog),
            Arc::clone(&worker.provider),
        );
        let reclassifier = ReclassificationEngine::new(
            Arc::clone(&worker.storage),
            Arc::clone(memory),
            Arc::clone(&worker.catalog),
            Arc::clone(&worker.provider),
            Arc::new(DocumentMergeCoordinator::from_config(&worker.config.merge)),
            reclassification_settings(&worker.config.llm),
        );
        Self {
            pipeline,
            reclassifier,
        }
    }

    /// Runs one job. Reclassification results with per-item failures still
    /// count as handled; only errors mark the job failed.
    async fn execute(&self, entry: &QueueEntry) -> Result<(), TaxsortError> {
        let job = JobPayload::from_json(&entry.payload)?;
        debug!(job_id = entry.id, kind = job.kind(), project_id = job.project_id(), "running job");

        match job {
            JobPayload::Classify { project_id } => {
                self.pipeline.run(project_id).await?;
            }
            JobPayload::Reclassify {
                project_id,
                prompt,
                regenerate_pdf,
            } => {
                let result = self
                    .reclassifier
                    .reclassify_with_prompt(project_id, &prompt, regenerate_pdf)
                    .await;
                report(entry.id, &result);
            }
            JobPayload::Apply {
                project_id,
                updates,
                regenerate_pdf,
            } => {
                let result = self
                    .reclassifier
                    .apply(project_id, &updates, regenerate_pdf)
                    .await;
                report(entry.id, &result);
            }
            JobPayload::Resync { project_id } => {
                self.reclassifier.resync(project_id).await?;
            }
        }
        Ok(())
    }
}

fn report(job_id: i64, result: &ReclassificationResult) {
    if result.success {
        info!(
            job_id,
            project_id = result.project_id,
            updated = result.successful_updates,
            "reclassification job done"
        );
    } else {
        warn!(
            job_id,
            project_id = result.project_id,
            message = %result.message,
            "reclassification job reported failure"
        );
    }
}
