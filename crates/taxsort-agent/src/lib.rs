// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingestion pipeline and background worker for Taxsort.
//!
//! The [`ClassificationPipeline`] takes a project from uploaded files to a
//! classified, merged and snapshotted state. The [`Worker`] drains the
//! persistent job queue, running pipelines and reclassifications with a
//! memory store scoped to its own lifetime.

pub mod extract;
pub mod jobs;
pub mod pipeline;
pub mod preprocess;
pub mod shutdown;
pub mod worker;

pub use extract::{ExtractorSet, LopdfExtractor, PlainTextExtractor};
pub use jobs::JobPayload;
pub use pipeline::{ClassificationPipeline, PipelineOutcome};
pub use preprocess::Preprocessor;
pub use shutdown::install_signal_handler;
pub use worker::{Worker, WorkerStats};
