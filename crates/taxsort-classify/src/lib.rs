// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Classification of tax documents into the twenty fixed categories.
//!
//! - [`CategoryCatalog`] loads and validates the category list.
//! - [`ResponseParser`] recovers JSON from model output.
//! - [`ClassificationEngine`] runs one completion call per batch and
//!   validates the reply into classification records.
//! - [`summaries`] and [`report`] read preprocessing output and write the
//!   JSON results report.

pub mod catalog;
pub mod engine;
pub mod parser;
pub mod prompts;
pub mod report;
pub mod summaries;
pub mod validate;

pub use catalog::{Category, CategoryCatalog};
pub use engine::{ClassificationContext, ClassificationEngine, EngineSettings};
pub use parser::{ParseStrategy, ResponseParser};
pub use report::{ClassificationSummary, summarize, write_results_report};
pub use summaries::load_document_summaries;
pub use validate::validate_workflow;
