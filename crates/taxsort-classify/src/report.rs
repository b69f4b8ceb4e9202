// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-category summaries and the JSON results report.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use taxsort_core::types::ClassificationRecord;
use taxsort_core::{CategoryId, TaxsortError};

/// Counts over a list of classification records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationSummary {
    pub total_documents: usize,
    pub categories_used: usize,
    pub by_category: BTreeMap<CategoryId, usize>,
}

pub fn summarize(records: &[ClassificationRecord]) -> ClassificationSummary {
    let mut by_category = BTreeMap::new();
    for record in records {
        *by_category.entry(record.category_id).or_default() += 1;
    }
    ClassificationSummary {
        total_documents: records.len(),
        categories_used: by_category.len(),
        by_category,
    }
}

#[derive(Debug, Serialize)]
struct ReportHeader {
    total_documents: usize,
    categories_used: usize,
    generated_at: String,
}

#[derive(Debug, Serialize)]
struct ReportDocument<'a> {
    id: u32,
    file_name: &'a str,
    confidence: f64,
    reasoning: &'a str,
}

#[derive(Debug, Serialize)]
struct ReportCategory<'a> {
    category_id: CategoryId,
    category_name: &'a str,
    category_english: &'a str,
    documents: Vec<ReportDocument<'a>>,
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    classification_summary: ReportHeader,
    results_by_category: Vec<ReportCategory<'a>>,
    results_ordered: &'a [ClassificationRecord],
}

fn build_report(records: &[ClassificationRecord]) -> Report<'_> {
    let mut groups: BTreeMap<CategoryId, ReportCategory<'_>> = BTreeMap::new();
    for record in records {
        groups
            .entry(record.category_id)
            .or_insert_with(|| ReportCategory {
                category_id: record.category_id,
                category_name: &record.category_name,
                category_english: &record.category_english,
                documents: Vec::new(),
            })
            .documents
            .push(ReportDocument {
                id: record.id,
                file_name: &record.file_name,
                confidence: record.confidence_or_default(),
                reasoning: &record.reasoning,
            });
    }
    let summary = summarize(records);
    Report {
        classification_summary: ReportHeader {
            total_documents: summary.total_documents,
            categories_used: summary.categories_used,
            generated_at: Utc::now().to_rfc3339(),
        },
        results_by_category: groups.into_values().collect(),
        results_ordered: records,
    }
}

/// Writes `classification_results_<YYYYmmdd_HHMMSS>.json` into `dir` and
/// returns its path.
pub async fn write_results_report(
    records: &[ClassificationRecord],
    dir: &Path,
) -> Result<PathBuf, TaxsortError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| TaxsortError::Storage { source: e.into() })?;
    let path = dir.join(format!(
        "classification_results_{}.json",
        Utc::now().format("%Y%m%d_%H%M%S")
    ));
    let body = serde_json::to_string_pretty(&build_report(records))
        .map_err(|e| TaxsortError::Internal(format!("report serialization failed: {e}")))?;
    tokio::fs::write(&path, body)
        .await
        .map_err(|e| TaxsortError::Storage { source: e.into() })?;
    info!(path = %path.display(), documents = records.len(), "wrote classification report");
    Ok(path)
}
