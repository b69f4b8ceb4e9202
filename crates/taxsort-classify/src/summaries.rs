// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Loads document summaries from a preprocessing output directory.
//!
//! Each document has its own subfolder holding `<name>_llm_analysis.json`
//! and `<name>_metadata.json`. Folders are named
//! `<file name>_<date>_<time>`, which is where the file name comes from
//! when the metadata lacks one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use taxsort_core::TaxsortError;
use taxsort_core::types::{DocumentSummary, FileId};

const ANALYSIS_SUFFIX: &str = "_llm_analysis.json";
const METADATA_SUFFIX: &str = "_metadata.json";

#[derive(Debug, Default, Deserialize)]
struct Analysis {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    document_type: String,
    #[serde(default)]
    key_entities: BTreeMap<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
struct Metadata {
    #[serde(default)]
    file_id: Option<FileId>,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    file_path: Option<String>,
}

/// Entity lists with non-string members rendered as JSON text.
pub fn entity_lists(raw: BTreeMap<String, Value>) -> BTreeMap<String, Vec<String>> {
    raw.into_iter()
        .map(|(kind, value)| {
            let items = match value {
                Value::Array(items) => items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .collect(),
                Value::String(s) => vec![s],
                Value::Null => Vec::new(),
                other => vec![other.to_string()],
            };
            (kind, items)
        })
        .collect()
}

/// `invoice.pdf_20250101_120000` -> `invoice.pdf`.
fn file_name_from_folder(folder: &str) -> String {
    folder.rsplitn(3, '_').last().unwrap_or(folder).to_string()
}

async fn read_json<T: for<'de> Deserialize<'de> + Default>(path: Option<&Path>) -> T {
    let Some(path) = path else {
        return T::default();
    };
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "unreadable preprocessing file");
            T::default()
        }),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not read preprocessing file");
            T::default()
        }
    }
}

async fn find_with_suffix(dir: &Path, suffix: &str) -> Option<PathBuf> {
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    let mut found = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(suffix))
        {
            found.push(path);
        }
    }
    found.sort();
    found.into_iter().next()
}

/// Reads every document subfolder of `dir`, in name order.
///
/// Folders with neither a summary nor a file name are skipped.
pub async fn load_document_summaries(dir: &Path) -> Result<Vec<DocumentSummary>, TaxsortError> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| TaxsortError::Extraction {
        path: dir.display().to_string(),
        message: format!("cannot read preprocessing directory: {e}"),
    })?;

    let mut folders = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| TaxsortError::Storage { source: e.into() })?
    {
        if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
            folders.push(entry.path());
        }
    }
    folders.sort();

    let mut summaries = Vec::new();
    for folder in folders {
        let analysis: Analysis =
            read_json(find_with_suffix(&folder, ANALYSIS_SUFFIX).await.as_deref()).await;
        let metadata: Metadata =
            read_json(find_with_suffix(&folder, METADATA_SUFFIX).await.as_deref()).await;

        let folder_name = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_name = metadata
            .file_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| file_name_from_folder(&folder_name));

        if analysis.summary.is_empty() && file_name.is_empty() {
            debug!(folder = %folder.display(), "skipping empty preprocessing folder");
            continue;
        }
        summaries.push(DocumentSummary {
            file_id: metadata.file_id,
            file_name,
            file_path: metadata.file_path,
            summary: analysis.summary,
            keywords: analysis.keywords,
            document_type: analysis.document_type,
            key_entities: entity_lists(analysis.key_entities),
        });
    }

    info!(dir = %dir.display(), count = summaries.len(), "loaded document summaries");
    Ok(summaries)
}
