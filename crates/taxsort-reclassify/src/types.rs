// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request and result shapes for reclassification.

use serde::{Deserialize, Serialize};

use taxsort_core::{CategoryId, FileId, ProjectId};

/// One explicit category change for a file.
///
/// Names are resolved from the catalog when not supplied. The category id is
/// validated on deserialization, so an update always targets 1..=20.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReclassificationUpdate {
    pub file_id: FileId,
    pub new_category_id: CategoryId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_category_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_category_english: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl ReclassificationUpdate {
    pub fn new(file_id: FileId, new_category_id: CategoryId) -> Self {
        Self {
            file_id,
            new_category_id,
            new_category_name: None,
            new_category_english: None,
            reasoning: None,
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }
}

/// Outcome for a single update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateOutcome {
    pub file_id: FileId,
    pub old_category_id: Option<CategoryId>,
    pub new_category_id: CategoryId,
    pub success: bool,
    pub message: String,
}

/// Outcome of a reclassification call. Per-item failures live in `results`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReclassificationResult {
    pub project_id: ProjectId,
    pub success: bool,
    pub message: String,
    pub prompt: String,
    pub agent_reasoning: String,
    pub total_updates: usize,
    pub successful_updates: usize,
    pub failed_updates: usize,
    pub results: Vec<UpdateOutcome>,
    pub merged_pdf_regenerated: bool,
    pub merged_pdf_path: Option<String>,
    pub download_url: Option<String>,
}

impl ReclassificationResult {
    pub(crate) fn failed(project_id: ProjectId, message: impl Into<String>) -> Self {
        Self {
            project_id,
            message: message.into(),
            ..Self::default()
        }
    }
}

/// What the model made of a natural-language instruction.
///
/// `success` is false only when there was nothing to interpret against,
/// such as an unknown project; `message` then says why.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Interpretation {
    pub success: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
    pub understood_request: String,
    pub updates: Vec<ReclassificationUpdate>,
    pub agent_notes: String,
}

/// Download route for a project's merged artifact.
pub fn download_url(project_id: ProjectId) -> String {
    format!("/api/projects/{project_id}/merged-pdf/download")
}
