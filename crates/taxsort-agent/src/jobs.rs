// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job payloads carried through the persistent queue.

use serde::{Deserialize, Serialize};

use taxsort_core::{ProjectId, TaxsortError};
use taxsort_reclassify::ReclassificationUpdate;

fn default_true() -> bool {
    true
}

/// A queued unit of work, stored as internally tagged JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    /// Run the ingestion pipeline for a project.
    Classify { project_id: ProjectId },
    /// Interpret and apply a natural-language instruction.
    Reclassify {
        project_id: ProjectId,
        prompt: String,
        #[serde(default = "default_true")]
        regenerate_pdf: bool,
    },
    /// Apply explicit updates.
    Apply {
        project_id: ProjectId,
        updates: Vec<ReclassificationUpdate>,
        #[serde(default = "default_true")]
        regenerate_pdf: bool,
    },
    /// Rebuild the memory snapshot from the persistent store.
    Resync { project_id: ProjectId },
}

impl JobPayload {
    pub fn project_id(&self) -> ProjectId {
        match self {
            Self::Classify { project_id }
            | Self::Reclassify { project_id, .. }
            | Self::Apply { project_id, .. }
            | Self::Resync { project_id } => *project_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Classify { .. } => "classify",
            Self::Reclassify { .. } => "reclassify",
            Self::Apply { .. } => "apply",
            Self::Resync { .. } => "resync",
        }
    }

    /// Parses a stored payload. Unknown kinds and bad category ids are
    /// rejected here rather than inside the worker.
    pub fn from_json(raw: &str) -> Result<Self, TaxsortError> {
        serde_json::from_str(raw)
            .map_err(|e| TaxsortError::parse(format!("invalid job payload: {e}"), raw))
    }

    pub fn to_json(&self) -> Result<String, TaxsortError> {
        serde_json::to_string(self)
            .map_err(|e| TaxsortError::Internal(format!("job payload serialization: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use taxsort_core::CategoryId;

    use super::*;

    #[test]
    fn payload_is_tagged_by_kind() {
        let job = JobPayload::Classify { project_id: 3 };
        assert_eq!(job.to_json().unwrap(), r#"{"kind":"classify","project_id":3}"#);
    }

    #[test]
    fn regenerate_defaults_to_true() {
        let job = JobPayload::from_json(
            r#"{"kind": "apply", "project_id": 4, "updates": [{"file_id": 9, "new_category_id": 2}]}"#,
        )
        .unwrap();
        assert_eq!(
            job,
            JobPayload::Apply {
                project_id: 4,
                updates: vec![ReclassificationUpdate::new(9, CategoryId::new(2).unwrap())],
                regenerate_pdf: true,
            }
        );
        assert_eq!(job.kind(), "apply");
        assert_eq!(job.project_id(), 4);
    }

    #[test]
    fn invalid_payloads_are_parse_errors() {
        for raw in [
            r#"{"kind": "delete", "project_id": 1}"#,
            r#"{"kind": "apply", "project_id": 1, "updates": [{"file_id": 1, "new_category_id": 0}]}"#,
            "not json",
        ] {
            let err = JobPayload::from_json(raw).unwrap_err();
            assert!(matches!(err, TaxsortError::Parse { .. }), "{raw}");
        }
    }
}
