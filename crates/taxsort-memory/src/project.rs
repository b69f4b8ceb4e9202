// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Project-scoped snapshots.
//!
//! A snapshot is a `project_results` entry whose metadata is the serialized
//! [`ProjectResultSet`]. Lookups are exact on `project_id`, never ranked.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{info, warn};

use taxsort_core::types::{
    ClassificationRecord, FileId, ProjectDocument, ProjectId, ProjectResultSet,
};

use crate::store::MemoryStore;
use crate::types::{
    BulkUpdateOutcome, FailedUpdate, MemoryType, Metadata, ProjectClassificationUpdate,
    now_timestamp,
};

/// Summary line stored as the snapshot's searchable content.
fn snapshot_content(result_set: &ProjectResultSet) -> String {
    let mut lines = vec![format!(
        "Project {} classification results:",
        result_set.project_id
    )];
    lines.extend(result_set.classifications.iter().map(|c| {
        format!(
            "- {}: Category {} ({})",
            c.file_name, c.category_id, c.category_name
        )
    }));
    lines.join("\n")
}

fn apply_update(record: &mut ClassificationRecord, update: &ProjectClassificationUpdate, at: &str) {
    record.category_id = update.category_id;
    if !update.category_name.is_empty() {
        record.category_name = update.category_name.clone();
    }
    if !update.category_english.is_empty() {
        record.category_english = update.category_english.clone();
    }
    if let Some(reasoning) = update.reasoning.as_deref().filter(|r| !r.is_empty()) {
        record.reasoning = reasoning.to_string();
    }
    record.reclassified = true;
    record.reclassified_at = Some(at.to_string());
}

impl MemoryStore {
    /// Replaces the project's snapshot with a new one built from the given
    /// records. Returns the id of the new entry.
    pub async fn save_project_results(
        &self,
        project_id: ProjectId,
        classifications: Vec<ClassificationRecord>,
        documents: Vec<ProjectDocument>,
        merged_pdf_path: Option<String>,
    ) -> String {
        let result_set = ProjectResultSet {
            project_id,
            total_documents: classifications.len(),
            classifications,
            documents,
            merged_pdf_path,
            updated_at: now_timestamp(),
        };
        self.save_result_set(&result_set).await
    }

    /// Stores `result_set` as the project's only snapshot.
    pub async fn save_result_set(&self, result_set: &ProjectResultSet) -> String {
        self.delete_for_project(MemoryType::ProjectResults, result_set.project_id)
            .await;

        let metadata = match serde_json::to_value(result_set) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                warn!(
                    project_id = result_set.project_id,
                    "project snapshot did not serialize to an object"
                );
                Metadata::new()
            }
        };
        let mut metadata = metadata;
        metadata.insert("timestamp".into(), Value::from(result_set.updated_at.clone()));

        let id = self
            .add(&snapshot_content(result_set), metadata, MemoryType::ProjectResults)
            .await;
        info!(
            project_id = result_set.project_id,
            total = result_set.total_documents,
            "saved project results"
        );
        id
    }

    /// The project's current snapshot, or `None` when there is none.
    pub async fn get_project_results(&self, project_id: ProjectId) -> Option<ProjectResultSet> {
        let entry = self
            .latest_for_project(MemoryType::ProjectResults, project_id)
            .await?;
        match serde_json::from_value::<ProjectResultSet>(Value::Object(entry.metadata)) {
            Ok(result_set) => Some(result_set),
            Err(e) => {
                warn!(project_id, error = %e, "stored project snapshot is unreadable");
                None
            }
        }
    }

    /// The snapshot record for one file.
    pub async fn project_classification_for_file(
        &self,
        project_id: ProjectId,
        file_id: FileId,
    ) -> Option<ClassificationRecord> {
        self.get_project_results(project_id)
            .await?
            .record_for_file(file_id)
            .cloned()
    }

    /// Changes one file's category inside the project's snapshot.
    ///
    /// Returns false when the project has no snapshot or the file is not in
    /// it. Both are ordinary outcomes.
    pub async fn update_project_classification(
        &self,
        project_id: ProjectId,
        update: &ProjectClassificationUpdate,
    ) -> bool {
        let Some(mut result_set) = self.get_project_results(project_id).await else {
            warn!(project_id, "no project results found");
            return false;
        };
        let now = now_timestamp();
        let Some(record) = result_set
            .classifications
            .iter_mut()
            .find(|r| r.file_id == Some(update.file_id))
        else {
            warn!(project_id, file_id = update.file_id, "file not found in project classifications");
            return false;
        };
        apply_update(record, update, &now);
        result_set.updated_at = now;
        self.save_result_set(&result_set).await;
        info!(
            project_id,
            file_id = update.file_id,
            category_id = %update.category_id,
            "updated project classification"
        );
        true
    }

    /// Applies several updates against one snapshot read and one write.
    ///
    /// Each update is matched through a file-id index built once. Unmatched
    /// ids are reported in `failed_updates`; the rest still apply.
    pub async fn update_project_classifications_bulk(
        &self,
        project_id: ProjectId,
        updates: &[ProjectClassificationUpdate],
    ) -> BulkUpdateOutcome {
        let Some(mut result_set) = self.get_project_results(project_id).await else {
            return BulkUpdateOutcome {
                success: false,
                updated_count: 0,
                failed_updates: updates
                    .iter()
                    .map(|u| FailedUpdate {
                        file_id: u.file_id,
                        error: format!("No project results found for project {project_id}"),
                    })
                    .collect(),
            };
        };

        let index: HashMap<FileId, usize> = result_set
            .classifications
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.file_id.map(|id| (id, i)))
            .collect();

        let now = now_timestamp();
        let mut updated_count = 0;
        let mut failed_updates = Vec::new();
        for update in updates {
            match index.get(&update.file_id) {
                Some(&i) => {
                    apply_update(&mut result_set.classifications[i], update, &now);
                    updated_count += 1;
                }
                None => failed_updates.push(FailedUpdate {
                    file_id: update.file_id,
                    error: "File not found in project".into(),
                }),
            }
        }

        result_set.updated_at = now;
        self.save_result_set(&result_set).await;
        info!(project_id, updated_count, failed = failed_updates.len(), "bulk updated project classifications");

        BulkUpdateOutcome {
            success: true,
            updated_count,
            failed_updates,
        }
    }
}
