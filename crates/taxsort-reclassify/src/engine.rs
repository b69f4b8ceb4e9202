// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reclassification of already-classified project files.
//!
//! Two entry points converge on [`ReclassificationEngine::apply`]: explicit
//! updates, and natural-language instructions that the model turns into
//! updates first. Interpretation finishes before anything is written.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use taxsort_classify::engine::loose_i64;
use taxsort_classify::{CategoryCatalog, EngineSettings, ResponseParser, prompts};
use taxsort_config::model::LlmConfig;
use taxsort_core::types::{CategoryChange, CompletionRequest, ProjectFile};
use taxsort_core::{
    CategoryId, CompletionAdapter, FileId, ProjectId, StorageAdapter, TaxsortError,
};
use taxsort_memory::{MemoryStore, ProjectClassificationUpdate};
use taxsort_merge::{DocumentMergeCoordinator, LopdfPageSource, MergeInput, PageSource};

use crate::sync::{classified_records, resync};
use crate::types::{
    Interpretation, ReclassificationResult, ReclassificationUpdate, UpdateOutcome, download_url,
};

/// One entry of the model's `reclassifications` array before validation.
#[derive(Debug, Default, Deserialize)]
struct RawReclassification {
    #[serde(default)]
    file_id: Option<Value>,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    new_category_id: Option<Value>,
    #[serde(default)]
    new_category_name: Option<String>,
    #[serde(default)]
    new_category_english: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPlan {
    #[serde(default)]
    understood_request: Option<String>,
    #[serde(default)]
    reclassifications: Vec<Value>,
    #[serde(default)]
    agent_notes: Option<String>,
}

/// Settings for interpretation calls: the general token budget rather than
/// the larger classification one.
pub fn reclassification_settings(llm: &LlmConfig) -> EngineSettings {
    EngineSettings {
        max_tokens: llm.max_tokens,
        ..EngineSettings::from_config(llm)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn describe(category: Option<CategoryId>) -> String {
    category.map_or_else(|| "none".to_string(), |c| c.to_string())
}

pub struct ReclassificationEngine<S: PageSource = LopdfPageSource> {
    storage: Arc<dyn StorageAdapter>,
    memory: Arc<MemoryStore>,
    catalog: Arc<CategoryCatalog>,
    provider: Arc<dyn CompletionAdapter>,
    merger: Arc<DocumentMergeCoordinator<S>>,
    parser: ResponseParser,
    settings: EngineSettings,
}

impl<S: PageSource> ReclassificationEngine<S> {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        memory: Arc<MemoryStore>,
        catalog: Arc<CategoryCatalog>,
        provider: Arc<dyn CompletionAdapter>,
        merger: Arc<DocumentMergeCoordinator<S>>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            storage,
            memory,
            catalog,
            provider,
            merger,
            parser: ResponseParser::default(),
            settings,
        }
    }

    /// Rebuilds the project's memory snapshot from the persistent store.
    pub async fn resync(&self, project_id: ProjectId) -> Result<(), TaxsortError> {
        resync(self.storage.as_ref(), &self.memory, project_id).await?;
        Ok(())
    }

    /// Applies explicit updates, then resyncs memory and optionally rebuilds
    /// the merged document.
    pub async fn apply(
        &self,
        project_id: ProjectId,
        updates: &[ReclassificationUpdate],
        regenerate_pdf: bool,
    ) -> ReclassificationResult {
        match self.try_apply(project_id, updates, regenerate_pdf).await {
            Ok(result) => result,
            Err(e) => {
                warn!(project_id, error = %e, "reclassification failed");
                ReclassificationResult {
                    total_updates: updates.len(),
                    ..ReclassificationResult::failed(
                        project_id,
                        format!("Error during reclassification: {e}"),
                    )
                }
            }
        }
    }

    async fn try_apply(
        &self,
        project_id: ProjectId,
        updates: &[ReclassificationUpdate],
        regenerate_pdf: bool,
    ) -> Result<ReclassificationResult, TaxsortError> {
        let mut result = ReclassificationResult {
            total_updates: updates.len(),
            ..ReclassificationResult::failed(project_id, "")
        };

        let Some(project) = self.storage.get_project(project_id).await? else {
            result.message = format!("Project {project_id} not found");
            return Ok(result);
        };

        let has_snapshot = self.memory.get_project_results(project_id).await.is_some();
        if !has_snapshot {
            warn!(project_id, "no memory snapshot for project, using persistent store only");
        }

        for update in updates {
            let outcome = self.apply_one(project_id, update, has_snapshot).await;
            if outcome.success {
                result.successful_updates += 1;
            } else {
                result.failed_updates += 1;
            }
            result.results.push(outcome);
        }

        if result.successful_updates == 0 {
            result.message = "No updates were successful".into();
            return Ok(result);
        }

        // The file rows are committed at this point, so follow-up failures
        // are reported alongside the per-item outcomes.
        let mut notes = Vec::new();
        if regenerate_pdf
            && let Err(e) = self.regenerate(project_id, &project.name, &mut result).await
        {
            warn!(project_id, error = %e, "merged document regeneration failed");
            notes.push(format!("merged document not regenerated: {e}"));
        }
        if let Err(e) = self.resync(project_id).await {
            warn!(project_id, error = %e, "memory snapshot resync failed");
            notes.push(format!("memory snapshot not refreshed: {e}"));
        }

        result.success = true;
        result.message = format!(
            "Successfully updated {} of {} files",
            result.successful_updates, result.total_updates
        );
        if !notes.is_empty() {
            result.message = format!("{} ({})", result.message, notes.join("; "));
        }
        info!(
            project_id,
            updated = result.successful_updates,
            failed = result.failed_updates,
            "reclassification applied"
        );
        Ok(result)
    }

    /// The single per-file update path: persistent write with reasoning
    /// appended, then a mirror into the snapshot when one exists.
    async fn apply_one(
        &self,
        project_id: ProjectId,
        update: &ReclassificationUpdate,
        mirror: bool,
    ) -> UpdateOutcome {
        let mut outcome = UpdateOutcome {
            file_id: update.file_id,
            old_category_id: None,
            new_category_id: update.new_category_id,
            success: false,
            message: String::new(),
        };

        let category = self.catalog.get(update.new_category_id);
        let change = CategoryChange {
            category_id: update.new_category_id,
            category_german: non_empty(update.new_category_name.clone())
                .unwrap_or_else(|| category.german_name.clone()),
            category_english: non_empty(update.new_category_english.clone())
                .unwrap_or_else(|| category.english_name.clone()),
            reasoning: update.reasoning.clone().unwrap_or_default(),
        };

        let applied = match self
            .storage
            .apply_category_change(project_id, update.file_id, &change)
            .await
        {
            Ok(Some(applied)) => applied,
            Ok(None) => {
                warn!(project_id, file_id = update.file_id, "file not found in project");
                outcome.message = format!("File {} not found in project {project_id}", update.file_id);
                return outcome;
            }
            Err(e) => {
                warn!(project_id, file_id = update.file_id, error = %e, "file update failed");
                outcome.message = format!("Error: {e}");
                return outcome;
            }
        };

        if mirror {
            self.memory
                .update_project_classification(
                    project_id,
                    &ProjectClassificationUpdate {
                        file_id: update.file_id,
                        category_id: change.category_id,
                        category_name: change.category_german.clone(),
                        category_english: change.category_english.clone(),
                        reasoning: non_empty(Some(applied.reasoning_trail.clone())),
                    },
                )
                .await;
        }

        outcome.old_category_id = applied.old_category_id;
        outcome.success = true;
        outcome.message = format!(
            "Updated category from {} to {}",
            describe(applied.old_category_id),
            update.new_category_id
        );
        info!(
            project_id,
            file_id = update.file_id,
            old = %describe(applied.old_category_id),
            new = %update.new_category_id,
            "reclassified file"
        );
        outcome
    }

    async fn regenerate(
        &self,
        project_id: ProjectId,
        project_name: &str,
        result: &mut ReclassificationResult,
    ) -> Result<(), TaxsortError> {
        let inputs: Vec<MergeInput> = self
            .storage
            .list_files(project_id)
            .await?
            .iter()
            .filter(|f| f.category_id.is_some())
            .map(MergeInput::from)
            .collect();
        if inputs.is_empty() {
            warn!(project_id, "no classified files to merge");
            return Ok(());
        }

        let merged = self.merger.merge(project_id, Some(project_name), inputs).await;
        match merged.merged_pdf_path {
            Some(path) if merged.success => {
                self.storage.set_merged_pdf_path(project_id, &path).await?;
                result.merged_pdf_regenerated = true;
                result.merged_pdf_path = Some(path);
                result.download_url = Some(download_url(project_id));
            }
            _ => warn!(
                project_id,
                error = merged.error_message.as_deref().unwrap_or_default(),
                "merged document was not regenerated"
            ),
        }
        Ok(())
    }

    /// Asks the model which files the instruction refers to.
    ///
    /// Entries naming files outside the project, or categories outside
    /// 1..=20, are dropped. An empty list is a valid answer. An unknown
    /// project gives an unsuccessful interpretation; only storage and model
    /// failures are errors.
    pub async fn interpret(
        &self,
        project_id: ProjectId,
        user_prompt: &str,
    ) -> Result<Interpretation, TaxsortError> {
        if self.storage.get_project(project_id).await?.is_none() {
            return Ok(Interpretation {
                message: format!("Project {project_id} not found"),
                ..Interpretation::default()
            });
        }
        let files = self.storage.list_files(project_id).await?;
        self.interpret_files(project_id, user_prompt, &files).await
    }

    async fn interpret_files(
        &self,
        project_id: ProjectId,
        user_prompt: &str,
        files: &[ProjectFile],
    ) -> Result<Interpretation, TaxsortError> {
        let current = classified_records(files);
        let summaries: HashMap<FileId, String> = files
            .iter()
            .filter_map(|f| f.summary.clone().map(|s| (f.id, s)))
            .collect();

        let prompt = prompts::reclassification_prompt(
            &self.catalog,
            project_id,
            user_prompt,
            &current,
            &summaries,
        );
        debug!(project_id, prompt_chars = prompt.len(), "sending reclassification prompt");

        let request = CompletionRequest {
            prompt,
            system_prompt: Some(prompts::RECLASSIFIER_SYSTEM_PROMPT.to_string()),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };
        let response = tokio::time::timeout(self.settings.timeout, self.provider.complete(request))
            .await
            .map_err(|_elapsed| TaxsortError::Timeout {
                duration: self.settings.timeout,
            })??;

        let plan: RawPlan = self.parser.parse_as(&response.content)?;
        let known: HashMap<FileId, &str> = current
            .iter()
            .filter_map(|r| r.file_id.map(|id| (id, r.file_name.as_str())))
            .collect();

        let updates = plan
            .reclassifications
            .into_iter()
            .filter_map(|entry| self.validate_entry(entry, &known, user_prompt))
            .collect::<Vec<_>>();

        Ok(Interpretation {
            success: true,
            message: String::new(),
            understood_request: plan.understood_request.unwrap_or_default(),
            updates,
            agent_notes: plan.agent_notes.unwrap_or_default(),
        })
    }

    fn validate_entry(
        &self,
        entry: Value,
        known: &HashMap<FileId, &str>,
        user_prompt: &str,
    ) -> Option<ReclassificationUpdate> {
        let raw: RawReclassification = match serde_json::from_value(entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "skipping malformed reclassification entry");
                return None;
            }
        };

        let file_id = raw
            .file_id
            .as_ref()
            .and_then(loose_i64)
            .filter(|id| known.contains_key(id))
            .or_else(|| {
                let name = raw.file_name.as_deref()?;
                known
                    .iter()
                    .find(|(_, known_name)| known_name.eq_ignore_ascii_case(name))
                    .map(|(id, _)| *id)
            });
        let Some(file_id) = file_id else {
            warn!(
                file_id = ?raw.file_id,
                file_name = raw.file_name.as_deref().unwrap_or_default(),
                "model referenced a file outside the project"
            );
            return None;
        };

        let Some(category) = raw
            .new_category_id
            .as_ref()
            .and_then(loose_i64)
            .and_then(CategoryId::new)
        else {
            warn!(file_id, category_id = ?raw.new_category_id, "model proposed an invalid category");
            return None;
        };

        Some(ReclassificationUpdate {
            file_id,
            new_category_id: category,
            new_category_name: non_empty(raw.new_category_name),
            new_category_english: non_empty(raw.new_category_english),
            reasoning: non_empty(raw.reasoning).or_else(|| Some(user_prompt.to_string())),
        })
    }

    /// Interprets `user_prompt` and applies whatever it resolves to.
    ///
    /// A reply with no reclassifications succeeds without changes.
    pub async fn reclassify_with_prompt(
        &self,
        project_id: ProjectId,
        user_prompt: &str,
        regenerate_pdf: bool,
    ) -> ReclassificationResult {
        let mut result = ReclassificationResult {
            prompt: user_prompt.to_string(),
            ..ReclassificationResult::failed(project_id, "")
        };

        let files = match self.storage.get_project(project_id).await {
            Ok(Some(_)) => match self.storage.list_files(project_id).await {
                Ok(files) => files,
                Err(e) => {
                    result.message = format!("Error during reclassification: {e}");
                    return result;
                }
            },
            Ok(None) => {
                result.message = format!("Project {project_id} not found");
                return result;
            }
            Err(e) => {
                result.message = format!("Error during reclassification: {e}");
                return result;
            }
        };
        if !files.iter().any(|f| f.category_id.is_some()) {
            result.message = "No classified files found in project".into();
            return result;
        }

        let interpretation = match self.interpret_files(project_id, user_prompt, &files).await {
            Ok(interpretation) => interpretation,
            Err(e) => {
                warn!(project_id, error = %e, "could not interpret reclassification request");
                result.message = format!("Error during reclassification: {e}");
                return result;
            }
        };

        if interpretation.updates.is_empty() {
            info!(project_id, "no reclassifications determined");
            result.success = true;
            result.agent_reasoning = interpretation.understood_request;
            result.message = format!(
                "No reclassifications determined. {}",
                interpretation.agent_notes
            )
            .trim_end()
            .to_string();
            return result;
        }

        let mut applied = self
            .apply(project_id, &interpretation.updates, regenerate_pdf)
            .await;
        applied.prompt = user_prompt.to_string();
        applied.agent_reasoning = interpretation.understood_request;
        applied
    }
}
