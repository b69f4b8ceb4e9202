// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-document preprocessing: text extraction followed by one analysis
//! call that produces the summary, keywords, type and key entities the
//! classifier works from.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use taxsort_classify::summaries::entity_lists;
use taxsort_classify::{EngineSettings, ResponseParser, prompts};
use taxsort_core::types::{CompletionRequest, DocumentSummary, ProjectFile};
use taxsort_core::{CompletionAdapter, StorageAdapter, TaxsortError};

use crate::extract::ExtractorSet;

/// Summary stored for documents whose text could not be analysed.
const FALLBACK_SUMMARY_CHARS: usize = 500;

#[derive(Debug, Default, Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    keywords: Vec<Value>,
    #[serde(default)]
    document_type: Option<String>,
    #[serde(default)]
    key_entities: BTreeMap<String, Value>,
}

fn keyword_strings(raw: Vec<Value>) -> Vec<String> {
    raw.into_iter()
        .filter_map(|k| match k {
            Value::String(s) if !s.trim().is_empty() => Some(s),
            Value::String(_) | Value::Null => None,
            other => Some(other.to_string()),
        })
        .collect()
}

pub struct Preprocessor {
    extractors: ExtractorSet,
    provider: Arc<dyn CompletionAdapter>,
    parser: ResponseParser,
    settings: EngineSettings,
}

impl Preprocessor {
    pub fn new(provider: Arc<dyn CompletionAdapter>, settings: EngineSettings) -> Self {
        Self::with_extractors(ExtractorSet::default(), provider, settings)
    }

    pub fn with_extractors(
        extractors: ExtractorSet,
        provider: Arc<dyn CompletionAdapter>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            extractors,
            provider,
            parser: ResponseParser::default(),
            settings,
        }
    }

    /// Extracts and analyses one file, then stores the result on its row.
    ///
    /// Extraction failures are errors. A failed analysis call only degrades
    /// the summary to an excerpt of the extracted text.
    pub async fn preprocess(
        &self,
        storage: &dyn StorageAdapter,
        file: &ProjectFile,
    ) -> Result<DocumentSummary, TaxsortError> {
        let file_name = file.file_name();
        let extracted = self.extractors.extract(Path::new(&file.file_path)).await?;
        if !extracted.success {
            return Err(TaxsortError::Extraction {
                path: file.file_path.clone(),
                message: "extractor reported failure".into(),
            });
        }

        let mut summary = DocumentSummary {
            file_id: Some(file.id),
            file_name: file_name.clone(),
            file_path: Some(file.file_path.clone()),
            ..DocumentSummary::default()
        };

        if extracted.content.trim().is_empty() {
            warn!(file_id = file.id, file_name = %file_name, "no text content extracted");
            summary.document_type = "unknown".into();
        } else {
            match self.analyse(&file_name, &extracted.content).await {
                Ok(analysis) => {
                    summary.summary = analysis.summary.unwrap_or_default();
                    summary.keywords = keyword_strings(analysis.keywords);
                    summary.document_type = analysis.document_type.unwrap_or_default();
                    summary.key_entities = entity_lists(analysis.key_entities);
                }
                Err(e) => {
                    warn!(
                        file_id = file.id,
                        file_name = %file_name,
                        error = %e,
                        "document analysis failed, continuing with text excerpt"
                    );
                }
            }
            if summary.summary.trim().is_empty() {
                summary.summary = extracted
                    .content
                    .chars()
                    .take(FALLBACK_SUMMARY_CHARS)
                    .collect();
            }
        }

        storage.save_preprocessing(file.id, &summary).await?;
        info!(
            file_id = file.id,
            file_name = %file_name,
            document_type = %summary.document_type,
            "preprocessed document"
        );
        Ok(summary)
    }

    async fn analyse(&self, file_name: &str, content: &str) -> Result<RawAnalysis, TaxsortError> {
        let prompt = prompts::document_analysis_prompt(file_name, content);
        debug!(file_name, prompt_chars = prompt.len(), "sending analysis prompt");
        let request = CompletionRequest {
            prompt,
            system_prompt: Some(prompts::ANALYST_SYSTEM_PROMPT.to_string()),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };
        let response = tokio::time::timeout(self.settings.timeout, self.provider.complete(request))
            .await
            .map_err(|_elapsed| TaxsortError::Timeout {
                duration: self.settings.timeout,
            })??;
        self.parser.parse_as(&response.content)
    }
}
