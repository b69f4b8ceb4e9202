// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompt templates for classification, document analysis and
//! human-in-the-loop reclassification.

use serde::Serialize;
use serde_json::json;

use taxsort_core::types::{ClassificationRecord, DocumentSummary, FileId, ProjectId};

use crate::catalog::CategoryCatalog;

/// Placeholder used when memory has nothing to contribute.
pub const NO_MEMORY_CONTEXT: &str = "No previous context available.";

/// Number of document characters sent to the analysis call.
pub const ANALYSIS_CONTENT_CHARS: usize = 15_000;

/// Number of summary characters shown per file in a reclassification prompt.
pub const RECLASSIFY_SUMMARY_CHARS: usize = 200;

pub const CLASSIFIER_SYSTEM_PROMPT: &str = "You sort German tax documents into a fixed set of \
twenty categories for a tax advisor. You answer with JSON only.";

pub const ANALYST_SYSTEM_PROMPT: &str = "You analyse tax documents and extract a structured \
summary. You answer with JSON only.";

pub const RECLASSIFIER_SYSTEM_PROMPT: &str = "You help a tax advisor correct document \
classifications. You map their request onto concrete file and category changes and answer \
with JSON only.";

#[derive(Serialize)]
struct PromptDocument<'a> {
    id: usize,
    file_name: &'a str,
    summary: &'a str,
    keywords: &'a [String],
    document_type: &'a str,
    key_entities: &'a std::collections::BTreeMap<String, Vec<String>>,
}

fn pretty<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "[]".to_string())
}

/// Builds the batch classification prompt.
pub fn classification_prompt(
    catalog: &CategoryCatalog,
    documents: &[DocumentSummary],
    memory_context: &str,
) -> String {
    let docs: Vec<PromptDocument<'_>> = documents
        .iter()
        .enumerate()
        .map(|(i, d)| PromptDocument {
            id: i + 1,
            file_name: &d.file_name,
            summary: &d.summary,
            keywords: &d.keywords,
            document_type: &d.document_type,
            key_entities: &d.key_entities,
        })
        .collect();
    let memory_context = if memory_context.trim().is_empty() {
        NO_MEMORY_CONTEXT
    } else {
        memory_context
    };

    format!(
        "Assign every document below to exactly one of the categories.\n\n\
## CATEGORIES\n{categories}\n\n\
## DOCUMENTS TO CLASSIFY\n{documents}\n\n\
## PREVIOUS CLASSIFICATION CONTEXT\n{memory_context}\n\n\
## INSTRUCTIONS\n\
- Pick the single best category id (1-20) for each document.\n\
- Questionnaires go to 1, letters and notices from the tax office to 2, the main form to 3.\n\
- Wage tax certificates and payslips go to 11, bank tax certificates to 13.\n\
- Income or residence abroad goes to 15 or 16, travel and work-day calendars to 17.\n\
- Documents from an earlier tax year go to 18.\n\
- Use 19 for tax-relevant documents that fit nowhere else and 20 for irrelevant or unreadable ones.\n\
- Keep the file_name exactly as given.\n\n\
Respond with a JSON array only, one element per document:\n\
[{{\"id\": 1, \"file_name\": \"...\", \"category_id\": 11, \"category_name\": \"N / N-AUS / WA-ESt\", \
\"category_english\": \"Employment Income\", \"confidence\": 0.9, \"reasoning\": \"...\"}}]",
        categories = catalog.render_for_prompt(),
        documents = pretty(&docs),
    )
}

/// Builds the per-document analysis prompt. Content beyond
/// [`ANALYSIS_CONTENT_CHARS`] characters is cut off.
pub fn document_analysis_prompt(file_name: &str, content: &str) -> String {
    let truncated: String = content.chars().take(ANALYSIS_CONTENT_CHARS).collect();
    format!(
        "Analyse the document `{file_name}` and describe it for later classification.\n\n\
## DOCUMENT CONTENT\n{truncated}\n\n\
Respond with a JSON object only:\n\
{{\"structured_content\": \"...\", \"summary\": \"two or three sentences\", \
\"keywords\": [\"...\"], \"document_type\": \"...\", \"original_language\": \"de\", \
\"key_entities\": {{\"people\": [], \"organizations\": [], \"dates\": [], \"amounts\": []}}}}"
    )
}

/// Builds the reclassification prompt from the user's request and the
/// project's current state.
pub fn reclassification_prompt(
    catalog: &CategoryCatalog,
    project_id: ProjectId,
    user_request: &str,
    current: &[ClassificationRecord],
    summaries: &std::collections::HashMap<FileId, String>,
) -> String {
    let files: Vec<serde_json::Value> = current
        .iter()
        .map(|r| {
            let summary: String = r
                .file_id
                .and_then(|id| summaries.get(&id))
                .map(|s| s.chars().take(RECLASSIFY_SUMMARY_CHARS).collect())
                .unwrap_or_default();
            json!({
                "file_id": r.file_id,
                "file_name": r.file_name,
                "category_id": r.category_id,
                "category_name": r.category_name,
                "category_english": r.category_english,
                "summary": summary,
            })
        })
        .collect();
    let categories: Vec<serde_json::Value> = catalog
        .categories()
        .iter()
        .map(|c| json!({"id": c.id, "german": c.german_name, "english": c.english_name}))
        .collect();

    format!(
        "## PROJECT ID\n{project_id}\n\n\
## USER REQUEST\n{user_request}\n\n\
## CURRENT FILE CLASSIFICATIONS\n{files}\n\n\
## AVAILABLE CATEGORIES (1-20)\n{categories}\n\n\
Work out which files the request refers to and which category each should move to. \
Only use file ids listed above. If the request matches no file, return an empty list and \
explain why in agent_notes.\n\n\
Respond with a JSON object only:\n\
{{\"understood_request\": \"...\", \"reclassifications\": [{{\"file_id\": 1, \"file_name\": \"...\", \
\"old_category_id\": 19, \"new_category_id\": 9, \"new_category_name\": \"V\", \
\"new_category_english\": \"Rental Income\", \"reasoning\": \"...\"}}], \"agent_notes\": \"...\"}}",
        files = pretty(&files),
        categories = pretty(&categories),
    )
}
