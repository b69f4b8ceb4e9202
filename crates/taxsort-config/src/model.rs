// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Taxsort pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level Taxsort configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TaxsortConfig {
    /// Agent identity and logging settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Azure OpenAI completion and embedding settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Persistent store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Semantic memory settings.
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Category catalog location.
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Merged PDF artifact settings.
    #[serde(default)]
    pub merge: MergeConfig,

    /// Background job worker settings.
    #[serde(default)]
    pub worker: WorkerConfig,
}

/// Agent identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name used in logs.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "taxsort".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Azure OpenAI configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// API key. Falls back to the `AZURE_OPENAI_API_KEY` env var when unset.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Resource endpoint, e.g. `https://my-resource.openai.azure.com`.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// REST API version query parameter.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Chat-completion deployment name.
    #[serde(default)]
    pub deployment: Option<String>,

    /// Embedding deployment name. Semantic memory is disabled without it.
    #[serde(default)]
    pub embedding_deployment: Option<String>,

    /// Token budget for reclassification and preprocessing calls.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Token budget for the batch classification call.
    #[serde(default = "default_classification_max_tokens")]
    pub classification_max_tokens: u32,

    /// Sampling temperature for all calls.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Wall-clock timeout for a single completion call, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: None,
            api_version: default_api_version(),
            deployment: None,
            embedding_deployment: None,
            max_tokens: default_max_tokens(),
            classification_max_tokens: default_classification_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_version() -> String {
    "2024-10-21".to_string()
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_classification_max_tokens() -> u32 {
    4000
}

fn default_temperature() -> f32 {
    0.3
}

fn default_timeout_secs() -> u64 {
    120
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("taxsort"))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_database_path() -> String {
    data_dir().join("taxsort.db").to_string_lossy().into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Semantic memory configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Enable the vector backend. When false (or when no embedding deployment
    /// is configured) the in-process store is used.
    #[serde(default = "default_memory_enabled")]
    pub enabled: bool,

    /// Path to the SQLite file holding memory vectors.
    #[serde(default = "default_memory_path")]
    pub database_path: String,

    /// Default number of results for memory searches.
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    /// Number of past classifications rendered into the classifier prompt.
    #[serde(default = "default_context_limit")]
    pub context_limit: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: default_memory_enabled(),
            database_path: default_memory_path(),
            search_limit: default_search_limit(),
            context_limit: default_context_limit(),
        }
    }
}

fn default_memory_enabled() -> bool {
    true
}

fn default_memory_path() -> String {
    data_dir().join("memory.db").to_string_lossy().into_owned()
}

fn default_search_limit() -> usize {
    5
}

fn default_context_limit() -> usize {
    10
}

/// Category catalog configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogConfig {
    /// Path to a `categories.json` file. The built-in catalog is used when unset.
    #[serde(default)]
    pub path: Option<String>,
}

/// Merged PDF artifact configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MergeConfig {
    /// Directory holding `page_001.pdf` .. `page_020.pdf` category header pages.
    #[serde(default = "default_header_pages_dir")]
    pub header_pages_dir: String,

    /// Root directory for merged artifacts (one subdirectory per project).
    #[serde(default = "default_merge_output_dir")]
    pub output_dir: String,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            header_pages_dir: default_header_pages_dir(),
            output_dir: default_merge_output_dir(),
        }
    }
}

fn default_header_pages_dir() -> String {
    data_dir().join("category_pages").to_string_lossy().into_owned()
}

fn default_merge_output_dir() -> String {
    data_dir().join("merged_pdfs").to_string_lossy().into_owned()
}

/// Job worker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Queue polled by the worker.
    #[serde(default = "default_queue_name")]
    pub queue_name: String,

    /// Sleep between polls of an empty queue, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_name: default_queue_name(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_queue_name() -> String {
    "classification".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl LlmConfig {
    /// Resolves the API key: config value first, then `AZURE_OPENAI_API_KEY`.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("AZURE_OPENAI_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }

    /// Lists the credentials that are still missing for completion calls.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.resolved_api_key().is_none() {
            missing.push("llm.api_key");
        }
        if self.endpoint.as_deref().is_none_or(|e| e.trim().is_empty()) {
            missing.push("llm.endpoint");
        }
        if self.deployment.as_deref().is_none_or(|d| d.trim().is_empty()) {
            missing.push("llm.deployment");
        }
        missing
    }
}
