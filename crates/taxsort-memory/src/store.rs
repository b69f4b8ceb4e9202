// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The memory store: an optional semantic backend in front of an
//! always-available in-process fallback.
//!
//! Every write goes to the semantic backend first. When that fails the entry
//! lands in the fallback and the failure is only logged, so callers never
//! see a backend outage. Reads consult both and prefer the newest entry.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use taxsort_config::model::MemoryConfig;
use taxsort_core::{
    AdapterType, EmbeddingAdapter, HealthStatus, PluginAdapter, ProjectId, TaxsortError,
};
use taxsort_storage::Database;

use crate::backend::MemoryBackend;
use crate::local::LocalBackend;
use crate::types::{MemoryEntry, MemoryStats, MemoryType, Metadata, now_timestamp};
use crate::vector::VectorBackend;

pub struct MemoryStore {
    remote: Option<Arc<dyn MemoryBackend>>,
    local: LocalBackend,
    closed: AtomicBool,
    context_limit: usize,
}

impl MemoryStore {
    /// Opens the store described by `config`.
    ///
    /// The semantic backend is used only when memory is enabled and an
    /// embedder is available. Any failure while opening it degrades to the
    /// in-process store.
    pub async fn open(config: &MemoryConfig, embedder: Option<Arc<dyn EmbeddingAdapter>>) -> Self {
        let remote: Option<Arc<dyn MemoryBackend>> = match (config.enabled, embedder) {
            (true, Some(embedder)) => match Database::open(&config.database_path).await {
                Ok(db) => {
                    info!(path = %config.database_path, "semantic memory backend opened");
                    Some(Arc::new(VectorBackend::new(db, embedder)))
                }
                Err(e) => {
                    warn!(error = %e, "semantic memory unavailable, using in-process store");
                    None
                }
            },
            (true, None) => {
                info!("no embedding deployment configured, using in-process memory store");
                None
            }
            (false, _) => {
                debug!("semantic memory disabled, using in-process memory store");
                None
            }
        };
        let mut store = Self::with_remote(remote);
        store.context_limit = config.context_limit;
        store
    }

    /// A store backed only by the in-process fallback.
    pub fn local() -> Self {
        Self::with_remote(None)
    }

    /// A store in front of an explicit semantic backend.
    pub fn with_backend(backend: Arc<dyn MemoryBackend>) -> Self {
        Self::with_remote(Some(backend))
    }

    fn with_remote(remote: Option<Arc<dyn MemoryBackend>>) -> Self {
        Self {
            remote,
            local: LocalBackend::new(),
            closed: AtomicBool::new(false),
            context_limit: MemoryConfig::default().context_limit,
        }
    }

    /// Name of the backend taking writes: `vector`, another remote kind, or `local`.
    pub fn backend_kind(&self) -> &'static str {
        match &self.remote {
            Some(remote) if !self.is_closed() => remote.kind(),
            _ => self.local.kind(),
        }
    }

    /// Number of past classifications to render into prompts.
    pub fn context_limit(&self) -> usize {
        self.context_limit
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn active_remote(&self) -> Option<&Arc<dyn MemoryBackend>> {
        self.remote.as_ref().filter(|_| !self.is_closed())
    }

    /// Stores an entry and returns its id. Never fails: the in-process store
    /// takes the entry when the semantic backend errors.
    pub async fn add(&self, content: &str, metadata: Metadata, memory_type: MemoryType) -> String {
        let mut metadata = metadata;
        metadata.insert("type".into(), Value::from(memory_type.as_str()));
        metadata
            .entry("timestamp")
            .or_insert_with(|| Value::from(now_timestamp()));

        if let Some(remote) = self.active_remote() {
            match remote.insert(content, metadata.clone(), memory_type).await {
                Ok(entry) => {
                    debug!(id = %entry.id, memory_type = memory_type.as_str(), "added memory");
                    return entry.id;
                }
                Err(e) => warn!(error = %e, "memory backend write failed, using in-process store"),
            }
        }

        let entry = self.local.push(content, metadata, memory_type).await;
        debug!(id = %entry.id, memory_type = memory_type.as_str(), "added memory to in-process store");
        entry.id
    }

    /// Semantic search when the backend is reachable, substring match
    /// otherwise. Entries held by the fallback are appended after remote hits.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        memory_type: Option<MemoryType>,
    ) -> Vec<MemoryEntry> {
        let mut results = Vec::new();
        if let Some(remote) = self.active_remote() {
            match remote.search(query, limit, memory_type).await {
                Ok(hits) => results = hits,
                Err(e) => warn!(error = %e, "memory search failed, using in-process store"),
            }
        }
        if results.len() < limit {
            let local = self
                .local
                .search(query, limit - results.len(), memory_type)
                .await
                .unwrap_or_default();
            results.extend(local);
        }
        if let Some(t) = memory_type {
            results.retain(|e| e.memory_type == t);
        }
        results
    }

    /// Entries newest first across both backends.
    pub async fn recent(&self, memory_type: Option<MemoryType>, limit: usize) -> Vec<MemoryEntry> {
        let mut entries = Vec::new();
        if let Some(remote) = self.active_remote() {
            match remote.list(memory_type, limit).await {
                Ok(list) => entries = list,
                Err(e) => warn!(error = %e, "memory list failed, using in-process store"),
            }
        }
        entries.extend(self.local.list(memory_type, limit).await.unwrap_or_default());
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit);
        entries
    }

    pub async fn get(&self, id: &str) -> Option<MemoryEntry> {
        if let Some(remote) = self.active_remote() {
            match remote.get(id).await {
                Ok(Some(entry)) => return Some(entry),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "memory get failed"),
            }
        }
        self.local.get(id).await.ok().flatten()
    }

    /// Replaces an entry's content and merges its metadata. Returns false if
    /// neither backend holds the id.
    pub async fn update(&self, id: &str, content: &str, metadata: Metadata) -> bool {
        if let Some(remote) = self.active_remote() {
            match remote.update(id, content, metadata.clone()).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => warn!(error = %e, id, "memory update failed"),
            }
        }
        self.local
            .update(id, content, metadata)
            .await
            .unwrap_or(false)
    }

    pub async fn delete(&self, id: &str) -> bool {
        let mut deleted = false;
        if let Some(remote) = self.active_remote() {
            match remote.delete(id).await {
                Ok(d) => deleted = d,
                Err(e) => warn!(error = %e, id, "memory delete failed"),
            }
        }
        self.local.delete(id).await.unwrap_or(false) || deleted
    }

    /// Newest entry of a type scoped to a project, from whichever backend has it.
    pub(crate) async fn latest_for_project(
        &self,
        memory_type: MemoryType,
        project_id: ProjectId,
    ) -> Option<MemoryEntry> {
        let mut remote_hit = None;
        if let Some(remote) = self.active_remote() {
            match remote.latest_for_project(memory_type, project_id).await {
                Ok(hit) => remote_hit = hit,
                Err(e) => warn!(error = %e, project_id, "memory project lookup failed"),
            }
        }
        let local_hit = self
            .local
            .latest_for_project(memory_type, project_id)
            .await
            .ok()
            .flatten();
        newest(remote_hit, local_hit)
    }

    pub(crate) async fn latest_for_file_name(
        &self,
        memory_type: MemoryType,
        file_name: &str,
    ) -> Option<MemoryEntry> {
        let mut remote_hit = None;
        if let Some(remote) = self.active_remote() {
            match remote.latest_for_file_name(memory_type, file_name).await {
                Ok(hit) => remote_hit = hit,
                Err(e) => warn!(error = %e, file_name, "memory file lookup failed"),
            }
        }
        let local_hit = self
            .local
            .latest_for_file_name(memory_type, file_name)
            .await
            .ok()
            .flatten();
        newest(remote_hit, local_hit)
    }

    pub(crate) async fn delete_for_project(&self, memory_type: MemoryType, project_id: ProjectId) {
        if let Some(remote) = self.active_remote()
            && let Err(e) = remote.delete_for_project(memory_type, project_id).await
        {
            warn!(error = %e, project_id, "memory backend delete failed");
        }
        let _ = self.local.delete_for_project(memory_type, project_id).await;
    }

    /// Entry counts per type across both backends.
    pub async fn stats(&self) -> MemoryStats {
        let mut by_type = self.local.counts().await.unwrap_or_default();
        if let Some(remote) = self.active_remote() {
            match remote.counts().await {
                Ok(counts) => {
                    for (memory_type, count) in counts {
                        *by_type.entry(memory_type).or_insert(0) += count;
                    }
                }
                Err(e) => warn!(error = %e, "memory stats unavailable from backend"),
            }
        }
        MemoryStats {
            backend: self.backend_kind().to_string(),
            total: by_type.values().sum(),
            by_type,
        }
    }

    /// Removes every entry from both backends.
    pub async fn clear(&self) {
        if let Some(remote) = self.active_remote()
            && let Err(e) = remote.clear().await
        {
            warn!(error = %e, "failed to clear memory backend");
        }
        let _ = self.local.clear().await;
        info!("memory cleared");
    }

    /// Releases the semantic backend. Idempotent. After closing, the store
    /// keeps working against the in-process fallback.
    pub async fn close(&self) -> Result<(), TaxsortError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(remote) = &self.remote {
            remote.close().await?;
        }
        debug!("memory store closed");
        Ok(())
    }
}

fn newest(a: Option<MemoryEntry>, b: Option<MemoryEntry>) -> Option<MemoryEntry> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if b.created_at > a.created_at { b } else { a }),
        (a, b) => a.or(b),
    }
}

#[async_trait]
impl PluginAdapter for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Memory
    }

    async fn health_check(&self) -> Result<HealthStatus, TaxsortError> {
        if self.active_remote().is_some() {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Degraded("in-process fallback".into()))
        }
    }

    async fn shutdown(&self) -> Result<(), TaxsortError> {
        self.close().await
    }
}
