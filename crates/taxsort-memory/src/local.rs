// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process fallback backend.
//!
//! Keeps entries in insertion order and answers searches with a
//! case-insensitive substring match. Used when no embedding deployment is
//! configured and as the landing spot for writes the vector backend rejects.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use taxsort_core::{ProjectId, TaxsortError};

use crate::backend::MemoryBackend;
use crate::types::{MemoryEntry, MemoryType, Metadata, now_timestamp};

#[derive(Default)]
pub struct LocalBackend {
    entries: Mutex<Vec<MemoryEntry>>,
    seq: AtomicU64,
}

impl LocalBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// `mem_<sequence>_<timestamp>` with `:` replaced so the id is filename safe.
    fn next_id(&self, timestamp: &str) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("mem_{seq}_{}", timestamp.replace(':', "-"))
    }

    /// Appends an entry. Never fails, which is what makes this the fallback.
    pub async fn push(&self, content: &str, metadata: Metadata, memory_type: MemoryType) -> MemoryEntry {
        let created_at = metadata
            .get("timestamp")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(now_timestamp);
        let entry = MemoryEntry {
            id: self.next_id(&created_at),
            content: content.to_string(),
            metadata,
            memory_type,
            created_at,
            score: None,
        };
        self.entries.lock().await.push(entry.clone());
        entry
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

fn matches_type(entry: &MemoryEntry, memory_type: Option<MemoryType>) -> bool {
    memory_type.is_none_or(|t| entry.memory_type == t)
}

#[async_trait]
impl MemoryBackend for LocalBackend {
    fn kind(&self) -> &'static str {
        "local"
    }

    async fn insert(
        &self,
        content: &str,
        metadata: Metadata,
        memory_type: MemoryType,
    ) -> Result<MemoryEntry, TaxsortError> {
        Ok(self.push(content, metadata, memory_type).await)
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        memory_type: Option<MemoryType>,
    ) -> Result<Vec<MemoryEntry>, TaxsortError> {
        let needle = query.to_lowercase();
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .filter(|e| matches_type(e, memory_type))
            .filter(|e| e.content.to_lowercase().contains(&needle))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list(
        &self,
        memory_type: Option<MemoryType>,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>, TaxsortError> {
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .rev()
            .filter(|e| matches_type(e, memory_type))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryEntry>, TaxsortError> {
        let entries = self.entries.lock().await;
        Ok(entries.iter().find(|e| e.id == id).cloned())
    }

    async fn latest_for_project(
        &self,
        memory_type: MemoryType,
        project_id: ProjectId,
    ) -> Result<Option<MemoryEntry>, TaxsortError> {
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .rev()
            .find(|e| e.memory_type == memory_type && e.metadata_i64("project_id") == Some(project_id))
            .cloned())
    }

    async fn latest_for_file_name(
        &self,
        memory_type: MemoryType,
        file_name: &str,
    ) -> Result<Option<MemoryEntry>, TaxsortError> {
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .rev()
            .find(|e| e.memory_type == memory_type && e.metadata_str("file_name") == Some(file_name))
            .cloned())
    }

    async fn update(
        &self,
        id: &str,
        content: &str,
        metadata: Metadata,
    ) -> Result<bool, TaxsortError> {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.iter_mut().find(|e| e.id == id) else {
            return Ok(false);
        };
        entry.content = content.to_string();
        entry.metadata.extend(metadata);
        entry
            .metadata
            .insert("timestamp".into(), Value::from(now_timestamp()));
        Ok(true)
    }

    async fn delete(&self, id: &str) -> Result<bool, TaxsortError> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|e| e.id != id);
        Ok(entries.len() != before)
    }

    async fn delete_for_project(
        &self,
        memory_type: MemoryType,
        project_id: ProjectId,
    ) -> Result<usize, TaxsortError> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|e| {
            !(e.memory_type == memory_type && e.metadata_i64("project_id") == Some(project_id))
        });
        Ok(before - entries.len())
    }

    async fn clear(&self) -> Result<(), TaxsortError> {
        self.entries.lock().await.clear();
        Ok(())
    }

    async fn counts(&self) -> Result<BTreeMap<String, usize>, TaxsortError> {
        let entries = self.entries.lock().await;
        let mut counts = BTreeMap::new();
        for entry in entries.iter() {
            *counts.entry(entry.memory_type.as_str().to_string()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn close(&self) -> Result<(), TaxsortError> {
        Ok(())
    }
}
