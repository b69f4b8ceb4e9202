// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed semantic backend.
//!
//! Embeddings are stored as f32 BLOBs next to the content and ranked by
//! cosine similarity in Rust. `project_id` and `file_name` are lifted out of
//! the metadata into indexed columns so exact lookups never go through the
//! similarity path.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use rusqlite::{OptionalExtension, params};
use serde_json::Value;
use tracing::debug;

use taxsort_core::types::EmbeddingInput;
use taxsort_core::{EmbeddingAdapter, ProjectId, TaxsortError};
use taxsort_storage::{Database, map_tr_err};

use crate::backend::MemoryBackend;
use crate::types::{
    MemoryEntry, MemoryType, Metadata, blob_to_vec, cosine_similarity, now_timestamp, vec_to_blob,
};

const MEMORY_COLUMNS: &str = "id, content, memory_type, metadata, created_at";

/// Semantic memory on top of a migrated [`Database`] and an embedding adapter.
pub struct VectorBackend {
    db: Database,
    embedder: Arc<dyn EmbeddingAdapter>,
    closed: AtomicBool,
}

impl VectorBackend {
    pub fn new(db: Database, embedder: Arc<dyn EmbeddingAdapter>) -> Self {
        Self {
            db,
            embedder,
            closed: AtomicBool::new(false),
        }
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, TaxsortError> {
        let output = self
            .embedder
            .embed(EmbeddingInput {
                texts: vec![text.to_string()],
            })
            .await
            .map_err(|e| TaxsortError::MemoryBackend {
                message: format!("embedding failed: {e}"),
            })?;
        output
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| TaxsortError::MemoryBackend {
                message: "embedding adapter returned no vectors".into(),
            })
    }

    fn ensure_open(&self) -> Result<(), TaxsortError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TaxsortError::MemoryBackend {
                message: "vector backend is closed".into(),
            });
        }
        Ok(())
    }
}

fn row_to_entry(row: &rusqlite::Row) -> Result<MemoryEntry, rusqlite::Error> {
    let memory_type: String = row.get(2)?;
    let metadata: String = row.get(3)?;
    Ok(MemoryEntry {
        id: row.get(0)?,
        content: row.get(1)?,
        memory_type: MemoryType::from_str_value(&memory_type),
        metadata: serde_json::from_str(&metadata).unwrap_or_default(),
        created_at: row.get(4)?,
        score: None,
    })
}

fn metadata_json(metadata: &Metadata) -> Result<String, TaxsortError> {
    serde_json::to_string(metadata).map_err(|e| TaxsortError::Storage {
        source: Box::new(e),
    })
}

#[async_trait]
impl MemoryBackend for VectorBackend {
    fn kind(&self) -> &'static str {
        "vector"
    }

    async fn insert(
        &self,
        content: &str,
        metadata: Metadata,
        memory_type: MemoryType,
    ) -> Result<MemoryEntry, TaxsortError> {
        self.ensure_open()?;
        let embedding = self.embed_one(content).await?;
        let entry = MemoryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.to_string(),
            created_at: metadata
                .get("timestamp")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(now_timestamp),
            memory_type,
            score: None,
            metadata,
        };

        let id = entry.id.clone();
        let content = entry.content.clone();
        let blob = vec_to_blob(&embedding);
        let type_str = memory_type.as_str();
        let metadata = metadata_json(&entry.metadata)?;
        let project_id = entry.metadata_i64("project_id");
        let file_name = entry.metadata_str("file_name").map(str::to_string);
        let created_at = entry.created_at.clone();

        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO memories (id, content, embedding, memory_type, metadata, project_id, file_name, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![id, content, blob, type_str, metadata, project_id, file_name, created_at],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!(id = %entry.id, memory_type = type_str, "memory stored");
        Ok(entry)
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        memory_type: Option<MemoryType>,
    ) -> Result<Vec<MemoryEntry>, TaxsortError> {
        self.ensure_open()?;
        let query_vec = self.embed_one(query).await?;
        let type_filter = memory_type.map(|t| t.as_str());

        let rows: Vec<(MemoryEntry, Vec<f32>)> = self
            .db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MEMORY_COLUMNS}, embedding FROM memories \
                     WHERE ?1 IS NULL OR memory_type = ?1"
                ))?;
                let rows = stmt
                    .query_map(params![type_filter], |row| {
                        let blob: Vec<u8> = row.get(5)?;
                        Ok((row_to_entry(row)?, blob_to_vec(&blob)))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)?;

        // Vectors from a different embedding model have another dimension
        // and are skipped rather than compared.
        let mut scored: Vec<MemoryEntry> = rows
            .into_iter()
            .filter_map(|(mut entry, vec)| {
                let score = cosine_similarity(&query_vec, &vec)?;
                entry.score = Some(score);
                Some(entry)
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn list(
        &self,
        memory_type: Option<MemoryType>,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>, TaxsortError> {
        self.ensure_open()?;
        let type_filter = memory_type.map(|t| t.as_str());
        let limit = limit as i64;
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MEMORY_COLUMNS} FROM memories \
                     WHERE ?1 IS NULL OR memory_type = ?1 \
                     ORDER BY created_at DESC, rowid DESC LIMIT ?2"
                ))?;
                let entries = stmt
                    .query_map(params![type_filter, limit], row_to_entry)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(entries)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryEntry>, TaxsortError> {
        self.ensure_open()?;
        let id = id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                conn.query_row(
                    &format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1"),
                    params![id],
                    row_to_entry,
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)
    }

    async fn latest_for_project(
        &self,
        memory_type: MemoryType,
        project_id: ProjectId,
    ) -> Result<Option<MemoryEntry>, TaxsortError> {
        self.ensure_open()?;
        let type_str = memory_type.as_str();
        self.db
            .connection()
            .call(move |conn| {
                conn.query_row(
                    &format!(
                        "SELECT {MEMORY_COLUMNS} FROM memories \
                         WHERE memory_type = ?1 AND project_id = ?2 \
                         ORDER BY created_at DESC, rowid DESC LIMIT 1"
                    ),
                    params![type_str, project_id],
                    row_to_entry,
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)
    }

    async fn latest_for_file_name(
        &self,
        memory_type: MemoryType,
        file_name: &str,
    ) -> Result<Option<MemoryEntry>, TaxsortError> {
        self.ensure_open()?;
        let type_str = memory_type.as_str();
        let file_name = file_name.to_string();
        self.db
            .connection()
            .call(move |conn| {
                conn.query_row(
                    &format!(
                        "SELECT {MEMORY_COLUMNS} FROM memories \
                         WHERE memory_type = ?1 AND file_name = ?2 \
                         ORDER BY created_at DESC, rowid DESC LIMIT 1"
                    ),
                    params![type_str, file_name],
                    row_to_entry,
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)
    }

    async fn update(
        &self,
        id: &str,
        content: &str,
        metadata: Metadata,
    ) -> Result<bool, TaxsortError> {
        self.ensure_open()?;
        let Some(existing) = self.get(id).await? else {
            return Ok(false);
        };
        let embedding = self.embed_one(content).await?;

        let mut merged = existing.metadata;
        merged.extend(metadata);
        merged.insert("timestamp".into(), Value::from(now_timestamp()));
        let project_id = merged.get("project_id").and_then(Value::as_i64);
        let file_name = merged
            .get("file_name")
            .and_then(Value::as_str)
            .map(str::to_string);
        let metadata = metadata_json(&merged)?;

        let id = id.to_string();
        let content = content.to_string();
        let blob = vec_to_blob(&embedding);
        let changed = self
            .db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "UPDATE memories SET content = ?2, embedding = ?3, metadata = ?4, \
                     project_id = ?5, file_name = ?6 WHERE id = ?1",
                    params![id, content, blob, metadata, project_id, file_name],
                )
            })
            .await
            .map_err(map_tr_err)?;
        Ok(changed > 0)
    }

    async fn delete(&self, id: &str) -> Result<bool, TaxsortError> {
        self.ensure_open()?;
        let id = id.to_string();
        let changed = self
            .db
            .connection()
            .call(move |conn| conn.execute("DELETE FROM memories WHERE id = ?1", params![id]))
            .await
            .map_err(map_tr_err)?;
        Ok(changed > 0)
    }

    async fn delete_for_project(
        &self,
        memory_type: MemoryType,
        project_id: ProjectId,
    ) -> Result<usize, TaxsortError> {
        self.ensure_open()?;
        let type_str = memory_type.as_str();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM memories WHERE memory_type = ?1 AND project_id = ?2",
                    params![type_str, project_id],
                )
            })
            .await
            .map_err(map_tr_err)
    }

    async fn clear(&self) -> Result<(), TaxsortError> {
        self.ensure_open()?;
        self.db
            .connection()
            .call(|conn| {
                conn.execute("DELETE FROM memories", [])?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn counts(&self) -> Result<BTreeMap<String, usize>, TaxsortError> {
        self.ensure_open()?;
        self.db
            .connection()
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT memory_type, COUNT(*) FROM memories GROUP BY memory_type")?;
                let counts = stmt
                    .query_map([], |row| {
                        let memory_type: String = row.get(0)?;
                        let count: i64 = row.get(1)?;
                        Ok((memory_type, count as usize))
                    })?
                    .collect::<Result<BTreeMap<_, _>, _>>()?;
                Ok(counts)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn close(&self) -> Result<(), TaxsortError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.db.close().await?;
        debug!("vector memory backend closed");
        Ok(())
    }
}
