// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! `Database` wraps that one connection and every query module goes through
//! [`Database::connection`]. Do NOT create additional Connection instances for writes.

use std::path::Path;

use taxsort_core::TaxsortError;
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::migrations::run_migrations;

/// Converts a tokio-rusqlite error into [`TaxsortError::Storage`].
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> TaxsortError {
    TaxsortError::Storage {
        source: Box::new(e),
    }
}

/// Handle to the single-writer SQLite connection.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens (creating if needed) the database at `path` in WAL mode, applies
    /// PRAGMAs and runs all pending migrations.
    pub async fn open(path: &str) -> Result<Self, TaxsortError> {
        Self::open_with_wal(path, true).await
    }

    /// Like [`Database::open`] with explicit control over WAL mode.
    pub async fn open_with_wal(path: &str, wal_mode: bool) -> Result<Self, TaxsortError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| TaxsortError::Storage {
                source: Box::new(e),
            })?;
        }

        let conn = Connection::open(path).await.map_err(|e| TaxsortError::Storage {
            source: Box::new(e),
        })?;
        let db = Self { conn };
        db.prepare(wal_mode).await?;
        debug!(path, wal_mode, "database opened");
        Ok(db)
    }

    /// Opens a private in-memory database with the full schema applied.
    pub async fn open_in_memory() -> Result<Self, TaxsortError> {
        let conn = Connection::open_in_memory().await.map_err(|e| TaxsortError::Storage {
            source: Box::new(e),
        })?;
        let db = Self { conn };
        db.prepare(false).await?;
        Ok(db)
    }

    async fn prepare(&self, wal_mode: bool) -> Result<(), TaxsortError> {
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                if wal_mode {
                    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
                }
                conn.execute_batch(
                    "PRAGMA foreign_keys = ON;
                     PRAGMA busy_timeout = 5000;
                     PRAGMA synchronous = NORMAL;",
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        self.conn
            .call(|conn| -> Result<Result<(), TaxsortError>, rusqlite::Error> {
                Ok(run_migrations(conn))
            })
            .await
            .map_err(map_tr_err)?
    }

    /// Returns the shared connection handle.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Checkpoints the WAL and closes the background connection.
    pub async fn close(&self) -> Result<(), TaxsortError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        self.conn.clone().close().await.map_err(map_tr_err)?;
        debug!("database closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_parent_dirs_and_schema() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested/deeper/taxsort.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        assert!(db_path.exists());

        let tables: Vec<String> = db
            .connection()
            .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                )?;
                stmt.query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<_>, _>>()
            })
            .await
            .unwrap();
        for expected in ["files", "memories", "projects", "queue"] {
            assert!(tables.iter().any(|t| t == expected), "missing table {expected}");
        }
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn directory_path_is_a_storage_error() {
        let dir = tempdir().unwrap();
        let result = Database::open(dir.path().to_str().unwrap()).await;
        assert!(matches!(result, Err(TaxsortError::Storage { .. })));
    }

    #[tokio::test]
    async fn in_memory_database_has_schema() {
        let db = Database::open_in_memory().await.unwrap();
        let count: i64 = db
            .connection()
            .call(|conn| -> Result<i64, rusqlite::Error> {
                conn.query_row("SELECT COUNT(*) FROM projects", [], |row| row.get(0))
            })
            .await
            .unwrap();
        assert_eq!(count, 0);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopen_is_idempotent() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("reopen.db");
        let path = db_path.to_str().unwrap();
        Database::open(path).await.unwrap().close().await.unwrap();
        let db = Database::open(path).await.unwrap();
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn category_check_constraint_rejects_out_of_range() {
        let db = Database::open_in_memory().await.unwrap();
        let result = db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute("INSERT INTO projects (name) VALUES ('p')", [])?;
                conn.execute(
                    "INSERT INTO files (project_id, file_path, file_type, category_id)
                     VALUES (1, '/tmp/a.pdf', 'pdf', 21)",
                    [],
                )?;
                Ok(())
            })
            .await;
        assert!(result.is_err());
    }
}
