// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job queue backing the worker.
//!
//! A claimed job holds a lock for [`LOCK_MINUTES`]. A worker that dies
//! mid-job leaves the entry in `processing`; once the lock has expired the
//! entry is claimable again.

use rusqlite::{params, OptionalExtension, Row};
use taxsort_core::TaxsortError;

use crate::database::{map_tr_err, Database};
use crate::models::QueueEntry;

/// How long a claimed job stays invisible to other workers.
pub const LOCK_MINUTES: u32 = 10;

const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<QueueEntry> {
    Ok(QueueEntry {
        id: row.get("id")?,
        queue_name: row.get("queue_name")?,
        payload: row.get("payload")?,
        status: row.get("status")?,
        attempts: row.get("attempts")?,
        max_attempts: row.get("max_attempts")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        locked_until: row.get("locked_until")?,
    })
}

pub async fn enqueue(db: &Database, queue_name: &str, payload: &str) -> Result<i64, TaxsortError> {
    let queue_name = queue_name.to_owned();
    let payload = payload.to_owned();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO queue (queue_name, payload) VALUES (?1, ?2)",
                params![queue_name, payload],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Claims the oldest claimable entry of `queue_name`.
///
/// Pending entries and processing entries whose lock expired are both
/// claimable. The claim is a single statement, so two workers never get
/// the same entry.
pub async fn dequeue(db: &Database, queue_name: &str) -> Result<Option<QueueEntry>, TaxsortError> {
    let queue_name = queue_name.to_owned();
    let sql = format!(
        "UPDATE queue
            SET status = 'processing',
                locked_until = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '+{LOCK_MINUTES} minutes'),
                updated_at = {NOW}
          WHERE id = (
                SELECT id FROM queue
                 WHERE queue_name = ?1
                   AND (status = 'pending'
                        OR (status = 'processing' AND locked_until < {NOW}))
                 ORDER BY id
                 LIMIT 1)
      RETURNING *"
    );
    db.connection()
        .call(move |conn| {
            conn.query_row(&sql, params![queue_name], entry_from_row)
                .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn ack(db: &Database, id: i64) -> Result<(), TaxsortError> {
    let sql = format!(
        "UPDATE queue SET status = 'completed', locked_until = NULL, updated_at = {NOW}
          WHERE id = ?1"
    );
    db.connection()
        .call(move |conn| {
            conn.execute(&sql, params![id])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Counts a failed attempt. The entry goes back to `pending` until it has
/// used up `max_attempts`, then stays `failed`.
pub async fn fail(db: &Database, id: i64) -> Result<(), TaxsortError> {
    let sql = format!(
        "UPDATE queue
            SET attempts = attempts + 1,
                status = CASE WHEN attempts + 1 >= max_attempts THEN 'failed' ELSE 'pending' END,
                locked_until = NULL,
                updated_at = {NOW}
          WHERE id = ?1"
    );
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(&sql, params![id])?;
            if changed == 0 {
                return Err(rusqlite::Error::QueryReturnedNoRows);
            }
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
