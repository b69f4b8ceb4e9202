// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! File operations: registration, preprocessing output, and category writes.

use std::path::Path;

use rusqlite::{params, OptionalExtension};
use taxsort_core::types::{CategoryId, DocumentSummary, FileId, ProjectId};
use taxsort_core::TaxsortError;

use crate::database::Database;
use crate::models::{AppliedChange, CategoryAssignment, CategoryChange, ProjectFile};

const FILE_COLUMNS: &str = "id, project_id, file_path, file_type, summary, keywords, \
     document_type, key_entities, category_id, category_german, category_english, \
     classification_confidence, classification_reasoning, reclassified, reclassified_at, \
     created_at, updated_at";

fn row_to_file(row: &rusqlite::Row) -> Result<ProjectFile, rusqlite::Error> {
    let keywords: String = row.get(5)?;
    let key_entities: String = row.get(7)?;
    let category_id: Option<i64> = row.get(8)?;
    Ok(ProjectFile {
        id: row.get(0)?,
        project_id: row.get(1)?,
        file_path: row.get(2)?,
        file_type: row.get(3)?,
        summary: row.get(4)?,
        keywords: serde_json::from_str(&keywords).unwrap_or_default(),
        document_type: row.get(6)?,
        key_entities: serde_json::from_str(&key_entities).unwrap_or_default(),
        category_id: category_id.and_then(CategoryId::new),
        category_german: row.get(9)?,
        category_english: row.get(10)?,
        confidence: row.get(11)?,
        reasoning: row.get(12)?,
        reclassified: row.get(13)?,
        reclassified_at: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

/// Lowercased extension of the path, or `unknown`.
pub fn file_type_for(path: &str) -> String {
    Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Appends a reclassification reason to an existing reasoning trail.
///
/// The trail is append-only: earlier entries are never rewritten. An empty
/// reason leaves the trail as it was.
pub fn append_reasoning(existing: Option<&str>, reasoning: &str) -> String {
    if reasoning.trim().is_empty() {
        return existing.unwrap_or_default().to_string();
    }
    format!(
        "{}\n[Reclassified]: {}",
        existing.unwrap_or_default(),
        reasoning
    )
    .trim()
    .to_string()
}

/// Register a file with a project.
pub async fn add_file(
    db: &Database,
    project_id: ProjectId,
    file_path: &str,
) -> Result<ProjectFile, TaxsortError> {
    let file_path = file_path.to_string();
    let file_type = file_type_for(&file_path);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO files (project_id, file_path, file_type) VALUES (?1, ?2, ?3)",
                params![project_id, file_path, file_type],
            )?;
            let id = conn.last_insert_rowid();
            conn.query_row(
                &format!("SELECT {FILE_COLUMNS} FROM files WHERE id = ?1"),
                params![id],
                row_to_file,
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a file by ID, scoped to its project.
pub async fn get_file(
    db: &Database,
    project_id: ProjectId,
    file_id: FileId,
) -> Result<Option<ProjectFile>, TaxsortError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {FILE_COLUMNS} FROM files WHERE id = ?1 AND project_id = ?2"),
                params![file_id, project_id],
                row_to_file,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// List all files of a project in upload order.
pub async fn list_files(
    db: &Database,
    project_id: ProjectId,
) -> Result<Vec<ProjectFile>, TaxsortError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FILE_COLUMNS} FROM files WHERE project_id = ?1 ORDER BY id ASC"
            ))?;
            let files = stmt
                .query_map(params![project_id], row_to_file)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(files)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Store preprocessing output (summary, keywords, type, entities) on a file row.
pub async fn save_preprocessing(
    db: &Database,
    file_id: FileId,
    summary: &DocumentSummary,
) -> Result<(), TaxsortError> {
    let text = summary.summary.clone();
    let keywords = serde_json::to_string(&summary.keywords).map_err(|e| TaxsortError::Storage {
        source: Box::new(e),
    })?;
    let document_type = summary.document_type.clone();
    let key_entities =
        serde_json::to_string(&summary.key_entities).map_err(|e| TaxsortError::Storage {
            source: Box::new(e),
        })?;
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE files SET summary = ?1, keywords = ?2, document_type = ?3,
                 key_entities = ?4, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?5",
                params![text, keywords, document_type, key_entities, file_id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Write a first-time classification to a file row.
pub async fn record_classification(
    db: &Database,
    file_id: FileId,
    assignment: &CategoryAssignment,
) -> Result<(), TaxsortError> {
    let assignment = assignment.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE files SET category_id = ?1, category_german = ?2,
                 category_english = ?3, classification_confidence = ?4,
                 classification_reasoning = ?5,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?6",
                params![
                    i64::from(assignment.category_id),
                    assignment.category_german,
                    assignment.category_english,
                    assignment.confidence,
                    assignment.reasoning,
                    file_id,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Reclassify a file in one transaction.
///
/// Reads the current category and reasoning, writes the new category,
/// appends the reasoning to the trail, and marks the row reclassified.
/// Returns `None` without writing when the file is not in the project.
pub async fn apply_category_change(
    db: &Database,
    project_id: ProjectId,
    file_id: FileId,
    change: &CategoryChange,
) -> Result<Option<AppliedChange>, TaxsortError> {
    let change = change.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let current = tx
                .query_row(
                    "SELECT category_id, classification_reasoning FROM files
                     WHERE id = ?1 AND project_id = ?2",
                    params![file_id, project_id],
                    |row| Ok((row.get::<_, Option<i64>>(0)?, row.get::<_, Option<String>>(1)?)),
                )
                .optional()?;
            let Some((old_category, old_reasoning)) = current else {
                tx.commit()?;
                return Ok(None);
            };

            let trail = append_reasoning(old_reasoning.as_deref(), &change.reasoning);
            tx.execute(
                "UPDATE files SET category_id = ?1, category_german = ?2,
                 category_english = ?3, classification_reasoning = ?4,
                 reclassified = 1,
                 reclassified_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?5 AND project_id = ?6",
                params![
                    i64::from(change.category_id),
                    change.category_german,
                    change.category_english,
                    trail,
                    file_id,
                    project_id,
                ],
            )?;
            tx.commit()?;

            Ok(Some(AppliedChange {
                old_category_id: old_category.and_then(CategoryId::new),
                reasoning_trail: trail,
            }))
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::projects::create_project;

    fn category(id: i64) -> CategoryId {
        CategoryId::new(id).unwrap()
    }

    fn change(id: i64, reasoning: &str) -> CategoryChange {
        CategoryChange {
            category_id: category(id),
            category_german: format!("Kategorie {id}"),
            category_english: format!("Category {id}"),
            reasoning: reasoning.to_string(),
        }
    }

    #[test]
    fn append_reasoning_formats_trail() {
        assert_eq!(append_reasoning(None, "user request"), "[Reclassified]: user request");
        assert_eq!(
            append_reasoning(Some("initial"), "second look"),
            "initial\n[Reclassified]: second look"
        );
        assert_eq!(append_reasoning(Some("initial"), "  "), "initial");
    }

    #[test]
    fn file_type_from_extension() {
        assert_eq!(file_type_for("/x/Scan.PDF"), "pdf");
        assert_eq!(file_type_for("/x/README"), "unknown");
    }

    #[tokio::test]
    async fn add_and_list_files() {
        let db = Database::open_in_memory().await.unwrap();
        let project = create_project(&db, "p").await.unwrap();
        let a = add_file(&db, project.id, "/up/a.pdf").await.unwrap();
        let b = add_file(&db, project.id, "/up/b.docx").await.unwrap();
        assert_eq!(a.file_type, "pdf");
        assert_eq!(b.file_type, "docx");
        assert!(a.category_id.is_none());
        assert!(!a.reclassified);

        let files = list_files(&db, project.id).await.unwrap();
        assert_eq!(files.iter().map(|f| f.id).collect::<Vec<_>>(), vec![a.id, b.id]);
    }

    #[tokio::test]
    async fn get_file_is_project_scoped() {
        let db = Database::open_in_memory().await.unwrap();
        let p1 = create_project(&db, "p1").await.unwrap();
        let p2 = create_project(&db, "p2").await.unwrap();
        let file = add_file(&db, p1.id, "/up/a.pdf").await.unwrap();

        assert!(get_file(&db, p1.id, file.id).await.unwrap().is_some());
        assert!(get_file(&db, p2.id, file.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn preprocessing_roundtrips_json_columns() {
        let db = Database::open_in_memory().await.unwrap();
        let project = create_project(&db, "p").await.unwrap();
        let file = add_file(&db, project.id, "/up/a.pdf").await.unwrap();

        let mut summary = DocumentSummary {
            file_id: Some(file.id),
            file_name: "a.pdf".into(),
            summary: "Rentenbescheid 2025".into(),
            keywords: vec!["Rente".into(), "DRV".into()],
            document_type: "notice".into(),
            ..DocumentSummary::default()
        };
        summary
            .key_entities
            .insert("organizations".into(), vec!["Deutsche Rentenversicherung".into()]);
        save_preprocessing(&db, file.id, &summary).await.unwrap();

        let stored = get_file(&db, project.id, file.id).await.unwrap().unwrap();
        assert_eq!(stored.summary.as_deref(), Some("Rentenbescheid 2025"));
        assert_eq!(stored.keywords, vec!["Rente", "DRV"]);
        assert_eq!(
            stored.key_entities.get("organizations").map(Vec::len),
            Some(1)
        );
    }

    #[tokio::test]
    async fn record_then_reclassify_twice_keeps_trail_in_order() {
        let db = Database::open_in_memory().await.unwrap();
        let project = create_project(&db, "p").await.unwrap();
        let file = add_file(&db, project.id, "/up/a.pdf").await.unwrap();

        record_classification(
            &db,
            file.id,
            &CategoryAssignment {
                category_id: category(2),
                category_german: "Wichtige Korrespondenz".into(),
                category_english: "Important correspondence".into(),
                confidence: Some(0.8),
                reasoning: "letter from tax office".into(),
            },
        )
        .await
        .unwrap();

        let first = apply_category_change(&db, project.id, file.id, &change(9, "first fix"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.old_category_id, Some(category(2)));

        let second = apply_category_change(&db, project.id, file.id, &change(13, "second fix"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.old_category_id, Some(category(9)));

        let stored = get_file(&db, project.id, file.id).await.unwrap().unwrap();
        assert_eq!(stored.category_id, Some(category(13)));
        assert!(stored.reclassified);
        assert!(stored.reclassified_at.is_some());
        let trail = stored.reasoning.unwrap();
        let first_pos = trail.find("first fix").unwrap();
        let second_pos = trail.find("second fix").unwrap();
        assert!(trail.starts_with("letter from tax office"));
        assert!(first_pos < second_pos);
    }

    #[tokio::test]
    async fn change_for_foreign_file_is_none_and_writes_nothing() {
        let db = Database::open_in_memory().await.unwrap();
        let p1 = create_project(&db, "p1").await.unwrap();
        let p2 = create_project(&db, "p2").await.unwrap();
        let file = add_file(&db, p1.id, "/up/a.pdf").await.unwrap();

        let outcome = apply_category_change(&db, p2.id, file.id, &change(5, "wrong project"))
            .await
            .unwrap();
        assert!(outcome.is_none());

        let stored = get_file(&db, p1.id, file.id).await.unwrap().unwrap();
        assert!(stored.category_id.is_none());
        assert!(!stored.reclassified);
    }
}
