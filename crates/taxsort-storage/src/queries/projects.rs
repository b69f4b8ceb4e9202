// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Project CRUD operations.

use std::str::FromStr;

use rusqlite::params;
use taxsort_core::types::ProjectId;
use taxsort_core::TaxsortError;

use crate::database::Database;
use crate::models::{Project, ProjectStatus};

const PROJECT_COLUMNS: &str = "id, name, status, merged_pdf_path, created_at, updated_at";

fn row_to_project(row: &rusqlite::Row) -> Result<Project, rusqlite::Error> {
    let status: String = row.get(2)?;
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        status: ProjectStatus::from_str(&status).unwrap_or(ProjectStatus::Pending),
        merged_pdf_path: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

/// Create a new project in the `pending` state.
pub async fn create_project(db: &Database, name: &str) -> Result<Project, TaxsortError> {
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute("INSERT INTO projects (name) VALUES (?1)", params![name])?;
            let id = conn.last_insert_rowid();
            conn.query_row(
                &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
                params![id],
                row_to_project,
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a project by ID.
pub async fn get_project(db: &Database, id: ProjectId) -> Result<Option<Project>, TaxsortError> {
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(
                &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
                params![id],
                row_to_project,
            );
            match result {
                Ok(project) => Ok(Some(project)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// List all projects, newest first.
pub async fn list_projects(db: &Database) -> Result<Vec<Project>, TaxsortError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PROJECT_COLUMNS} FROM projects ORDER BY id DESC"
            ))?;
            let projects = stmt
                .query_map([], row_to_project)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(projects)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Update the processing status of a project.
pub async fn set_status(
    db: &Database,
    id: ProjectId,
    status: ProjectStatus,
) -> Result<(), TaxsortError> {
    let status = status.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE projects SET status = ?1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2",
                params![status, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record the project's current merged artifact path.
pub async fn set_merged_pdf_path(
    db: &Database,
    id: ProjectId,
    path: &str,
) -> Result<(), TaxsortError> {
    let path = path.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE projects SET merged_pdf_path = ?1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2",
                params![path, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_get_project() {
        let db = Database::open_in_memory().await.unwrap();
        let project = create_project(&db, "Steuer 2025").await.unwrap();
        assert!(project.id > 0);
        assert_eq!(project.status, ProjectStatus::Pending);
        assert!(project.merged_pdf_path.is_none());

        let fetched = get_project(&db, project.id).await.unwrap().unwrap();
        assert_eq!(fetched, project);
    }

    #[tokio::test]
    async fn get_missing_project_returns_none() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(get_project(&db, 42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn status_and_merged_path_updates() {
        let db = Database::open_in_memory().await.unwrap();
        let project = create_project(&db, "p").await.unwrap();

        set_status(&db, project.id, ProjectStatus::Completed)
            .await
            .unwrap();
        set_merged_pdf_path(&db, project.id, "/out/p_merged.pdf")
            .await
            .unwrap();

        let fetched = get_project(&db, project.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, ProjectStatus::Completed);
        assert_eq!(fetched.merged_pdf_path.as_deref(), Some("/out/p_merged.pdf"));
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let db = Database::open_in_memory().await.unwrap();
        create_project(&db, "first").await.unwrap();
        create_project(&db, "second").await.unwrap();
        let names: Vec<String> = list_projects(&db)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["second", "first"]);
    }
}
