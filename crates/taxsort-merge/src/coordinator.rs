// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Category-ordered assembly of a project's merged document.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use taxsort_config::model::MergeConfig;
use taxsort_core::types::{CATEGORY_COUNT, ProjectFile};
use taxsort_core::{CategoryId, FileId, ProjectId, TaxsortError};

use crate::pages::{LopdfPageSource, PageSource};

/// One document to place in the merged output.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeInput {
    pub file_id: Option<FileId>,
    pub path: PathBuf,
    pub category_id: Option<CategoryId>,
}

impl From<&ProjectFile> for MergeInput {
    fn from(file: &ProjectFile) -> Self {
        Self {
            file_id: Some(file.id),
            path: PathBuf::from(&file.file_path),
            category_id: file.category_id,
        }
    }
}

/// Outcome of a merge. Failures are reported here rather than as errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeResult {
    pub success: bool,
    pub merged_pdf_path: Option<String>,
    pub total_pages: usize,
    pub documents_merged: usize,
    pub categories_included: usize,
    pub category_counts: BTreeMap<CategoryId, usize>,
    pub warnings: Vec<String>,
    pub error_message: Option<String>,
}

impl MergeResult {
    fn failed(message: String, warnings: Vec<String>) -> Self {
        Self {
            success: false,
            merged_pdf_path: None,
            total_pages: 0,
            documents_merged: 0,
            categories_included: 0,
            category_counts: BTreeMap::new(),
            warnings,
            error_message: Some(message),
        }
    }
}

/// Builds merged artifacts: for each category 1..20 its header page, then
/// every document assigned to it in the order supplied.
pub struct DocumentMergeCoordinator<S: PageSource = LopdfPageSource> {
    source: Arc<S>,
    header_dir: PathBuf,
    output_dir: PathBuf,
}

impl DocumentMergeCoordinator<LopdfPageSource> {
    pub fn from_config(config: &MergeConfig) -> Self {
        Self::new(
            LopdfPageSource,
            &config.header_pages_dir,
            &config.output_dir,
        )
    }
}

impl<S: PageSource> DocumentMergeCoordinator<S> {
    pub fn new(source: S, header_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source: Arc::new(source),
            header_dir: header_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Path of the header page for `category`.
    pub fn header_path(&self, category: CategoryId) -> PathBuf {
        header_path(&self.header_dir, category)
    }

    /// Merges `files` into a new timestamped artifact for the project.
    ///
    /// Missing or unreadable documents are skipped with a warning. A missing
    /// category header fails the whole merge.
    pub async fn merge(
        &self,
        project_id: ProjectId,
        project_name: Option<&str>,
        files: Vec<MergeInput>,
    ) -> MergeResult {
        let job = MergeJob {
            source: Arc::clone(&self.source),
            header_dir: self.header_dir.clone(),
            output_dir: self.output_dir.join(project_id.to_string()),
            stem: output_stem(project_id, project_name),
        };

        let result = tokio::task::spawn_blocking(move || job.run(files))
            .await
            .unwrap_or_else(|e| MergeResult::failed(format!("merge task failed: {e}"), Vec::new()));

        if result.success {
            info!(
                project_id,
                documents = result.documents_merged,
                pages = result.total_pages,
                warnings = result.warnings.len(),
                "merged project documents"
            );
        } else {
            warn!(
                project_id,
                error = result.error_message.as_deref().unwrap_or_default(),
                "merge failed"
            );
        }
        result
    }
}

fn header_path(dir: &Path, category: CategoryId) -> PathBuf {
    dir.join(format!("page_{:03}.pdf", category.get()))
}

/// `Steuer 2024` -> `Steuer_2024`.
fn safe_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn output_stem(project_id: ProjectId, project_name: Option<&str>) -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    match project_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!("{}_merged_{timestamp}", safe_name(name)),
        None => format!("project_{project_id}_merged_{timestamp}"),
    }
}

/// First `<stem>.pdf`, `<stem>_1.pdf`, ... that does not exist yet.
fn unused_path(dir: &Path, stem: &str) -> PathBuf {
    let candidate = dir.join(format!("{stem}.pdf"));
    if !candidate.exists() {
        return candidate;
    }
    (1..)
        .map(|n| dir.join(format!("{stem}_{n}.pdf")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

struct MergeJob<S: PageSource> {
    source: Arc<S>,
    header_dir: PathBuf,
    output_dir: PathBuf,
    stem: String,
}

impl<S: PageSource> MergeJob<S> {
    fn run(self, files: Vec<MergeInput>) -> MergeResult {
        let mut warnings = Vec::new();
        match self.assemble(files, &mut warnings) {
            Ok(result) => result,
            Err(e) => {
                let message = match e {
                    TaxsortError::Merge(message) => message,
                    other => other.to_string(),
                };
                MergeResult::failed(message, warnings)
            }
        }
    }

    fn assemble(
        &self,
        files: Vec<MergeInput>,
        warnings: &mut Vec<String>,
    ) -> Result<MergeResult, TaxsortError> {
        let missing: Vec<String> = CategoryId::all()
            .map(|c| header_path(&self.header_dir, c))
            .filter(|p| !p.exists())
            .map(|p| p.display().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(TaxsortError::Merge(format!(
                "Category header pages not found: {}",
                missing.join(", ")
            )));
        }

        let mut by_category: BTreeMap<CategoryId, Vec<MergeInput>> = BTreeMap::new();
        for file in files {
            match file.category_id {
                Some(category) => by_category.entry(category).or_default().push(file),
                None => debug!(path = %file.path.display(), "skipping unclassified file"),
            }
        }

        let mut parts = Vec::new();
        let mut category_counts = BTreeMap::new();
        let mut documents_merged = 0;

        for category in CategoryId::all() {
            parts.push(self.source.read_pages(&header_path(&self.header_dir, category))?);

            let mut merged_here = 0;
            for file in by_category.remove(&category).unwrap_or_default() {
                if !file.path.exists() {
                    let warning = format!("File not found: {}", file.path.display());
                    warn!(file_id = ?file.file_id, path = %file.path.display(), "skipping missing file");
                    warnings.push(warning);
                    continue;
                }
                match self.source.read_pages(&file.path) {
                    Ok(pages) => {
                        parts.push(pages);
                        merged_here += 1;
                    }
                    Err(e) => {
                        warn!(file_id = ?file.file_id, error = %e, "skipping unreadable file");
                        warnings.push(format!("Could not read {}: {e}", file.path.display()));
                    }
                }
            }
            category_counts.insert(category, merged_here);
            documents_merged += merged_here;
        }

        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| TaxsortError::Storage { source: e.into() })?;
        let output = unused_path(&self.output_dir, &self.stem);
        let total_pages = self.source.write_pages(parts, &output)?;

        Ok(MergeResult {
            success: true,
            merged_pdf_path: Some(output.to_string_lossy().into_owned()),
            total_pages,
            documents_merged,
            categories_included: usize::from(CATEGORY_COUNT),
            category_counts,
            warnings: std::mem::take(warnings),
            error_message: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Text files of the form `pages=N`; writing lists the sources in order.
    struct FakePages;

    impl PageSource for FakePages {
        type Pages = (String, usize);

        fn read_pages(&self, path: &Path) -> Result<Self::Pages, TaxsortError> {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| TaxsortError::Merge(e.to_string()))?;
            let count = raw
                .trim()
                .strip_prefix("pages=")
                .and_then(|n| n.parse().ok())
                .ok_or_else(|| TaxsortError::Merge(format!("bad fake document {raw:?}")))?;
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            Ok((name, count))
        }

        fn page_count(&self, pages: &Self::Pages) -> usize {
            pages.1
        }

        fn write_pages(&self, parts: Vec<Self::Pages>, output: &Path) -> Result<usize, TaxsortError> {
            let listing: Vec<_> = parts.iter().map(|(name, _)| name.as_str()).collect();
            std::fs::write(output, listing.join("\n")).unwrap();
            Ok(parts.iter().map(|p| self.page_count(p)).sum())
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        coordinator: DocumentMergeCoordinator<FakePages>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let headers = dir.path().join("headers");
        std::fs::create_dir(&headers).unwrap();
        for category in CategoryId::all() {
            std::fs::write(header_path(&headers, category), "pages=1").unwrap();
        }
        let coordinator = DocumentMergeCoordinator::new(FakePages, headers, dir.path().join("out"));
        Fixture { dir, coordinator }
    }

    impl Fixture {
        fn doc(&self, name: &str, pages: usize, category: i64) -> MergeInput {
            let path = self.dir.path().join(name);
            std::fs::write(&path, format!("pages={pages}")).unwrap();
            MergeInput {
                file_id: None,
                path,
                category_id: CategoryId::new(category),
            }
        }

        fn absent(&self, name: &str, category: i64) -> MergeInput {
            MergeInput {
                file_id: Some(99),
                path: self.dir.path().join(name),
                category_id: CategoryId::new(category),
            }
        }
    }

    #[tokio::test]
    async fn missing_file_is_skipped_with_warning() {
        let f = fixture();
        let files = vec![
            f.doc("a.pdf", 2, 1),
            f.doc("b.pdf", 1, 11),
            f.absent("gone.pdf", 11),
            f.doc("c.pdf", 3, 13),
            f.doc("d.pdf", 1, 20),
        ];
        let result = f.coordinator.merge(4, Some("Steuer 2024"), files).await;

        assert!(result.success);
        assert_eq!(result.documents_merged, 4);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("gone.pdf"));
        assert_eq!(result.total_pages, 20 + 2 + 1 + 3 + 1);
        assert_eq!(result.categories_included, 20);
        assert_eq!(result.category_counts.len(), 20);
        assert_eq!(result.category_counts.values().sum::<usize>(), 4);
        assert_eq!(result.category_counts[&CategoryId::new(11).unwrap()], 1);
    }

    #[tokio::test]
    async fn output_follows_category_order() {
        let f = fixture();
        let files = vec![
            f.doc("late.pdf", 1, 13),
            f.doc("early.pdf", 1, 2),
            f.doc("late-second.pdf", 1, 13),
        ];
        let result = f.coordinator.merge(1, None, files).await;
        let listing = std::fs::read_to_string(result.merged_pdf_path.unwrap()).unwrap();
        let order: Vec<_> = listing.lines().collect();

        let pos = |name: &str| order.iter().position(|l| *l == name).unwrap();
        assert_eq!(order.len(), 23);
        assert!(pos("page_002.pdf") < pos("early.pdf"));
        assert!(pos("early.pdf") < pos("page_003.pdf"));
        assert!(pos("page_013.pdf") < pos("late.pdf"));
        assert!(pos("late.pdf") < pos("late-second.pdf"));
        assert!(pos("late-second.pdf") < pos("page_014.pdf"));
    }

    #[tokio::test]
    async fn missing_header_fails_the_merge() {
        let f = fixture();
        std::fs::remove_file(f.coordinator.header_path(CategoryId::new(7).unwrap())).unwrap();
        let result = f.coordinator.merge(1, None, vec![f.doc("a.pdf", 1, 1)]).await;

        assert!(!result.success);
        assert!(result.merged_pdf_path.is_none());
        let message = result.error_message.unwrap();
        assert!(message.starts_with("Category header pages not found"));
        assert!(message.contains("page_007.pdf"));
    }

    #[tokio::test]
    async fn unclassified_and_unreadable_files_are_not_counted() {
        let f = fixture();
        let broken = f.dir.path().join("broken.pdf");
        std::fs::write(&broken, "garbage").unwrap();
        let files = vec![
            f.doc("a.pdf", 1, 5),
            f.doc("pending.pdf", 1, 0),
            MergeInput {
                file_id: Some(3),
                path: broken,
                category_id: CategoryId::new(5),
            },
        ];
        let result = f.coordinator.merge(2, None, files).await;
        assert!(result.success);
        assert_eq!(result.documents_merged, 1);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("broken.pdf"));
    }

    #[tokio::test]
    async fn artifacts_are_named_per_project() {
        let f = fixture();
        let first = f.coordinator.merge(9, Some("Müller/2024"), Vec::new()).await;
        let second = f.coordinator.merge(9, Some("Müller/2024"), Vec::new()).await;

        let first = PathBuf::from(first.merged_pdf_path.unwrap());
        let second = PathBuf::from(second.merged_pdf_path.unwrap());
        assert_eq!(first.parent().unwrap(), f.dir.path().join("out").join("9"));
        let name = first.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("M_ller_2024_merged_"), "{name}");
        assert_ne!(first, second);

        let anonymous = f.coordinator.merge(3, None, Vec::new()).await;
        let name = anonymous.merged_pdf_path.unwrap();
        assert!(name.contains("project_3_merged_"));
    }

    #[test]
    fn safe_name_replaces_unsafe_characters() {
        assert_eq!(safe_name("Steuer 2024"), "Steuer_2024");
        assert_eq!(safe_name("a-b_c"), "a-b_c");
        assert_eq!(safe_name("x.y/z"), "x_y_z");
    }

    #[tokio::test]
    async fn merges_real_pdfs() {
        use taxsort_test_utils::pdf::{write_header_pages, write_pdf};

        let dir = tempfile::tempdir().unwrap();
        let headers = dir.path().join("headers");
        write_header_pages(&headers).unwrap();
        let doc = dir.path().join("lohn.pdf");
        write_pdf(&doc, &["Lohnsteuerbescheinigung", "Seite 2"]).unwrap();

        let coordinator =
            DocumentMergeCoordinator::new(LopdfPageSource, headers, dir.path().join("out"));
        let result = coordinator
            .merge(
                1,
                Some("demo"),
                vec![MergeInput {
                    file_id: Some(1),
                    path: doc,
                    category_id: CategoryId::new(11),
                }],
            )
            .await;

        assert!(result.success, "{:?}", result.error_message);
        assert_eq!(result.total_pages, 22);
        let merged = lopdf::Document::load(result.merged_pdf_path.unwrap()).unwrap();
        assert_eq!(merged.get_pages().len(), 22);
        let text = merged.extract_text(&[12]).unwrap();
        assert!(text.contains("Lohnsteuerbescheinigung"));
    }
}
