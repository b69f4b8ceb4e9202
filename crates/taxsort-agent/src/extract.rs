// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in content extractors.
//!
//! [`PlainTextExtractor`] reads text formats as-is and [`LopdfExtractor`]
//! pulls the text layer out of PDFs. Scanned documents without a text layer
//! extract to empty content rather than failing.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use taxsort_core::types::ExtractedContent;
use taxsort_core::{AdapterType, ContentExtractor, HealthStatus, PluginAdapter, TaxsortError};

const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "csv", "json", "xml", "html", "htm"];

fn extraction_error(path: &Path, message: impl Into<String>) -> TaxsortError {
    TaxsortError::Extraction {
        path: path.display().to_string(),
        message: message.into(),
    }
}

/// Lowercase extension without the dot, or an empty string.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

/// Reads text files, replacing invalid UTF-8.
#[derive(Debug, Default)]
pub struct PlainTextExtractor;

#[async_trait]
impl PluginAdapter for PlainTextExtractor {
    fn name(&self) -> &str {
        "plain-text"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Extractor
    }

    async fn health_check(&self) -> Result<HealthStatus, TaxsortError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TaxsortError> {
        Ok(())
    }
}

#[async_trait]
impl ContentExtractor for PlainTextExtractor {
    fn supports(&self, extension: &str) -> bool {
        TEXT_EXTENSIONS.contains(&extension)
    }

    async fn extract(&self, path: &Path) -> Result<ExtractedContent, TaxsortError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| extraction_error(path, e.to_string()))?;
        let content = String::from_utf8_lossy(&bytes).into_owned();

        let mut metadata = Map::new();
        metadata.insert("extractor".into(), Value::from(self.name()));
        metadata.insert("bytes".into(), Value::from(bytes.len()));
        Ok(ExtractedContent {
            success: true,
            page_contents: vec![content.clone()],
            content,
            metadata,
        })
    }
}

/// Extracts the text layer of a PDF page by page.
#[derive(Debug, Default)]
pub struct LopdfExtractor;

#[async_trait]
impl PluginAdapter for LopdfExtractor {
    fn name(&self) -> &str {
        "lopdf"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Extractor
    }

    async fn health_check(&self) -> Result<HealthStatus, TaxsortError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TaxsortError> {
        Ok(())
    }
}

fn read_pdf_text(path: &Path) -> Result<Vec<String>, TaxsortError> {
    let doc = lopdf::Document::load(path).map_err(|e| extraction_error(path, e.to_string()))?;
    let pages = doc
        .get_pages()
        .into_keys()
        .map(|number| match doc.extract_text(&[number]) {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), page = number, error = %e, "no text on page");
                String::new()
            }
        })
        .collect();
    Ok(pages)
}

#[async_trait]
impl ContentExtractor for LopdfExtractor {
    fn supports(&self, extension: &str) -> bool {
        extension == "pdf"
    }

    async fn extract(&self, path: &Path) -> Result<ExtractedContent, TaxsortError> {
        let owned = path.to_path_buf();
        let pages = tokio::task::spawn_blocking(move || read_pdf_text(&owned))
            .await
            .map_err(|e| extraction_error(path, format!("extraction task failed: {e}")))??;

        let content = pages
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        debug!(path = %path.display(), pages = pages.len(), chars = content.len(), "extracted pdf text");

        let mut metadata = Map::new();
        metadata.insert("extractor".into(), Value::from(self.name()));
        metadata.insert("page_count".into(), Value::from(pages.len()));
        Ok(ExtractedContent {
            success: true,
            content,
            page_contents: pages,
            metadata,
        })
    }
}

/// Ordered extractor list; the first one supporting an extension wins.
#[derive(Clone)]
pub struct ExtractorSet {
    extractors: Vec<Arc<dyn ContentExtractor>>,
}

impl Default for ExtractorSet {
    fn default() -> Self {
        Self::new(vec![Arc::new(LopdfExtractor), Arc::new(PlainTextExtractor)])
    }
}

impl ExtractorSet {
    pub fn new(extractors: Vec<Arc<dyn ContentExtractor>>) -> Self {
        Self { extractors }
    }

    pub fn for_path(&self, path: &Path) -> Option<&Arc<dyn ContentExtractor>> {
        let extension = extension_of(path);
        self.extractors.iter().find(|e| e.supports(&extension))
    }

    pub async fn extract(&self, path: &Path) -> Result<ExtractedContent, TaxsortError> {
        let extractor = self.for_path(path).ok_or_else(|| {
            extraction_error(path, format!("unsupported file type `{}`", extension_of(path)))
        })?;
        extractor.extract(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plain_text_is_read_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.TXT");
        std::fs::write(&path, b"Miete \xff 2024").unwrap();

        let extracted = ExtractorSet::default().extract(&path).await.unwrap();
        assert!(extracted.success);
        assert!(extracted.content.starts_with("Miete "));
        assert!(extracted.content.ends_with(" 2024"));
        assert_eq!(extracted.metadata["extractor"], "plain-text");
    }

    #[tokio::test]
    async fn pdf_text_is_extracted_per_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lohn.pdf");
        taxsort_test_utils::pdf::write_pdf(&path, &["Lohnsteuerbescheinigung", "Seite zwei"])
            .unwrap();

        let extracted = ExtractorSet::default().extract(&path).await.unwrap();
        assert_eq!(extracted.page_contents.len(), 2);
        assert!(extracted.content.contains("Lohnsteuerbescheinigung"));
        assert!(extracted.content.contains("Seite zwei"));
        assert_eq!(extracted.metadata["page_count"], 2);
    }

    #[tokio::test]
    async fn broken_pdf_is_an_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();

        let err = ExtractorSet::default().extract(&path).await.unwrap_err();
        assert!(matches!(err, TaxsortError::Extraction { .. }));
    }

    #[tokio::test]
    async fn unsupported_extension_is_rejected() {
        let err = ExtractorSet::default()
            .extract(Path::new("/tmp/scan.heic"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unsupported file type `heic`"));
    }
}
