// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Content extractor trait for turning uploaded files into text.

use std::path::Path;

use async_trait::async_trait;

use crate::error::TaxsortError;
use crate::traits::adapter::PluginAdapter;
use crate::types::ExtractedContent;

/// Adapter that extracts text from a document on disk.
#[async_trait]
pub trait ContentExtractor: PluginAdapter {
    /// Returns true if this extractor handles the given file extension (lowercase, no dot).
    fn supports(&self, extension: &str) -> bool;

    /// Extracts the text content of the file.
    async fn extract(&self, path: &Path) -> Result<ExtractedContent, TaxsortError>;
}
