// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Page-level PDF access behind a narrow trait.

use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::debug;

use taxsort_core::TaxsortError;

/// Reads documents as page sequences and writes concatenations of them.
///
/// Both calls block; the coordinator runs them on the blocking pool.
pub trait PageSource: Send + Sync + 'static {
    /// A loaded document.
    type Pages: Send + 'static;

    /// Loads the document at `path`.
    fn read_pages(&self, path: &Path) -> Result<Self::Pages, TaxsortError>;

    /// Number of pages in a loaded document.
    fn page_count(&self, pages: &Self::Pages) -> usize;

    /// Writes `parts` in order into one file at `output`. Returns the page
    /// count of the written file.
    fn write_pages(&self, parts: Vec<Self::Pages>, output: &Path) -> Result<usize, TaxsortError>;
}

/// [`PageSource`] backed by lopdf.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfPageSource;

/// Attributes a page may inherit from its `Pages` ancestors.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

fn type_name(object: &Object) -> Option<&[u8]> {
    object
        .as_dict()
        .ok()
        .and_then(|d| d.get(b"Type").ok())
        .and_then(|t| t.as_name().ok())
}

/// The page dictionary with inherited attributes copied in, so it survives
/// being re-parented under a new page tree.
fn flattened_page(doc: &Document, page_id: ObjectId) -> Option<Dictionary> {
    let mut page = doc.get_dictionary(page_id).ok()?.clone();
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    while let Some(parent_id) = parent {
        let Ok(node) = doc.get_dictionary(parent_id) else {
            break;
        };
        for key in INHERITABLE {
            if !page.has(key)
                && let Ok(value) = node.get(key)
            {
                page.set(key, value.clone());
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    Some(page)
}

fn merge_error(context: &str, e: impl std::fmt::Display) -> TaxsortError {
    TaxsortError::Merge(format!("{context}: {e}"))
}

impl PageSource for LopdfPageSource {
    type Pages = Document;

    fn read_pages(&self, path: &Path) -> Result<Document, TaxsortError> {
        let doc = Document::load(path)
            .map_err(|e| merge_error(&format!("cannot read {}", path.display()), e))?;
        if doc.get_pages().is_empty() {
            return Err(TaxsortError::Merge(format!(
                "{} has no pages",
                path.display()
            )));
        }
        Ok(doc)
    }

    fn page_count(&self, pages: &Document) -> usize {
        pages.get_pages().len()
    }

    fn write_pages(&self, parts: Vec<Document>, output: &Path) -> Result<usize, TaxsortError> {
        let mut merged = Document::with_version("1.5");
        let mut max_id = 1;
        let mut pages: Vec<(ObjectId, Dictionary)> = Vec::new();
        let mut catalog: Option<(ObjectId, Dictionary)> = None;
        let mut tree_root: Option<(ObjectId, Dictionary)> = None;

        for mut doc in parts {
            doc.renumber_objects_with(max_id);
            max_id = doc.max_id + 1;

            for page_id in doc.get_pages().into_values() {
                if let Some(page) = flattened_page(&doc, page_id) {
                    pages.push((page_id, page));
                }
            }

            for (id, object) in doc.objects {
                match type_name(&object) {
                    Some(b"Catalog") => {
                        if catalog.is_none()
                            && let Ok(dict) = object.as_dict()
                        {
                            catalog = Some((id, dict.clone()));
                        }
                    }
                    Some(b"Pages") => {
                        if tree_root.is_none()
                            && let Ok(dict) = object.as_dict()
                        {
                            tree_root = Some((id, dict.clone()));
                        }
                    }
                    Some(b"Page" | b"Outlines" | b"Outline") => {}
                    _ => {
                        merged.objects.insert(id, object);
                    }
                }
            }
        }

        let (catalog_id, mut catalog) =
            catalog.ok_or_else(|| TaxsortError::Merge("no document catalog in input".into()))?;
        let (root_id, mut root) =
            tree_root.ok_or_else(|| TaxsortError::Merge("no page tree in input".into()))?;

        let total = pages.len();
        let mut kids = Vec::with_capacity(total);
        for (page_id, mut page) in pages {
            page.set("Parent", Object::Reference(root_id));
            merged.objects.insert(page_id, Object::Dictionary(page));
            kids.push(Object::Reference(page_id));
        }

        root.remove(b"Parent");
        root.set("Kids", Object::Array(kids));
        root.set("Count", Object::Integer(total as i64));
        merged.objects.insert(root_id, Object::Dictionary(root));

        catalog.set("Pages", Object::Reference(root_id));
        catalog.remove(b"Outlines");
        merged.objects.insert(catalog_id, Object::Dictionary(catalog));

        merged.trailer.set("Root", Object::Reference(catalog_id));
        merged.max_id = merged.objects.keys().map(|(id, _)| *id).max().unwrap_or(0);
        merged.renumber_objects();
        merged.adjust_zero_pages();
        merged.compress();
        merged
            .save(output)
            .map_err(|e| merge_error(&format!("cannot write {}", output.display()), e))?;

        debug!(path = %output.display(), pages = total, "wrote merged document");
        Ok(total)
    }
}
