// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Minimal PDF fixtures.

use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};

use taxsort_core::{CategoryId, TaxsortError};

fn fixture_error(e: impl std::fmt::Display) -> TaxsortError {
    TaxsortError::Internal(format!("pdf fixture: {e}"))
}

/// Writes a PDF with one page per label, each page showing its label.
pub fn write_pdf(path: &Path, labels: &[&str]) -> Result<(), TaxsortError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::with_capacity(labels.len());
    for label in labels {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*label)]),
                Operation::new("ET", vec![]),
            ],
        };
        let stream = Stream::new(dictionary! {}, content.encode().map_err(fixture_error)?);
        let content_id = doc.add_object(stream);
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).map_err(fixture_error)?;
    Ok(())
}

/// Writes `page_001.pdf` .. `page_020.pdf` into `dir`, one page each.
pub fn write_header_pages(dir: &Path) -> Result<(), TaxsortError> {
    std::fs::create_dir_all(dir).map_err(fixture_error)?;
    for category in CategoryId::all() {
        let label = format!("Kategorie {category}");
        write_pdf(
            &dir.join(format!("page_{:03}.pdf", category.get())),
            &[&label],
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_pdf_has_one_page_per_label() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        write_pdf(&path, &["eins", "zwei"]).unwrap();
        let doc = Document::load(&path).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
        assert!(doc.extract_text(&[2]).unwrap().contains("zwei"));
    }

    #[test]
    fn header_pages_cover_every_category() {
        let dir = tempfile::tempdir().unwrap();
        write_header_pages(dir.path()).unwrap();
        assert!(dir.path().join("page_001.pdf").exists());
        assert!(dir.path().join("page_020.pdf").exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 20);
    }
}
