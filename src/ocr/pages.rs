//! Multi-page OCR
//!
//! Drives the engine page by page: count, recognize each page into a
//! scratch file, read it back, join. A failing page aborts the whole
//! document; partial text is never returned.

use std::path::Path;

use super::types::OcrError;
use crate::engine::RecognitionEngine;
use crate::staging::{StorageError, TempStager};

/// Separator between consecutive pages of a document (form feed)
pub const PAGE_SEPARATOR: char = '\u{000C}';

/// Recognize every page of `image` and join them in page order
pub fn recognize_document(
    engine: &mut dyn RecognitionEngine,
    stager: &TempStager,
    image: &Path,
) -> Result<String, OcrError> {
    let page_count = engine.count_pages(image)?;
    tracing::debug!(path = %image.display(), pages = page_count, "Counted pages");

    let mut pages = Vec::with_capacity(page_count);
    for page in 0..page_count {
        pages.push(recognize_page(engine, stager, image, page)?);
    }

    tracing::info!(
        engine = engine.name(),
        pages = page_count,
        chars = pages.iter().map(String::len).sum::<usize>(),
        "Document recognized"
    );

    Ok(join_pages(&pages))
}

fn recognize_page(
    engine: &mut dyn RecognitionEngine,
    stager: &TempStager,
    image: &Path,
    page: usize,
) -> Result<String, OcrError> {
    let scratch = stager.scratch_page();

    engine.ocr_page_to_file(image, scratch.output(), page, scratch.aux_dir())?;

    let raw = std::fs::read(scratch.output()).map_err(StorageError::read(scratch.output()))?;
    tracing::debug!(page, bytes = raw.len(), "Page recognized");

    Ok(String::from_utf8_lossy(&raw).into_owned())
}

/// Join page texts with exactly one separator between consecutive pages
pub fn join_pages<S: AsRef<str>>(pages: &[S]) -> String {
    let mut text = String::new();
    for (index, page) in pages.iter().enumerate() {
        if index > 0 {
            text.push(PAGE_SEPARATOR);
        }
        text.push_str(page.as_ref());
    }
    text
}
