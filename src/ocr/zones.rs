//! Template zone OCR

use std::path::Path;

use super::types::OcrError;
use crate::engine::{RecognitionEngine, ZoneMap};

/// Load `template` into the engine, then extract its zones from `image`
///
/// Extraction is never attempted when the template fails to load. The zone
/// map is returned as the engine reported it, empty texts included.
pub fn recognize_zones(
    engine: &mut dyn RecognitionEngine,
    template: &Path,
    image: &Path,
) -> Result<ZoneMap, OcrError> {
    engine.load_template(template).map_err(|e| {
        tracing::error!(template = %template.display(), error = %e, "Template load failed");
        e
    })?;

    let zones = engine.ocr_with_template(image).map_err(|e| {
        tracing::error!(image = %image.display(), error = %e, "Template OCR failed");
        e
    })?;

    tracing::info!(engine = engine.name(), zones = zones.len(), "Zones recognized");
    Ok(zones)
}
