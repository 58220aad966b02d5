//! OCR Module
//!
//! Orchestrates the recognition engine for the two request shapes the
//! service accepts:
//!
//! - Plain OCR: every page of an image, joined into one document text
//! - Template OCR: named zones of a form, extracted with a template library
//!
//! ## Usage
//!
//! ```rust,ignore
//! use omnipage_server::ocr::{OcrService, RecognitionSettings};
//!
//! let service = OcrService::new(pool, stager, RecognitionSettings::default(), timeout);
//!
//! let text = service.recognize_text(image.path(), None).await?;
//! let zones = service.recognize_zones(template.path(), image.path()).await?;
//! ```

mod pages;
mod service;
mod types;
mod zones;

pub use pages::{join_pages, recognize_document, PAGE_SEPARATOR};
pub use service::OcrService;
pub use types::{OcrError, RecognitionSettings};
pub use zones::recognize_zones;
