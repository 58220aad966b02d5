//! Recognition Engine Binding
//!
//! Wraps the OmniPage recognition engine behind a narrow, synchronous
//! contract. The engine is a stateful, page-oriented session: language,
//! code page and the loaded form template all live inside the handle and
//! apply to every call that follows.
//!
//! # Thread Safety
//!
//! An engine handle is **NOT safe for concurrent use**. Callers never touch a
//! handle directly; they lease one from an [`EnginePool`], which hands out
//! each handle to exactly one caller at a time:
//!
//! 1. **Pool size 1**: every OCR operation in the process is serialized
//! 2. **Pool size N**: up to N independent sessions run side by side
//!
//! # Usage
//!
//! ```rust,ignore
//! use omnipage_server::engine::{EnginePool, OmniPage};
//!
//! let engine = OmniPage::start(&config.engine)?;
//! let pool = EnginePool::new(vec![Box::new(engine)]);
//!
//! let pages = pool.acquire()?.count_pages(Path::new("/tmp/scan.tif"))?;
//! ```

mod buffer;
#[cfg(feature = "omnipage")]
mod ffi;
#[cfg(test)]
pub(crate) mod mock;
mod pool;

use std::collections::HashMap;
use std::path::Path;

pub use buffer::{ErrorBuffer, ERROR_BUFFER_LEN, ZONE_FIELD_LEN};
#[cfg(feature = "omnipage")]
pub use ffi::OmniPage;
pub use pool::{EngineLease, EnginePool, PoolStats, SharedEnginePool};

/// Zone name to recognized text, as reported by template OCR
pub type ZoneMap = HashMap<String, String>;

/// Failure reported by the recognition engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation} failed: {message}")]
pub struct EngineError {
    /// Binding operation that failed (e.g. `count_pages`)
    pub operation: &'static str,
    /// Message text filled in by the engine
    pub message: String,
}

impl EngineError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Synchronous contract of one recognition engine session
///
/// Every method blocks until the engine returns. Implementations are moved
/// between worker threads but are only ever used by one thread at a time.
pub trait RecognitionEngine: Send {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    /// Set the recognition language for all following page operations
    fn set_language(&mut self, code: &str) -> Result<(), EngineError>;

    /// Set the output code page for all following page operations
    fn set_code_page(&mut self, name: &str) -> Result<(), EngineError>;

    /// Number of pages in the image file (multi-image containers report > 1)
    fn count_pages(&mut self, image: &Path) -> Result<usize, EngineError>;

    /// Recognize one 0-indexed page and write its plain text to `output`
    ///
    /// `aux_dir` is engine scratch space; the caller removes it afterwards.
    fn ocr_page_to_file(
        &mut self,
        image: &Path,
        output: &Path,
        page: usize,
        aux_dir: &Path,
    ) -> Result<(), EngineError>;

    /// Load a form template library, replacing the previous one
    fn load_template(&mut self, template: &Path) -> Result<(), EngineError>;

    /// Run template-guided OCR against the currently loaded template
    fn ocr_with_template(&mut self, image: &Path) -> Result<ZoneMap, EngineError>;

    /// Release the session. Irreversible; later calls fail.
    fn release(&mut self);
}
