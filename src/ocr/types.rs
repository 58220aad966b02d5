//! OCR Types

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::engine::{EngineError, RecognitionEngine};
use crate::staging::StorageError;

/// Session settings applied before plain-text OCR
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionSettings {
    /// Recognition language code
    pub language: String,
    /// Code page of the text the engine writes
    pub code_page: String,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            language: "pt-BR".to_string(),
            code_page: "UTF-8".to_string(),
        }
    }
}

impl From<&EngineConfig> for RecognitionSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            language: config.language.clone(),
            code_page: config.code_page.clone(),
        }
    }
}

impl RecognitionSettings {
    /// Same settings with a different language, if one is given
    pub fn with_language(&self, language: Option<&str>) -> Self {
        match language {
            Some(language) => Self {
                language: language.to_string(),
                code_page: self.code_page.clone(),
            },
            None => self.clone(),
        }
    }

    /// Push the settings into the engine session
    pub fn apply(&self, engine: &mut dyn RecognitionEngine) -> Result<(), EngineError> {
        engine.set_language(&self.language)?;
        engine.set_code_page(&self.code_page)
    }
}

/// OCR error types
#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("OCR timed out after {0} seconds")]
    Timeout(u64),

    #[error("OCR worker failed: {0}")]
    Worker(String),
}
