//! Application state management

use std::sync::Arc;

use tokio::time::Duration;

use crate::config::Config;
use crate::engine::{EnginePool, RecognitionEngine};
use crate::ocr::{OcrError, OcrService, RecognitionSettings};
use crate::staging::TempStager;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    pub config: Config,
    pub ocr: OcrService,
}

impl AppState {
    /// Create the application state over already started engines
    ///
    /// The engines are handed to the pool; from here on nothing but the
    /// OCR service touches them.
    pub fn new(config: Config, engines: Vec<Box<dyn RecognitionEngine>>) -> Self {
        let pool = Arc::new(EnginePool::new(engines));
        let stager = Arc::new(TempStager::new(
            config.staging.tmp_dir.clone(),
            config.staging.prefix.clone(),
        ));
        let ocr = OcrService::new(
            pool,
            stager,
            RecognitionSettings::from(&config.engine),
            Duration::from_secs(config.engine.call_timeout_secs),
        );

        Self {
            inner: Arc::new(AppStateInner { config, ocr }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the OCR service
    pub fn ocr(&self) -> &OcrService {
        &self.inner.ocr
    }

    /// Release the engine handles
    ///
    /// This should be called before the process exits so every engine
    /// session is quit and freed exactly once.
    pub async fn shutdown(&self) -> Result<(), OcrError> {
        tracing::info!("Shutting down application state...");
        let released = self.inner.ocr.shutdown().await?;
        tracing::info!(handles = released, "Engine handles released");
        Ok(())
    }
}
