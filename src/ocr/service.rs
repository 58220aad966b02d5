//! OCR Service
//!
//! Runs the orchestrators on blocking workers. Each call leases one engine
//! handle for its whole duration, so the language, template and zone state
//! it sets up cannot leak into another request.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::{timeout, Duration};

use super::{
    pages::recognize_document,
    types::{OcrError, RecognitionSettings},
    zones::recognize_zones,
};
use crate::engine::{PoolStats, RecognitionEngine, SharedEnginePool, ZoneMap};
use crate::staging::TempStager;

/// OCR service shared by all request handlers
pub struct OcrService {
    pool: SharedEnginePool,
    stager: Arc<TempStager>,
    settings: RecognitionSettings,
    /// Note: a timed-out engine call keeps its blocking thread (and its
    /// lease) until the engine returns; only the request is released.
    /// Calls still queued for a lease when they time out never run.
    call_timeout: Duration,
}

impl OcrService {
    pub fn new(
        pool: SharedEnginePool,
        stager: Arc<TempStager>,
        settings: RecognitionSettings,
        call_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            stager,
            settings,
            call_timeout,
        }
    }

    pub fn stager(&self) -> &TempStager {
        &self.stager
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Release every engine handle; later OCR calls fail
    pub async fn shutdown(&self) -> Result<usize, OcrError> {
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || pool.shutdown())
            .await
            .map_err(|e| OcrError::Worker(e.to_string()))
    }

    /// Plain OCR of every page of `image`
    pub async fn recognize_text(&self, image: &Path, language: Option<&str>) -> Result<String, OcrError> {
        let settings = self.settings.with_language(language);
        let stager = Arc::clone(&self.stager);
        let image = image.to_path_buf();

        self.with_engine(move |engine| {
            settings.apply(engine)?;
            recognize_document(engine, &stager, &image)
        })
        .await
    }

    /// Template-guided zone OCR
    pub async fn recognize_zones(&self, template: &Path, image: &Path) -> Result<ZoneMap, OcrError> {
        let template: PathBuf = template.to_path_buf();
        let image: PathBuf = image.to_path_buf();

        self.with_engine(move |engine| recognize_zones(engine, &template, &image))
            .await
    }

    /// Lease an engine on a blocking worker and run `f` with a timeout
    async fn with_engine<T, F>(&self, f: F) -> Result<T, OcrError>
    where
        F: FnOnce(&mut dyn RecognitionEngine) -> Result<T, OcrError> + Send + 'static,
        T: Send + 'static,
    {
        let pool = Arc::clone(&self.pool);
        let secs = self.call_timeout.as_secs();
        let abandoned = Arc::new(AtomicBool::new(false));
        let worker_abandoned = Arc::clone(&abandoned);

        let result = timeout(
            self.call_timeout,
            tokio::task::spawn_blocking(move || {
                let mut engine = pool.acquire()?;
                if worker_abandoned.load(Ordering::Acquire) {
                    tracing::debug!("Skipping OCR call abandoned while waiting for an engine");
                    return Err(OcrError::Timeout(secs));
                }
                f(&mut *engine)
            }),
        )
        .await;

        match result {
            Ok(join_result) => join_result.map_err(|e| OcrError::Worker(e.to_string()))?,
            Err(_) => {
                abandoned.store(true, Ordering::Release);
                tracing::error!(timeout_secs = secs, "OCR call timed out");
                Err(OcrError::Timeout(secs))
            }
        }
    }
}
