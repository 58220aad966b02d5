//! Scripted engine for tests
//!
//! Behaves like a real session: language and template are sticky state,
//! page text is written to the requested output file and the aux directory
//! is created the way the real engine does.

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::{EngineError, RecognitionEngine, ZoneMap};

pub struct ScriptedEngine {
    pages: Vec<String>,
    zones: ZoneMap,
    failing: Option<(&'static str, String)>,
    failing_page: Option<(usize, String)>,
    echo_language: bool,
    delay: Duration,
    language: String,
    template: Option<PathBuf>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedEngine {
    pub fn with_pages(pages: &[&str]) -> Self {
        Self {
            pages: pages.iter().map(|p| p.to_string()).collect(),
            zones: ZoneMap::new(),
            failing: None,
            failing_page: None,
            echo_language: false,
            delay: Duration::ZERO,
            language: String::new(),
            template: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_zones(zones: &[(&str, &str)]) -> Self {
        let mut engine = Self::with_pages(&[]);
        engine.zones = zones
            .iter()
            .map(|(name, text)| (name.to_string(), text.to_string()))
            .collect();
        engine
    }

    /// Fail every call to `operation` with `message`
    pub fn failing(mut self, operation: &'static str, message: &str) -> Self {
        self.failing = Some((operation, message.to_string()));
        self
    }

    /// Fail only the OCR of `page`, after leaving scratch output behind
    pub fn failing_page(mut self, page: usize, message: &str) -> Self {
        self.failing_page = Some((page, message.to_string()));
        self
    }

    /// Prefix each page with the session language, e.g. `[en] text`
    pub fn echo_language(mut self) -> Self {
        self.echo_language = true;
        self
    }

    /// Sleep inside every page/zone call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Log of calls, shared with the engine after it moves into a pool
    pub fn calls(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.calls)
    }

    fn record(&self, operation: &'static str, detail: impl std::fmt::Display) -> Result<(), EngineError> {
        self.calls.lock().push(format!("{operation} {detail}").trim_end().to_string());
        match &self.failing {
            Some((failing, message)) if *failing == operation => {
                Err(EngineError::new(operation, message.clone()))
            }
            _ => Ok(()),
        }
    }
}

impl RecognitionEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn set_language(&mut self, code: &str) -> Result<(), EngineError> {
        self.record("set_language", code)?;
        self.language = code.to_string();
        Ok(())
    }

    fn set_code_page(&mut self, name: &str) -> Result<(), EngineError> {
        self.record("set_code_page", name)
    }

    fn count_pages(&mut self, _image: &Path) -> Result<usize, EngineError> {
        self.record("count_pages", "")?;
        Ok(self.pages.len())
    }

    fn ocr_page_to_file(
        &mut self,
        _image: &Path,
        output: &Path,
        page: usize,
        aux_dir: &Path,
    ) -> Result<(), EngineError> {
        self.record("ocr_page_to_file", page)?;
        std::thread::sleep(self.delay);

        std::fs::create_dir_all(aux_dir)
            .map_err(|e| EngineError::new("ocr_page_to_file", e.to_string()))?;

        if let Some((failing, message)) = &self.failing_page {
            if *failing == page {
                std::fs::write(output, "partial")
                    .map_err(|e| EngineError::new("ocr_page_to_file", e.to_string()))?;
                return Err(EngineError::new("ocr_page_to_file", message.clone()));
            }
        }

        let text = self
            .pages
            .get(page)
            .ok_or_else(|| EngineError::new("ocr_page_to_file", format!("no page {page}")))?;
        let text = if self.echo_language {
            format!("[{}] {}", self.language, text)
        } else {
            text.clone()
        };

        std::fs::write(output, text).map_err(|e| EngineError::new("ocr_page_to_file", e.to_string()))
    }

    fn load_template(&mut self, template: &Path) -> Result<(), EngineError> {
        // Readable templates are logged by content so tests can tell parts apart.
        let content = std::fs::read_to_string(template).unwrap_or_default();
        self.record("load_template", content.trim())?;
        self.template = Some(template.to_path_buf());
        Ok(())
    }

    fn ocr_with_template(&mut self, _image: &Path) -> Result<ZoneMap, EngineError> {
        self.record("ocr_with_template", "")?;
        std::thread::sleep(self.delay);

        if self.template.is_none() {
            return Err(EngineError::new("ocr_with_template", "no template loaded"));
        }
        Ok(self.zones.clone())
    }

    fn release(&mut self) {
        self.calls.lock().push("release".to_string());
    }
}
