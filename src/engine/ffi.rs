//! Native OmniPage binding
//!
//! Talks to the OmniPage CSDK through the `nuancec` C shim. Every fallible
//! shim call takes a caller-owned error buffer and returns a non-zero status
//! on failure; [`ErrorBuffer::check`] turns that pair into an [`EngineError`]
//! so nothing above this file ever sees a raw status code.

use std::ffi::{c_void, CString};
use std::os::raw::{c_char, c_int};
use std::path::Path;

use super::buffer::{text_from_buffer, ErrorBuffer, ZONE_FIELD_LEN};
use super::{EngineError, RecognitionEngine, ZoneMap};
use crate::config::EngineConfig;

#[allow(non_snake_case)]
extern "C" {
    fn nuanceNew() -> *mut c_void;
    fn nuanceFree(ptr: *mut c_void);
    fn nuanceQuit(ptr: *mut c_void);

    fn nuanceInit(
        ptr: *mut c_void,
        company: *const c_char,
        product: *const c_char,
        err: *mut c_char,
        err_len: c_int,
    ) -> c_int;

    fn nuanceSetLicense(
        ptr: *mut c_void,
        license_file: *const c_char,
        oem_code: *const c_char,
        err: *mut c_char,
        err_len: c_int,
    ) -> c_int;

    fn nuanceSetLanguage(
        ptr: *mut c_void,
        language: *const c_char,
        err: *mut c_char,
        err_len: c_int,
    ) -> c_int;

    fn nuanceSetCodePage(
        ptr: *mut c_void,
        code_page: *const c_char,
        err: *mut c_char,
        err_len: c_int,
    ) -> c_int;

    fn nuanceCountPages(
        ptr: *mut c_void,
        img_file: *const c_char,
        n_pages: *mut c_int,
        err: *mut c_char,
        err_len: c_int,
    ) -> c_int;

    fn nuanceOCRImgToFile(
        ptr: *mut c_void,
        img_file: *const c_char,
        output_file: *const c_char,
        n_page: c_int,
        aux_dir: *const c_char,
        err: *mut c_char,
        err_len: c_int,
    ) -> c_int;

    fn nuanceLoadFormTemplateLibrary(
        ptr: *mut c_void,
        template_file: *const c_char,
        err: *mut c_char,
        err_len: c_int,
    ) -> c_int;

    fn nuancePreprocessImgWithTemplate(
        ptr: *mut c_void,
        img_file: *const c_char,
        err: *mut c_char,
        err_len: c_int,
    ) -> c_int;

    fn nuanceGetZoneCount(ptr: *mut c_void) -> c_int;

    fn nuanceGetZoneData(
        ptr: *mut c_void,
        index: c_int,
        name: *mut c_char,
        name_len: c_int,
        text: *mut c_char,
        text_len: c_int,
    );

    fn nuanceFreeImgWithTemplate(ptr: *mut c_void);
}

/// One initialized OmniPage session
pub struct OmniPage {
    handle: *mut c_void,
}

// SAFETY: OmniPage is Send because:
//
// 1. The handle is an opaque pointer owned exclusively by this value; it is
//    never copied out or shared with another OmniPage.
//
// 2. All methods that touch the handle take `&mut self`, so the borrow
//    checker guarantees a single caller per call.
//
// 3. The only cross-thread movement happens through EnginePool, which keeps
//    each handle behind its own mutex and leases it to one worker at a time.
//
// OmniPage is deliberately NOT Sync: the CSDK keeps per-session state
// (language, template, zone buffers) that must never be touched by two
// threads at once.
unsafe impl Send for OmniPage {}

impl OmniPage {
    /// Create a session, initialize it and activate the license
    ///
    /// Any failure here is fatal for the process; the partially built handle
    /// is released before returning.
    pub fn start(config: &EngineConfig) -> Result<Self, EngineError> {
        // SAFETY: nuanceNew has no preconditions.
        let handle = unsafe { nuanceNew() };
        if handle.is_null() {
            return Err(EngineError::new("new", "engine returned a null handle"));
        }

        let mut engine = Self { handle };
        engine.initialize(&config.company, &config.product)?;
        engine.activate_license(&config.license_file, &config.oem_code)?;

        tracing::info!(
            company = %config.company,
            product = %config.product,
            "OmniPage engine initialized"
        );

        Ok(engine)
    }

    /// Initialize the engine for the given company and product
    pub fn initialize(&mut self, company: &str, product: &str) -> Result<(), EngineError> {
        let company = c_string("initialize", company)?;
        let product = c_string("initialize", product)?;
        let handle = self.live_handle("initialize")?;
        let mut err = ErrorBuffer::new();

        // SAFETY: handle is live, strings outlive the call, err holds
        // err.capacity() writable bytes.
        let status = unsafe {
            nuanceInit(
                handle,
                company.as_ptr(),
                product.as_ptr(),
                err.as_mut_ptr().cast(),
                err.capacity() as c_int,
            )
        };
        err.check("initialize", status)
    }

    /// Activate the OEM license
    pub fn activate_license(&mut self, license_file: &str, oem_code: &str) -> Result<(), EngineError> {
        let license_file = c_string("activate_license", license_file)?;
        let oem_code = c_string("activate_license", oem_code)?;
        let handle = self.live_handle("activate_license")?;
        let mut err = ErrorBuffer::new();

        // SAFETY: see initialize.
        let status = unsafe {
            nuanceSetLicense(
                handle,
                license_file.as_ptr(),
                oem_code.as_ptr(),
                err.as_mut_ptr().cast(),
                err.capacity() as c_int,
            )
        };
        err.check("activate_license", status)
    }

    fn live_handle(&self, operation: &'static str) -> Result<*mut c_void, EngineError> {
        if self.handle.is_null() {
            Err(EngineError::new(operation, "engine handle already released"))
        } else {
            Ok(self.handle)
        }
    }
}

impl RecognitionEngine for OmniPage {
    fn name(&self) -> &'static str {
        "omnipage"
    }

    fn set_language(&mut self, code: &str) -> Result<(), EngineError> {
        let code = c_string("set_language", code)?;
        let handle = self.live_handle("set_language")?;
        let mut err = ErrorBuffer::new();

        // SAFETY: see OmniPage::initialize.
        let status = unsafe {
            nuanceSetLanguage(handle, code.as_ptr(), err.as_mut_ptr().cast(), err.capacity() as c_int)
        };
        err.check("set_language", status)
    }

    fn set_code_page(&mut self, name: &str) -> Result<(), EngineError> {
        let name = c_string("set_code_page", name)?;
        let handle = self.live_handle("set_code_page")?;
        let mut err = ErrorBuffer::new();

        // SAFETY: see OmniPage::initialize.
        let status = unsafe {
            nuanceSetCodePage(handle, name.as_ptr(), err.as_mut_ptr().cast(), err.capacity() as c_int)
        };
        err.check("set_code_page", status)
    }

    fn count_pages(&mut self, image: &Path) -> Result<usize, EngineError> {
        let image = c_path("count_pages", image)?;
        let handle = self.live_handle("count_pages")?;
        let mut err = ErrorBuffer::new();
        let mut pages: c_int = 0;

        // SAFETY: see OmniPage::initialize; `pages` is a valid out pointer.
        let status = unsafe {
            nuanceCountPages(
                handle,
                image.as_ptr(),
                &mut pages,
                err.as_mut_ptr().cast(),
                err.capacity() as c_int,
            )
        };
        err.check("count_pages", status)?;

        usize::try_from(pages)
            .map_err(|_| EngineError::new("count_pages", format!("negative page count {pages}")))
    }

    fn ocr_page_to_file(
        &mut self,
        image: &Path,
        output: &Path,
        page: usize,
        aux_dir: &Path,
    ) -> Result<(), EngineError> {
        let image = c_path("ocr_page_to_file", image)?;
        let output = c_path("ocr_page_to_file", output)?;
        let aux_dir = c_path("ocr_page_to_file", aux_dir)?;
        let page = c_int::try_from(page)
            .map_err(|_| EngineError::new("ocr_page_to_file", format!("page index {page} out of range")))?;
        let handle = self.live_handle("ocr_page_to_file")?;
        let mut err = ErrorBuffer::new();

        // SAFETY: see OmniPage::initialize.
        let status = unsafe {
            nuanceOCRImgToFile(
                handle,
                image.as_ptr(),
                output.as_ptr(),
                page,
                aux_dir.as_ptr(),
                err.as_mut_ptr().cast(),
                err.capacity() as c_int,
            )
        };
        err.check("ocr_page_to_file", status)
    }

    fn load_template(&mut self, template: &Path) -> Result<(), EngineError> {
        let template = c_path("load_template", template)?;
        let handle = self.live_handle("load_template")?;
        let mut err = ErrorBuffer::new();

        // SAFETY: see OmniPage::initialize.
        let status = unsafe {
            nuanceLoadFormTemplateLibrary(
                handle,
                template.as_ptr(),
                err.as_mut_ptr().cast(),
                err.capacity() as c_int,
            )
        };
        err.check("load_template", status)
    }

    fn ocr_with_template(&mut self, image: &Path) -> Result<ZoneMap, EngineError> {
        let image = c_path("ocr_with_template", image)?;
        let handle = self.live_handle("ocr_with_template")?;
        let mut err = ErrorBuffer::new();

        // SAFETY: see OmniPage::initialize.
        let status = unsafe {
            nuancePreprocessImgWithTemplate(
                handle,
                image.as_ptr(),
                err.as_mut_ptr().cast(),
                err.capacity() as c_int,
            )
        };
        err.check("ocr_with_template", status)?;

        // SAFETY: the image was preprocessed successfully above.
        let zone_count = unsafe { nuanceGetZoneCount(handle) }.max(0);
        tracing::debug!(zones = zone_count, "Template preprocessing complete");

        let mut zones = ZoneMap::with_capacity(usize::try_from(zone_count).unwrap_or_default());
        for index in 0..zone_count {
            let mut name = [0u8; ZONE_FIELD_LEN];
            let mut text = [0u8; ZONE_FIELD_LEN];

            // SAFETY: index < zone_count and both buffers hold ZONE_FIELD_LEN
            // writable bytes.
            unsafe {
                nuanceGetZoneData(
                    handle,
                    index,
                    name.as_mut_ptr().cast(),
                    ZONE_FIELD_LEN as c_int,
                    text.as_mut_ptr().cast(),
                    ZONE_FIELD_LEN as c_int,
                );
            }

            zones.insert(text_from_buffer(&name), text_from_buffer(&text));
        }

        // SAFETY: releases the per-call zone state allocated by preprocessing.
        unsafe { nuanceFreeImgWithTemplate(handle) };

        Ok(zones)
    }

    fn release(&mut self) {
        if self.handle.is_null() {
            return;
        }

        // SAFETY: handle is live and is nulled right after, so quit/free run
        // exactly once.
        unsafe {
            nuanceQuit(self.handle);
            nuanceFree(self.handle);
        }
        self.handle = std::ptr::null_mut();

        tracing::info!("OmniPage engine released");
    }
}

impl Drop for OmniPage {
    fn drop(&mut self) {
        self.release();
    }
}

fn c_string(operation: &'static str, value: &str) -> Result<CString, EngineError> {
    CString::new(value)
        .map_err(|_| EngineError::new(operation, format!("argument contains a NUL byte: {value:?}")))
}

fn c_path(operation: &'static str, path: &Path) -> Result<CString, EngineError> {
    let value = path
        .to_str()
        .ok_or_else(|| EngineError::new(operation, format!("path is not valid UTF-8: {}", path.display())))?;
    c_string(operation, value)
}
