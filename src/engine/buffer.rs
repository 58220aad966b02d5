//! Fixed-capacity buffers shared with the engine
//!
//! The engine reports failures by filling a caller-provided byte buffer and
//! returns zone names and texts the same way. These helpers turn such
//! buffers back into owned Rust strings.

use super::EngineError;

/// Capacity of the error message buffer passed to every fallible call
pub const ERROR_BUFFER_LEN: usize = 1024;

/// Capacity of each zone name and zone text buffer
pub const ZONE_FIELD_LEN: usize = 256;

/// Error message buffer filled by the engine on failure
pub struct ErrorBuffer {
    bytes: [u8; ERROR_BUFFER_LEN],
}

impl ErrorBuffer {
    pub fn new() -> Self {
        Self {
            bytes: [0; ERROR_BUFFER_LEN],
        }
    }

    /// Pointer/length pair for the foreign call
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.bytes.as_mut_ptr()
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Message written by the engine, or a placeholder if it wrote nothing
    pub fn message(&self) -> String {
        let message = text_from_buffer(&self.bytes);
        let message = message.trim();
        if message.is_empty() {
            "unknown engine error".to_string()
        } else {
            message.to_string()
        }
    }

    /// Translate a status code into a structured result
    pub fn check(&self, operation: &'static str, status: i32) -> Result<(), EngineError> {
        if status == 0 {
            Ok(())
        } else {
            Err(EngineError::new(operation, self.message()))
        }
    }
}

impl Default for ErrorBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a NUL-terminated buffer; text after the first NUL is ignored
///
/// Whitespace is kept: zone names and texts are returned as the engine wrote them.
pub fn text_from_buffer(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
