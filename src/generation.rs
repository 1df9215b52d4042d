//! Driving `Generate` through a bounded output buffer.

use std::ffi::c_char;
use std::fmt;

use tracing::{debug, warn};

use crate::context::ContextHandle;
use crate::error::{BindingError, Result};
use crate::ffi::SymbolSet;
use crate::marshal;

/// Text produced by one `Generate` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    text: String,
    written: usize,
    capacity: usize,
}

impl GenerationResult {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Capacity of the buffer the engine wrote into.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True when the engine filled the buffer, so its output may have been
    /// cut short.
    pub fn possibly_truncated(&self) -> bool {
        self.written + 1 >= self.capacity
    }
}

impl fmt::Display for GenerationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl AsRef<str> for GenerationResult {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

impl PartialEq<&str> for GenerationResult {
    fn eq(&self, other: &&str) -> bool {
        self.text == *other
    }
}

impl From<GenerationResult> for String {
    fn from(result: GenerationResult) -> Self {
        result.text
    }
}

/// Run one generation into a buffer of exactly `max_length` bytes.
///
/// The engine is told the buffer holds `max_length` bytes and nothing more.
/// On failure nothing it may have written is returned.
pub(crate) fn generate(
    symbols: &SymbolSet,
    handle: &ContextHandle,
    prompt: &str,
    max_length: usize,
) -> Result<GenerationResult> {
    let generate = symbols.generate()?;
    let size = marshal::buffer_size(max_length)?;
    let prompt_c = marshal::c_string("prompt", prompt)?;
    let mut buffer = vec![0u8; max_length];

    debug!(handle = ?handle, prompt_len = prompt.len(), max_length, "calling Generate");
    // SAFETY: `generate` was resolved with the `Generate` signature. `buffer`
    // is `size` bytes long and stays alive and exclusively borrowed for the
    // duration of the call.
    let ok = unsafe {
        generate(
            handle.as_ptr(),
            prompt_c.as_ptr(),
            buffer.as_mut_ptr().cast::<c_char>(),
            size,
        )
    };
    if !ok {
        warn!(handle = ?handle, "native generation reported failure");
        return Err(BindingError::GenerationFailed);
    }

    let (text, written) = marshal::decode_output(&buffer)?;
    debug!(handle = ?handle, output_len = text.len(), "generation finished");
    Ok(GenerationResult {
        text,
        written,
        capacity: max_length,
    })
}
