//! Conversions between Rust values and the engine's C argument types.
//!
//! Text crosses the boundary as NUL-terminated UTF-8. Output buffers are read
//! up to the first NUL; the engine writes at most `size - 1` bytes and then a
//! terminator.

use std::ffi::{CString, c_int};
use std::path::Path;

use crate::error::{BindingError, Result};

pub(crate) fn c_string(name: &'static str, value: &str) -> Result<CString> {
    CString::new(value).map_err(|err| {
        BindingError::invalid_argument(
            name,
            format!("contains a NUL byte at offset {}", err.nul_position()),
        )
    })
}

pub(crate) fn c_path(name: &'static str, path: &Path) -> Result<CString> {
    let value = path
        .to_str()
        .ok_or_else(|| BindingError::invalid_argument(name, "path is not valid UTF-8"))?;
    c_string(name, value)
}

/// A strictly positive count that must fit in a C `int`.
pub(crate) fn positive(name: &'static str, value: u32) -> Result<c_int> {
    if value == 0 {
        return Err(BindingError::invalid_argument(name, "must be greater than zero"));
    }
    c_int::try_from(value)
        .map_err(|_| BindingError::invalid_argument(name, format!("{value} exceeds i32::MAX")))
}

/// Output buffer capacity, as allocated (bytes) and as told to the engine.
pub(crate) fn buffer_size(max_length: usize) -> Result<c_int> {
    if max_length == 0 {
        return Err(BindingError::invalid_argument(
            "max_length",
            "must be greater than zero",
        ));
    }
    c_int::try_from(max_length).map_err(|_| {
        BindingError::invalid_argument("max_length", format!("{max_length} exceeds i32::MAX"))
    })
}

/// Decode an output buffer the engine reported as filled.
///
/// Returns the text and the number of bytes the engine wrote before the
/// terminator. A multi-byte character cut off by the engine's truncation is
/// dropped; any other invalid UTF-8 is an error.
pub(crate) fn decode_output(buffer: &[u8]) -> Result<(String, usize)> {
    let written = buffer
        .iter()
        .position(|&byte| byte == 0)
        .unwrap_or(buffer.len());
    let bytes = &buffer[..written];

    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) if err.error_len().is_none() => {
            let valid_up_to = err.valid_up_to();
            std::str::from_utf8(&bytes[..valid_up_to])
                .map_err(|_| BindingError::InvalidOutputEncoding { valid_up_to })?
        }
        Err(err) => {
            return Err(BindingError::InvalidOutputEncoding {
                valid_up_to: err.valid_up_to(),
            });
        }
    };

    Ok((text.to_owned(), written))
}
