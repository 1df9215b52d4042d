use std::path::PathBuf;

use thiserror::Error;

use crate::lifecycle::LifecycleState;

/// Errors raised by the binding.
///
/// None of these are retried internally. `LoadFailed` and `SymbolNotFound`
/// carry whatever the platform loader reported, uninterpreted. `InitFailed`
/// and `GenerationFailed` carry nothing, because the native library only
/// reports null / `false`.
#[derive(Debug, Error)]
pub enum BindingError {
    #[error("native module not found at {}", .0.display())]
    ModuleNotFound(PathBuf),

    #[error("failed to load native module {}{}: {message}", path.display(), code.map(|c| format!(" (os error {c})")).unwrap_or_default())]
    LoadFailed {
        path: PathBuf,
        code: Option<i32>,
        message: String,
    },

    #[error("failed to unload native module {}: {message}", path.display())]
    UnloadFailed { path: PathBuf, message: String },

    #[error("native module does not export `{name}`: {reason}")]
    SymbolNotFound { name: &'static str, reason: String },

    #[error("native context initialization failed")]
    InitFailed,

    #[error("native generation failed")]
    GenerationFailed,

    #[error("generated text is not valid UTF-8 (valid up to byte {valid_up_to})")]
    InvalidOutputEncoding { valid_up_to: usize },

    #[error("binding used after release")]
    UseAfterRelease,

    #[error("operation requires state {expected:?}, binding is {actual:?}")]
    InvalidState {
        expected: LifecycleState,
        actual: LifecycleState,
    },

    #[error("invalid generation config: {0}")]
    InvalidConfig(String),

    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument { name: &'static str, reason: String },
}

impl BindingError {
    pub(crate) fn invalid_argument(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }

    /// True for errors that indicate a caller defect rather than a native failure.
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            Self::UseAfterRelease | Self::InvalidState { .. } | Self::InvalidArgument { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, BindingError>;
