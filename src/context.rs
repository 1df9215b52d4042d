//! Native context creation.
//!
//! Contexts are created through a [`LifecycleGuard`](crate::LifecycleGuard),
//! which owns and frees them; the creation functions are not public.
//!
//! ```compile_fail
//! let symbols = iamai::SymbolSet::default();
//! let _ = iamai::context::init_simple(&symbols, std::path::Path::new("model.bin"));
//! ```

use std::ffi::c_void;
use std::fmt;
use std::path::Path;
use std::ptr::NonNull;

use tracing::{debug, info};

use crate::config::GenerationConfig;
use crate::error::{BindingError, Result};
use crate::ffi::SymbolSet;
use crate::marshal;

/// Opaque pointer to engine-side generation state.
///
/// Only ever held by a [`LifecycleGuard`](crate::LifecycleGuard), which frees
/// it exactly once.
pub struct ContextHandle(NonNull<c_void>);

// SAFETY: the handle is an address owned by exactly one guard. It may move to
// another thread with its guard; it is never shared, so it is not `Sync`.
unsafe impl Send for ContextHandle {}

impl ContextHandle {
    fn from_raw(raw: *mut c_void) -> Result<Self> {
        NonNull::new(raw).map(Self).ok_or(BindingError::InitFailed)
    }

    pub(crate) fn as_ptr(&self) -> *mut c_void {
        self.0.as_ptr()
    }

    /// Numeric value of the handle, for diagnostics.
    pub fn addr(&self) -> usize {
        self.0.as_ptr() as usize
    }
}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextHandle({:#x})", self.addr())
    }
}

/// Create a context with the engine's built-in defaults (`Init`).
pub(crate) fn init_simple(symbols: &SymbolSet, model_path: &Path) -> Result<ContextHandle> {
    let init = symbols.init()?;
    let path = marshal::c_path("model_path", model_path)?;

    debug!(model = %model_path.display(), "calling Init");
    // SAFETY: `init` was resolved with the `Init` signature and `path` is a
    // NUL-terminated string that outlives the call.
    let raw = unsafe { init(path.as_ptr()) };
    let handle = ContextHandle::from_raw(raw)?;

    info!(model = %model_path.display(), handle = ?handle, "native context created");
    Ok(handle)
}

/// Create a context with explicit generation parameters (`FullInit`).
///
/// Arguments are passed in the engine's fixed order: path, max tokens, batch,
/// context size, threads, top-k, top-p, temperature, seed.
pub(crate) fn init_full(
    symbols: &SymbolSet,
    model_path: &Path,
    config: &GenerationConfig,
) -> Result<ContextHandle> {
    let full_init = symbols.full_init()?;
    let params = config.to_native()?;
    let path = marshal::c_path("model_path", model_path)?;

    debug!(model = %model_path.display(), ?params, "calling FullInit");
    // SAFETY: `full_init` was resolved with the `FullInit` signature; every
    // argument is a plain value except `path`, which outlives the call.
    let raw = unsafe {
        full_init(
            path.as_ptr(),
            params.max_tokens,
            params.batch,
            params.context_size,
            params.threads,
            params.top_k,
            params.top_p,
            params.temperature,
            params.seed,
        )
    };
    let handle = ContextHandle::from_raw(raw)?;

    info!(model = %model_path.display(), handle = ?handle, "native context created");
    Ok(handle)
}
