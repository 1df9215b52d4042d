//! Post-creation adjustments forwarded to the engine.
//!
//! Nothing here caches or reads back engine state; each call only forwards
//! its argument. Every call goes through a
//! [`LifecycleGuard`](crate::LifecycleGuard), which refuses them once released.
//!
//! ```compile_fail
//! fn bypass(symbols: &iamai::SymbolSet, handle: &iamai::ContextHandle) {
//!     let _ = iamai::mutators::set_max_tokens(symbols, handle, 8);
//! }
//! ```

use tracing::{debug, warn};

use crate::context::ContextHandle;
use crate::error::Result;
use crate::ffi::SymbolSet;
use crate::marshal;

/// Placeholder the engine substitutes the prompt into.
pub const PROMPT_PLACEHOLDER: &str = "{prompt}";

pub(crate) fn set_max_tokens(
    symbols: &SymbolSet,
    handle: &ContextHandle,
    max_tokens: u32,
) -> Result<()> {
    let set = symbols.set_max_tokens()?;
    let value = marshal::positive("max_tokens", max_tokens)?;
    debug!(handle = ?handle, max_tokens, "SetMaxTokens");
    // SAFETY: resolved with the `SetMaxTokens` signature; the handle is live.
    unsafe { set(handle.as_ptr(), value) };
    Ok(())
}

pub(crate) fn set_threads(symbols: &SymbolSet, handle: &ContextHandle, threads: u32) -> Result<()> {
    let set = symbols.set_threads()?;
    let value = marshal::positive("threads", threads)?;
    debug!(handle = ?handle, threads, "SetThreads");
    // SAFETY: resolved with the `SetThreads` signature; the handle is live.
    unsafe { set(handle.as_ptr(), value) };
    Ok(())
}

pub(crate) fn set_batch_size(
    symbols: &SymbolSet,
    handle: &ContextHandle,
    batch: u32,
) -> Result<()> {
    let set = symbols.set_batch_size()?;
    let value = marshal::positive("batch", batch)?;
    debug!(handle = ?handle, batch, "SetBatchSize");
    // SAFETY: resolved with the `SetBatchSize` signature; the handle is live.
    unsafe { set(handle.as_ptr(), value) };
    Ok(())
}

/// Wrap future prompts in `format`; the engine replaces `{prompt}` with the
/// prompt text.
pub(crate) fn set_prompt_format(
    symbols: &SymbolSet,
    handle: &ContextHandle,
    format: &str,
) -> Result<()> {
    let set = symbols.set_prompt_format()?;
    let format_c = marshal::c_string("format", format)?;
    if !format.contains(PROMPT_PLACEHOLDER) {
        warn!(
            handle = ?handle,
            "prompt format has no {} placeholder; forwarding unchanged",
            PROMPT_PLACEHOLDER
        );
    }
    debug!(handle = ?handle, format_len = format.len(), "SetPromptFormat");
    // SAFETY: resolved with the `SetPromptFormat` signature; `format_c`
    // outlives the call.
    unsafe { set(handle.as_ptr(), format_c.as_ptr()) };
    Ok(())
}

pub(crate) fn clear_prompt_format(symbols: &SymbolSet, handle: &ContextHandle) -> Result<()> {
    let clear = symbols.clear_prompt_format()?;
    debug!(handle = ?handle, "ClearPromptFormat");
    // SAFETY: resolved with the `ClearPromptFormat` signature; the handle is live.
    unsafe { clear(handle.as_ptr()) };
    Ok(())
}

/// Drop the engine's accumulated conversation state.
pub(crate) fn clear_context(symbols: &SymbolSet, handle: &ContextHandle) -> Result<()> {
    let clear = symbols.clear_context()?;
    debug!(handle = ?handle, "ClearContext");
    // SAFETY: resolved with the `ClearContext` signature; the handle is live.
    unsafe { clear(handle.as_ptr()) };
    Ok(())
}

/// Tokens currently held in the engine's context window, as it reports them.
pub(crate) fn context_usage(symbols: &SymbolSet, handle: &ContextHandle) -> Result<i32> {
    let query = symbols.get_context_usage()?;
    // SAFETY: resolved with the `GetContextUsage` signature; the handle is live.
    Ok(unsafe { query(handle.as_ptr()) })
}

/// Size of the engine's context window, as it reports it.
pub(crate) fn context_size(symbols: &SymbolSet, handle: &ContextHandle) -> Result<i32> {
    let query = symbols.get_context_size()?;
    // SAFETY: resolved with the `GetContextSize` signature; the handle is live.
    Ok(unsafe { query(handle.as_ptr()) })
}
