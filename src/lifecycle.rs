//! Ownership of the module + context pair.
//!
//! A [`LifecycleGuard`] walks forward through
//! `Uninitialized → Loaded → SymbolsResolved → ContextReady → Released`.
//! Release frees the native context first and unloads the module second.
//! Each step runs at most once, whether release is requested explicitly,
//! repeated, or left to `Drop`.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::config::GenerationConfig;
use crate::context::{self, ContextHandle};
use crate::error::{BindingError, Result};
use crate::ffi::{EntryPoint, ModuleLoader, NativeModule, SymbolSet};
use crate::generation::{self, GenerationResult};
use crate::mutators;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleState {
    Uninitialized,
    Loaded,
    SymbolsResolved,
    ContextReady,
    Released,
}

/// Sole owner of a native module and the context created from it.
///
/// Every call into the engine takes `&mut self`: a context is not safe for
/// concurrent use. The guard is `Send`, so independent guards may live on
/// different threads.
pub struct LifecycleGuard {
    state: LifecycleState,
    module: Option<Box<dyn NativeModule>>,
    symbols: Option<SymbolSet>,
    context: Option<ContextHandle>,
    released: AtomicBool,
}

impl Default for LifecycleGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleGuard {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Uninitialized,
            module: None,
            symbols: None,
            context: None,
            released: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Entry points the resolved module exports. Empty before resolution and
    /// after release.
    pub fn exported(&self) -> Vec<EntryPoint> {
        self.symbols
            .as_ref()
            .map(SymbolSet::exported)
            .unwrap_or_default()
    }

    pub fn exports(&self, entry: EntryPoint) -> bool {
        self.symbols
            .as_ref()
            .is_some_and(|symbols| symbols.contains(entry))
    }

    pub fn context_handle(&self) -> Option<&ContextHandle> {
        self.context.as_ref()
    }

    /// Load the module at `path` with `loader`.
    pub fn load(&mut self, loader: &dyn ModuleLoader, path: &Path) -> Result<()> {
        self.require(LifecycleState::Uninitialized)?;
        let module = loader.load(path)?;
        self.attach(module)
    }

    /// Take ownership of an already-loaded module.
    pub fn attach(&mut self, module: Box<dyn NativeModule>) -> Result<()> {
        self.require(LifecycleState::Uninitialized)?;
        debug!(path = %module.path().display(), "module attached");
        self.module = Some(module);
        self.state = LifecycleState::Loaded;
        Ok(())
    }

    /// Resolve the entry points, failing on the first required one missing.
    pub fn resolve(&mut self, required: &[EntryPoint]) -> Result<()> {
        self.require(LifecycleState::Loaded)?;
        let module = self.module.as_deref().ok_or(BindingError::InvalidState {
            expected: LifecycleState::Loaded,
            actual: self.state,
        })?;

        let symbols = SymbolSet::resolve(module, required)?;
        info!(
            path = %module.path().display(),
            exported = ?symbols,
            "entry points resolved"
        );
        self.symbols = Some(symbols);
        self.state = LifecycleState::SymbolsResolved;
        Ok(())
    }

    /// Create the context with the engine's defaults.
    pub fn init_simple(&mut self, model_path: &Path) -> Result<()> {
        let symbols = self.resolved()?;
        let handle = context::init_simple(symbols, model_path)?;
        self.adopt(handle);
        Ok(())
    }

    /// Create the context with explicit generation parameters.
    pub fn init_full(&mut self, model_path: &Path, config: &GenerationConfig) -> Result<()> {
        let symbols = self.resolved()?;
        let handle = context::init_full(symbols, model_path, config)?;
        self.adopt(handle);
        Ok(())
    }

    pub fn generate(&mut self, prompt: &str, max_length: usize) -> Result<GenerationResult> {
        let (symbols, handle) = self.ready()?;
        generation::generate(symbols, handle, prompt, max_length)
    }

    pub fn set_max_tokens(&mut self, max_tokens: u32) -> Result<()> {
        let (symbols, handle) = self.ready()?;
        mutators::set_max_tokens(symbols, handle, max_tokens)
    }

    pub fn set_threads(&mut self, threads: u32) -> Result<()> {
        let (symbols, handle) = self.ready()?;
        mutators::set_threads(symbols, handle, threads)
    }

    pub fn set_batch_size(&mut self, batch: u32) -> Result<()> {
        let (symbols, handle) = self.ready()?;
        mutators::set_batch_size(symbols, handle, batch)
    }

    pub fn set_prompt_format(&mut self, format: &str) -> Result<()> {
        let (symbols, handle) = self.ready()?;
        mutators::set_prompt_format(symbols, handle, format)
    }

    pub fn clear_prompt_format(&mut self) -> Result<()> {
        let (symbols, handle) = self.ready()?;
        mutators::clear_prompt_format(symbols, handle)
    }

    pub fn clear_context(&mut self) -> Result<()> {
        let (symbols, handle) = self.ready()?;
        mutators::clear_context(symbols, handle)
    }

    pub fn context_usage(&mut self) -> Result<i32> {
        let (symbols, handle) = self.ready()?;
        mutators::context_usage(symbols, handle)
    }

    pub fn context_size(&mut self) -> Result<i32> {
        let (symbols, handle) = self.ready()?;
        mutators::context_size(symbols, handle)
    }

    /// Free the native context, then unload the module.
    ///
    /// Only the first call does anything; later calls return `Ok(())`.
    pub fn release(&mut self) -> Result<()> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let previous = self.state;
        self.state = LifecycleState::Released;

        if let Some(handle) = self.context.take() {
            match self.symbols.as_ref().map(SymbolSet::free) {
                Some(Ok(free)) => {
                    // SAFETY: `handle` came from this module's init entry
                    // point and was just taken out of the guard, so it is
                    // freed exactly once.
                    unsafe { free(handle.as_ptr()) };
                    debug!(handle = ?handle, "native context freed");
                }
                _ => warn!(handle = ?handle, "no Free entry point; native context leaked"),
            }
        }
        self.symbols = None;

        if let Some(module) = self.module.take() {
            let path = module.path().to_path_buf();
            module.unload()?;
            info!(path = %path.display(), from = ?previous, "binding released");
        }
        Ok(())
    }

    fn require(&self, expected: LifecycleState) -> Result<()> {
        if self.is_released() {
            return Err(BindingError::UseAfterRelease);
        }
        if self.state != expected {
            return Err(BindingError::InvalidState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    fn resolved(&self) -> Result<&SymbolSet> {
        self.require(LifecycleState::SymbolsResolved)?;
        self.symbols.as_ref().ok_or(BindingError::InvalidState {
            expected: LifecycleState::SymbolsResolved,
            actual: self.state,
        })
    }

    fn ready(&self) -> Result<(&SymbolSet, &ContextHandle)> {
        self.require(LifecycleState::ContextReady)?;
        match (self.symbols.as_ref(), self.context.as_ref()) {
            (Some(symbols), Some(handle)) => Ok((symbols, handle)),
            _ => Err(BindingError::InvalidState {
                expected: LifecycleState::ContextReady,
                actual: self.state,
            }),
        }
    }

    fn adopt(&mut self, handle: ContextHandle) {
        self.context = Some(handle);
        self.state = LifecycleState::ContextReady;
    }
}

impl Drop for LifecycleGuard {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!(error = %err, "native teardown failed during drop");
        }
    }
}
