use std::path::Path;

use tracing::info;

use crate::config::{BindingConfig, GenerationConfig};
use crate::error::Result;
use crate::ffi::{DynamicLibraryLoader, EntryPoint, ModuleLoader, NativeModule};
use crate::generation::GenerationResult;
use crate::lifecycle::{LifecycleGuard, LifecycleState};

/// A ready-to-use engine: module loaded, entry points resolved, context
/// created.
///
/// Dropping an `Engine` frees its context and unloads its module. Call
/// [`Engine::release`] to do so early and observe unload errors.
pub struct Engine {
    guard: LifecycleGuard,
    output_capacity: usize,
}

impl Engine {
    /// Bring up an engine described by `config` using the platform loader.
    pub fn open(config: &BindingConfig) -> Result<Self> {
        Self::open_with(&DynamicLibraryLoader, config)
    }

    pub fn open_with(loader: &dyn ModuleLoader, config: &BindingConfig) -> Result<Self> {
        let mut guard = LifecycleGuard::new();
        guard.load(loader, &config.library)?;
        Self::bring_up(guard, config)
    }

    /// Bring up an engine around a module the caller already loaded.
    pub fn from_module(module: Box<dyn NativeModule>, config: &BindingConfig) -> Result<Self> {
        let mut guard = LifecycleGuard::new();
        guard.attach(module)?;
        Self::bring_up(guard, config)
    }

    /// Load `library`, require the core entry points and create a context
    /// with the engine's defaults.
    pub fn with_defaults(library: impl AsRef<Path>, model: impl AsRef<Path>) -> Result<Self> {
        let config = BindingConfig::new(library.as_ref(), model.as_ref());
        Self::open(&config)
    }

    /// Like [`Engine::with_defaults`], but configured through `FullInit`.
    pub fn with_config(
        library: impl AsRef<Path>,
        model: impl AsRef<Path>,
        generation: GenerationConfig,
    ) -> Result<Self> {
        let config =
            BindingConfig::new(library.as_ref(), model.as_ref()).with_generation(generation);
        Self::open(&config)
    }

    // On any error the guard is dropped here, which unloads the module.
    fn bring_up(mut guard: LifecycleGuard, config: &BindingConfig) -> Result<Self> {
        config.check()?;
        let mut required = config.symbols.entry_points().to_vec();
        if config.generation.is_some() && !required.contains(&EntryPoint::FullInit) {
            required.push(EntryPoint::FullInit);
        }
        if config.prompt_format.is_some() && !required.contains(&EntryPoint::SetPromptFormat) {
            required.push(EntryPoint::SetPromptFormat);
        }
        guard.resolve(&required)?;

        match &config.generation {
            Some(generation) => guard.init_full(&config.model, generation)?,
            None => guard.init_simple(&config.model)?,
        }
        if let Some(format) = &config.prompt_format {
            guard.set_prompt_format(format)?;
        }

        info!(
            library = %config.library.display(),
            model = %config.model.display(),
            output_capacity = config.output_capacity,
            "engine ready"
        );
        Ok(Self {
            guard,
            output_capacity: config.output_capacity,
        })
    }

    pub fn state(&self) -> LifecycleState {
        self.guard.state()
    }

    pub fn output_capacity(&self) -> usize {
        self.output_capacity
    }

    /// Generate with the configured output capacity.
    pub fn generate(&mut self, prompt: &str) -> Result<GenerationResult> {
        self.guard.generate(prompt, self.output_capacity)
    }

    /// Generate into a buffer of `max_length` bytes.
    pub fn generate_with_capacity(
        &mut self,
        prompt: &str,
        max_length: usize,
    ) -> Result<GenerationResult> {
        self.guard.generate(prompt, max_length)
    }

    pub fn set_max_tokens(&mut self, max_tokens: u32) -> Result<()> {
        self.guard.set_max_tokens(max_tokens)
    }

    pub fn set_threads(&mut self, threads: u32) -> Result<()> {
        self.guard.set_threads(threads)
    }

    pub fn set_batch_size(&mut self, batch: u32) -> Result<()> {
        self.guard.set_batch_size(batch)
    }

    pub fn set_prompt_format(&mut self, format: &str) -> Result<()> {
        self.guard.set_prompt_format(format)
    }

    pub fn clear_prompt_format(&mut self) -> Result<()> {
        self.guard.clear_prompt_format()
    }

    pub fn clear_context(&mut self) -> Result<()> {
        self.guard.clear_context()
    }

    pub fn context_usage(&mut self) -> Result<i32> {
        self.guard.context_usage()
    }

    pub fn context_size(&mut self) -> Result<i32> {
        self.guard.context_size()
    }

    pub fn release(&mut self) -> Result<()> {
        self.guard.release()
    }

    pub fn guard(&self) -> &LifecycleGuard {
        &self.guard
    }

    pub fn guard_mut(&mut self) -> &mut LifecycleGuard {
        &mut self.guard
    }
}
