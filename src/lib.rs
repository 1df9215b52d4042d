//! Binding for the `iamai-core` native text-generation engine.
//!
//! The engine ships as a shared library exporting a small C interface
//! (`Init`, `FullInit`, `Generate`, a handful of setters, `Free`). This crate
//! loads it at runtime, resolves that interface into a typed table once, and
//! ties the native context and the module to a single owner so that the
//! context is always freed before the module is unloaded, exactly once.
//!
//! ```no_run
//! use iamai::{BindingConfig, Engine, GenerationConfig};
//!
//! let config = BindingConfig::new("build/bin/libiamai-core.so", "models/tiny.gguf")
//!     .with_generation(GenerationConfig::default().with_max_tokens(128));
//! let mut engine = Engine::open(&config)?;
//! let reply = engine.generate("Tell me a story about a robot.")?;
//! println!("{reply}");
//! # Ok::<(), iamai::BindingError>(())
//! ```
//!
//! Text is exchanged as NUL-terminated UTF-8. Generated output is read up to
//! the first NUL in the caller-sized buffer.

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod ffi;
pub mod generation;
pub mod lifecycle;
pub mod mutators;

mod marshal;

pub use config::{BindingConfig, DEFAULT_OUTPUT_CAPACITY, GenerationConfig, SymbolProfile};
pub use context::ContextHandle;
pub use engine::Engine;
pub use error::{BindingError, Result};
pub use ffi::{DynamicLibraryLoader, EntryPoint, ModuleLoader, NativeModule, SymbolSet};
pub use generation::GenerationResult;
pub use lifecycle::{LifecycleGuard, LifecycleState};
