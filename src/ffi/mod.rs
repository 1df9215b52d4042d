//! Native module plumbing.
//!
//! [`dynamic_loader`] maps the shared library into the process and hands out
//! raw symbol addresses; [`symbol_registry`] turns those addresses into a typed
//! table of `extern "C"` entry points, validated once at resolution time.

pub mod dynamic_loader;
pub mod symbol_registry;

pub use dynamic_loader::{
    DynamicLibrary, DynamicLibraryLoader, LIBRARY_STEM, ModuleLoader, NativeModule,
    default_library_path, library_filename,
};
pub use symbol_registry::{
    ContextFn, EntryPoint, FfiSignature, FfiType, FullInitFn, GenerateFn, InitFn, QueryFn,
    SetIntFn, SetTextFn, SymbolSet,
};
