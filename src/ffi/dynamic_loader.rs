use std::ffi::{OsString, c_void};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use libloading::Library;
use tracing::{debug, info};

use crate::error::{BindingError, Result};

/// Base name of the native engine; the platform decorates it
/// (`libiamai-core.so`, `libiamai-core.dylib`, `iamai-core.dll`).
pub const LIBRARY_STEM: &str = "iamai-core";

/// A native module mapped into the process.
///
/// Unloading consumes the module, so a handle can never be closed twice.
pub trait NativeModule: Send {
    /// Path the module was loaded from.
    fn path(&self) -> &Path;

    /// Address of an exported symbol, or the loader's explanation for why
    /// it is not available.
    fn lookup(&self, name: &str) -> std::result::Result<NonNull<c_void>, String>;

    /// Unmap the module.
    fn unload(self: Box<Self>) -> Result<()>;
}

/// Something that can turn a path into a [`NativeModule`].
pub trait ModuleLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn NativeModule>>;
}

/// A module loaded through the platform loader (`dlopen` / `LoadLibraryExW`).
pub struct DynamicLibrary {
    path: PathBuf,
    library: Library,
}

impl DynamicLibrary {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(BindingError::ModuleNotFound(path.to_path_buf()));
        }

        // SAFETY: loading runs the module's initializers. The module is the
        // engine the caller pointed us at; nothing else is executed until
        // symbols have been resolved against their declared signatures.
        let library = unsafe { Library::new(path) }.map_err(|err| BindingError::LoadFailed {
            path: path.to_path_buf(),
            code: os_error_code(&err),
            message: err.to_string(),
        })?;

        info!(path = %path.display(), "native module loaded");
        Ok(Self {
            path: path.to_path_buf(),
            library,
        })
    }
}

impl NativeModule for DynamicLibrary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn lookup(&self, name: &str) -> std::result::Result<NonNull<c_void>, String> {
        // SAFETY: the symbol is read as an untyped address and never
        // dereferenced here; `SymbolSet` gives it its declared signature.
        let symbol = unsafe { self.library.get::<*mut c_void>(name.as_bytes()) }
            .map_err(|err| err.to_string())?;
        NonNull::new(*symbol).ok_or_else(|| format!("`{name}` resolved to a null address"))
    }

    fn unload(self: Box<Self>) -> Result<()> {
        let DynamicLibrary { path, library } = *self;
        library.close().map_err(|err| BindingError::UnloadFailed {
            path: path.clone(),
            message: err.to_string(),
        })?;
        debug!(path = %path.display(), "native module unloaded");
        Ok(())
    }
}

/// Default loader backed by `libloading`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DynamicLibraryLoader;

impl ModuleLoader for DynamicLibraryLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn NativeModule>> {
        Ok(Box::new(DynamicLibrary::open(path)?))
    }
}

/// Platform file name for a library stem, e.g. `libiamai-core.so`.
pub fn library_filename(stem: &str) -> OsString {
    libloading::library_filename(stem)
}

/// `dir` joined with the platform file name of the native engine.
pub fn default_library_path(dir: impl AsRef<Path>) -> PathBuf {
    dir.as_ref().join(library_filename(LIBRARY_STEM))
}

fn os_error_code(err: &libloading::Error) -> Option<i32> {
    std::error::Error::source(err)
        .and_then(|source| source.downcast_ref::<std::io::Error>())
        .and_then(std::io::Error::raw_os_error)
}
