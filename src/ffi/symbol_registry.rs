use std::ffi::{c_char, c_float, c_int, c_void};
use std::fmt;
use std::ptr::NonNull;

use tracing::debug;

use crate::error::{BindingError, Result};
use crate::ffi::dynamic_loader::NativeModule;

pub type InitFn = unsafe extern "C" fn(*const c_char) -> *mut c_void;
pub type FullInitFn = unsafe extern "C" fn(
    *const c_char,
    c_int,
    c_int,
    c_int,
    c_int,
    c_int,
    c_float,
    c_float,
    u32,
) -> *mut c_void;
pub type GenerateFn = unsafe extern "C" fn(*mut c_void, *const c_char, *mut c_char, c_int) -> bool;
pub type SetIntFn = unsafe extern "C" fn(*mut c_void, c_int);
pub type SetTextFn = unsafe extern "C" fn(*mut c_void, *const c_char);
pub type ContextFn = unsafe extern "C" fn(*mut c_void);
pub type QueryFn = unsafe extern "C" fn(*mut c_void) -> c_int;

/// Value categories crossing the C boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FfiType {
    Unit,
    Bool,
    I32,
    U32,
    F32,
    /// Opaque context pointer.
    Handle,
    /// NUL-terminated UTF-8, read by the callee.
    Str,
    /// Caller-owned output buffer, written by the callee.
    StrBuf,
}

impl fmt::Display for FfiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FfiType::Unit => "()",
            FfiType::Bool => "bool",
            FfiType::I32 => "c_int",
            FfiType::U32 => "u32",
            FfiType::F32 => "c_float",
            FfiType::Handle => "*mut c_void",
            FfiType::Str => "*const c_char",
            FfiType::StrBuf => "*mut c_char",
        };
        f.write_str(name)
    }
}

/// Positional C signature of an entry point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FfiSignature {
    pub params: &'static [FfiType],
    pub result: FfiType,
}

impl fmt::Display for FfiSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "extern \"C\" fn(")?;
        for (index, param) in self.params.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ")")?;
        if self.result != FfiType::Unit {
            write!(f, " -> {}", self.result)?;
        }
        Ok(())
    }
}

/// Entry points the native engine may export.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryPoint {
    Init,
    FullInit,
    Generate,
    SetMaxTokens,
    SetThreads,
    SetBatchSize,
    SetPromptFormat,
    ClearPromptFormat,
    ClearContext,
    GetContextUsage,
    GetContextSize,
    Free,
}

impl EntryPoint {
    pub const ALL: [EntryPoint; 12] = [
        EntryPoint::Init,
        EntryPoint::FullInit,
        EntryPoint::Generate,
        EntryPoint::SetMaxTokens,
        EntryPoint::SetThreads,
        EntryPoint::SetBatchSize,
        EntryPoint::SetPromptFormat,
        EntryPoint::ClearPromptFormat,
        EntryPoint::ClearContext,
        EntryPoint::GetContextUsage,
        EntryPoint::GetContextSize,
        EntryPoint::Free,
    ];

    /// Exported by every build of the engine.
    pub const CORE: &'static [EntryPoint] = &[
        EntryPoint::Init,
        EntryPoint::Generate,
        EntryPoint::SetMaxTokens,
        EntryPoint::Free,
    ];

    /// Builds exposing thread and batch tuning.
    pub const RUNTIME_VARIANT: &'static [EntryPoint] = &[
        EntryPoint::Init,
        EntryPoint::Generate,
        EntryPoint::SetMaxTokens,
        EntryPoint::SetThreads,
        EntryPoint::SetBatchSize,
        EntryPoint::Free,
    ];

    /// Builds exposing configured init and prompt templates.
    pub const PROMPT_FORMAT_VARIANT: &'static [EntryPoint] = &[
        EntryPoint::Init,
        EntryPoint::FullInit,
        EntryPoint::Generate,
        EntryPoint::SetMaxTokens,
        EntryPoint::SetPromptFormat,
        EntryPoint::ClearPromptFormat,
        EntryPoint::Free,
    ];

    /// Exported C name.
    pub fn name(self) -> &'static str {
        match self {
            EntryPoint::Init => "Init",
            EntryPoint::FullInit => "FullInit",
            EntryPoint::Generate => "Generate",
            EntryPoint::SetMaxTokens => "SetMaxTokens",
            EntryPoint::SetThreads => "SetThreads",
            EntryPoint::SetBatchSize => "SetBatchSize",
            EntryPoint::SetPromptFormat => "SetPromptFormat",
            EntryPoint::ClearPromptFormat => "ClearPromptFormat",
            EntryPoint::ClearContext => "ClearContext",
            EntryPoint::GetContextUsage => "GetContextUsage",
            EntryPoint::GetContextSize => "GetContextSize",
            EntryPoint::Free => "Free",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|entry| entry.name() == name)
    }

    pub fn signature(self) -> FfiSignature {
        use FfiType::*;
        let (params, result): (&'static [FfiType], FfiType) = match self {
            EntryPoint::Init => (&[Str], Handle),
            EntryPoint::FullInit => (&[Str, I32, I32, I32, I32, I32, F32, F32, U32], Handle),
            EntryPoint::Generate => (&[Handle, Str, StrBuf, I32], Bool),
            EntryPoint::SetMaxTokens | EntryPoint::SetThreads | EntryPoint::SetBatchSize => {
                (&[Handle, I32], Unit)
            }
            EntryPoint::SetPromptFormat => (&[Handle, Str], Unit),
            EntryPoint::ClearPromptFormat | EntryPoint::ClearContext | EntryPoint::Free => {
                (&[Handle], Unit)
            }
            EntryPoint::GetContextUsage | EntryPoint::GetContextSize => (&[Handle], I32),
        };
        FfiSignature { params, result }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Typed table of resolved entry points.
///
/// Built once by [`SymbolSet::resolve`]. Entry points that were not required
/// and are not exported stay empty; calling through them reports
/// `SymbolNotFound` without touching the native module.
///
/// The function pointers are only valid while the module stays mapped, so a
/// table is neither `Clone` nor callable outside the crate. Once it is moved
/// into a [`LifecycleGuard`](crate::LifecycleGuard), it is dropped before the
/// module is unloaded.
///
/// ```compile_fail
/// fn escape(symbols: &iamai::SymbolSet) -> iamai::SymbolSet {
///     *symbols
/// }
/// ```
#[derive(Default)]
pub struct SymbolSet {
    init: Option<InitFn>,
    full_init: Option<FullInitFn>,
    generate: Option<GenerateFn>,
    set_max_tokens: Option<SetIntFn>,
    set_threads: Option<SetIntFn>,
    set_batch_size: Option<SetIntFn>,
    set_prompt_format: Option<SetTextFn>,
    clear_prompt_format: Option<ContextFn>,
    clear_context: Option<ContextFn>,
    get_context_usage: Option<QueryFn>,
    get_context_size: Option<QueryFn>,
    free: Option<ContextFn>,
}

impl SymbolSet {
    /// Resolve `required` in order, failing on the first one the module does
    /// not export, then pick up whatever optional entry points are present.
    ///
    /// `Free` is always required: a context that cannot be freed is never
    /// created.
    pub fn resolve(module: &dyn NativeModule, required: &[EntryPoint]) -> Result<Self> {
        let mut set = SymbolSet::default();

        let mandatory = required
            .iter()
            .copied()
            .chain(std::iter::once(EntryPoint::Free));
        for entry in mandatory {
            if set.contains(entry) {
                continue;
            }
            let address = module
                .lookup(entry.name())
                .map_err(|reason| BindingError::SymbolNotFound {
                    name: entry.name(),
                    reason,
                })?;
            // SAFETY: `entry` names a symbol whose C signature is fixed by the
            // engine's exported interface; see `EntryPoint::signature`.
            unsafe { set.bind(entry, address) };
            debug!(symbol = entry.name(), signature = %entry.signature(), "resolved entry point");
        }

        for entry in EntryPoint::ALL {
            if set.contains(entry) {
                continue;
            }
            match module.lookup(entry.name()) {
                // SAFETY: as above.
                Ok(address) => unsafe { set.bind(entry, address) },
                Err(reason) => {
                    debug!(symbol = entry.name(), %reason, "optional entry point not exported")
                }
            }
        }

        Ok(set)
    }

    /// Store `address` under `entry`, typed by the entry point's signature.
    ///
    /// # Safety
    ///
    /// `address` must be the start of a function with the C signature
    /// `entry.signature()` describes, and must stay mapped for as long as
    /// this table is used.
    unsafe fn bind(&mut self, entry: EntryPoint, address: NonNull<c_void>) {
        let raw = address.as_ptr();
        unsafe {
            match entry {
                EntryPoint::Init => self.init = Some(std::mem::transmute::<*mut c_void, InitFn>(raw)),
                EntryPoint::FullInit => {
                    self.full_init = Some(std::mem::transmute::<*mut c_void, FullInitFn>(raw))
                }
                EntryPoint::Generate => {
                    self.generate = Some(std::mem::transmute::<*mut c_void, GenerateFn>(raw))
                }
                EntryPoint::SetMaxTokens => {
                    self.set_max_tokens = Some(std::mem::transmute::<*mut c_void, SetIntFn>(raw))
                }
                EntryPoint::SetThreads => {
                    self.set_threads = Some(std::mem::transmute::<*mut c_void, SetIntFn>(raw))
                }
                EntryPoint::SetBatchSize => {
                    self.set_batch_size = Some(std::mem::transmute::<*mut c_void, SetIntFn>(raw))
                }
                EntryPoint::SetPromptFormat => {
                    self.set_prompt_format =
                        Some(std::mem::transmute::<*mut c_void, SetTextFn>(raw))
                }
                EntryPoint::ClearPromptFormat => {
                    self.clear_prompt_format =
                        Some(std::mem::transmute::<*mut c_void, ContextFn>(raw))
                }
                EntryPoint::ClearContext => {
                    self.clear_context = Some(std::mem::transmute::<*mut c_void, ContextFn>(raw))
                }
                EntryPoint::GetContextUsage => {
                    self.get_context_usage = Some(std::mem::transmute::<*mut c_void, QueryFn>(raw))
                }
                EntryPoint::GetContextSize => {
                    self.get_context_size = Some(std::mem::transmute::<*mut c_void, QueryFn>(raw))
                }
                EntryPoint::Free => {
                    self.free = Some(std::mem::transmute::<*mut c_void, ContextFn>(raw))
                }
            }
        }
    }

    pub fn contains(&self, entry: EntryPoint) -> bool {
        match entry {
            EntryPoint::Init => self.init.is_some(),
            EntryPoint::FullInit => self.full_init.is_some(),
            EntryPoint::Generate => self.generate.is_some(),
            EntryPoint::SetMaxTokens => self.set_max_tokens.is_some(),
            EntryPoint::SetThreads => self.set_threads.is_some(),
            EntryPoint::SetBatchSize => self.set_batch_size.is_some(),
            EntryPoint::SetPromptFormat => self.set_prompt_format.is_some(),
            EntryPoint::ClearPromptFormat => self.clear_prompt_format.is_some(),
            EntryPoint::ClearContext => self.clear_context.is_some(),
            EntryPoint::GetContextUsage => self.get_context_usage.is_some(),
            EntryPoint::GetContextSize => self.get_context_size.is_some(),
            EntryPoint::Free => self.free.is_some(),
        }
    }

    /// Entry points available through this table.
    pub fn exported(&self) -> Vec<EntryPoint> {
        EntryPoint::ALL
            .into_iter()
            .filter(|entry| self.contains(*entry))
            .collect()
    }

    pub(crate) fn init(&self) -> Result<InitFn> {
        available(self.init, EntryPoint::Init)
    }

    pub(crate) fn full_init(&self) -> Result<FullInitFn> {
        available(self.full_init, EntryPoint::FullInit)
    }

    pub(crate) fn generate(&self) -> Result<GenerateFn> {
        available(self.generate, EntryPoint::Generate)
    }

    pub(crate) fn set_max_tokens(&self) -> Result<SetIntFn> {
        available(self.set_max_tokens, EntryPoint::SetMaxTokens)
    }

    pub(crate) fn set_threads(&self) -> Result<SetIntFn> {
        available(self.set_threads, EntryPoint::SetThreads)
    }

    pub(crate) fn set_batch_size(&self) -> Result<SetIntFn> {
        available(self.set_batch_size, EntryPoint::SetBatchSize)
    }

    pub(crate) fn set_prompt_format(&self) -> Result<SetTextFn> {
        available(self.set_prompt_format, EntryPoint::SetPromptFormat)
    }

    pub(crate) fn clear_prompt_format(&self) -> Result<ContextFn> {
        available(self.clear_prompt_format, EntryPoint::ClearPromptFormat)
    }

    pub(crate) fn clear_context(&self) -> Result<ContextFn> {
        available(self.clear_context, EntryPoint::ClearContext)
    }

    pub(crate) fn get_context_usage(&self) -> Result<QueryFn> {
        available(self.get_context_usage, EntryPoint::GetContextUsage)
    }

    pub(crate) fn get_context_size(&self) -> Result<QueryFn> {
        available(self.get_context_size, EntryPoint::GetContextSize)
    }

    pub(crate) fn free(&self) -> Result<ContextFn> {
        available(self.free, EntryPoint::Free)
    }
}

impl fmt::Debug for SymbolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.exported()).finish()
    }
}

fn available<F>(slot: Option<F>, entry: EntryPoint) -> Result<F> {
    slot.ok_or_else(|| BindingError::SymbolNotFound {
        name: entry.name(),
        reason: "not exported by the loaded module".to_string(),
    })
}
