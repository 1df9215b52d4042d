//! In-process stand-in for the native engine.
//!
//! Every entry point is a real `extern "C"` function whose address is handed
//! out through [`NativeModule::lookup`], so the binding exercises exactly the
//! same typed calls it makes against a shared library. Calls are recorded in
//! a thread-local log; each test runs on its own thread.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::{CStr, c_char, c_float, c_int, c_void};
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};

use iamai::ffi::{ContextFn, FullInitFn, GenerateFn, InitFn, QueryFn, SetIntFn, SetTextFn};
use iamai::{BindingError, EntryPoint, ModuleLoader, NativeModule};

pub const STUB_HANDLE: usize = 1;
/// Model path for which `Init` / `FullInit` return null.
pub const FAILING_MODEL: &str = "missing.bin";
/// Prompt for which `Generate` scribbles into the buffer and returns false.
pub const FAILING_PROMPT: &str = "fail";
pub const STUB_CONTEXT_USAGE: c_int = 17;
pub const STUB_CONTEXT_SIZE: c_int = 2048;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Load {
        path: PathBuf,
    },
    Init {
        path: String,
    },
    FullInit {
        path: String,
        max_tokens: c_int,
        batch: c_int,
        context_size: c_int,
        threads: c_int,
        top_k: c_int,
        top_p: c_float,
        temperature: c_float,
        seed: u32,
    },
    Generate {
        handle: usize,
        prompt: String,
        size: c_int,
    },
    SetMaxTokens {
        handle: usize,
        value: c_int,
    },
    SetThreads {
        handle: usize,
        value: c_int,
    },
    SetBatchSize {
        handle: usize,
        value: c_int,
    },
    SetPromptFormat {
        handle: usize,
        format: String,
    },
    ClearPromptFormat {
        handle: usize,
    },
    ClearContext {
        handle: usize,
    },
    GetContextUsage {
        handle: usize,
    },
    GetContextSize {
        handle: usize,
    },
    Free {
        handle: usize,
    },
    Unload {
        path: PathBuf,
    },
}

thread_local! {
    static CALLS: RefCell<Vec<Call>> = const { RefCell::new(Vec::new()) };
    static RESPONSE: RefCell<String> = RefCell::new(String::from("hello"));
}

pub fn reset() {
    CALLS.with(|calls| calls.borrow_mut().clear());
    set_response("hello");
}

pub fn set_response(text: &str) {
    RESPONSE.with(|response| *response.borrow_mut() = text.to_string());
}

pub fn calls() -> Vec<Call> {
    CALLS.with(|calls| calls.borrow().clone())
}

pub fn count(predicate: impl Fn(&Call) -> bool) -> usize {
    CALLS.with(|calls| calls.borrow().iter().filter(|call| predicate(call)).count())
}

pub fn frees() -> usize {
    count(|call| matches!(call, Call::Free { .. }))
}

pub fn unloads() -> usize {
    count(|call| matches!(call, Call::Unload { .. }))
}

fn record(call: Call) {
    CALLS.with(|calls| calls.borrow_mut().push(call));
}

unsafe fn text(ptr: *const c_char) -> String {
    unsafe { CStr::from_ptr(ptr) }
        .to_string_lossy()
        .into_owned()
}

fn handle_for(path: &str) -> *mut c_void {
    if path == FAILING_MODEL {
        ptr::null_mut()
    } else {
        STUB_HANDLE as *mut c_void
    }
}

unsafe extern "C" fn stub_init(path: *const c_char) -> *mut c_void {
    let path = unsafe { text(path) };
    let handle = handle_for(&path);
    record(Call::Init { path });
    handle
}

#[allow(clippy::too_many_arguments)]
unsafe extern "C" fn stub_full_init(
    path: *const c_char,
    max_tokens: c_int,
    batch: c_int,
    context_size: c_int,
    threads: c_int,
    top_k: c_int,
    top_p: c_float,
    temperature: c_float,
    seed: u32,
) -> *mut c_void {
    let path = unsafe { text(path) };
    let handle = handle_for(&path);
    record(Call::FullInit {
        path,
        max_tokens,
        batch,
        context_size,
        threads,
        top_k,
        top_p,
        temperature,
        seed,
    });
    handle
}

// Mirrors the engine: copy at most `size - 1` bytes, then terminate.
unsafe extern "C" fn stub_generate(
    ctx: *mut c_void,
    prompt: *const c_char,
    output: *mut c_char,
    size: c_int,
) -> bool {
    let prompt = unsafe { text(prompt) };
    record(Call::Generate {
        handle: ctx as usize,
        prompt: prompt.clone(),
        size,
    });
    if size <= 0 {
        return false;
    }

    let failing = prompt == FAILING_PROMPT;
    let response = if failing {
        "partial output".to_string()
    } else {
        RESPONSE.with(|response| response.borrow().clone())
    };
    let bytes = response.as_bytes();
    let copied = bytes.len().min(size as usize - 1);
    unsafe {
        ptr::copy_nonoverlapping(bytes.as_ptr(), output.cast::<u8>(), copied);
        *output.add(copied) = 0;
    }
    !failing
}

unsafe extern "C" fn stub_set_max_tokens(ctx: *mut c_void, value: c_int) {
    record(Call::SetMaxTokens {
        handle: ctx as usize,
        value,
    });
}

unsafe extern "C" fn stub_set_threads(ctx: *mut c_void, value: c_int) {
    record(Call::SetThreads {
        handle: ctx as usize,
        value,
    });
}

unsafe extern "C" fn stub_set_batch_size(ctx: *mut c_void, value: c_int) {
    record(Call::SetBatchSize {
        handle: ctx as usize,
        value,
    });
}

unsafe extern "C" fn stub_set_prompt_format(ctx: *mut c_void, format: *const c_char) {
    let format = unsafe { text(format) };
    record(Call::SetPromptFormat {
        handle: ctx as usize,
        format,
    });
}

unsafe extern "C" fn stub_clear_prompt_format(ctx: *mut c_void) {
    record(Call::ClearPromptFormat {
        handle: ctx as usize,
    });
}

unsafe extern "C" fn stub_clear_context(ctx: *mut c_void) {
    record(Call::ClearContext {
        handle: ctx as usize,
    });
}

unsafe extern "C" fn stub_get_context_usage(ctx: *mut c_void) -> c_int {
    record(Call::GetContextUsage {
        handle: ctx as usize,
    });
    STUB_CONTEXT_USAGE
}

unsafe extern "C" fn stub_get_context_size(ctx: *mut c_void) -> c_int {
    record(Call::GetContextSize {
        handle: ctx as usize,
    });
    STUB_CONTEXT_SIZE
}

unsafe extern "C" fn stub_free(ctx: *mut c_void) {
    record(Call::Free {
        handle: ctx as usize,
    });
}

pub struct StubModule {
    path: PathBuf,
    exports: HashMap<&'static str, usize>,
    fail_unload: bool,
}

impl StubModule {
    /// A module exporting every entry point.
    pub fn new() -> Self {
        Self::at("stub/libiamai-core.so")
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        let exports = HashMap::from([
            ("Init", stub_init as InitFn as usize),
            ("FullInit", stub_full_init as FullInitFn as usize),
            ("Generate", stub_generate as GenerateFn as usize),
            ("SetMaxTokens", stub_set_max_tokens as SetIntFn as usize),
            ("SetThreads", stub_set_threads as SetIntFn as usize),
            ("SetBatchSize", stub_set_batch_size as SetIntFn as usize),
            ("SetPromptFormat", stub_set_prompt_format as SetTextFn as usize),
            ("ClearPromptFormat", stub_clear_prompt_format as ContextFn as usize),
            ("ClearContext", stub_clear_context as ContextFn as usize),
            ("GetContextUsage", stub_get_context_usage as QueryFn as usize),
            ("GetContextSize", stub_get_context_size as QueryFn as usize),
            ("Free", stub_free as ContextFn as usize),
        ]);
        Self {
            path: path.into(),
            exports,
            fail_unload: false,
        }
    }

    /// A module exporting only `entries`.
    pub fn only(entries: &[EntryPoint]) -> Self {
        let mut module = Self::new();
        module
            .exports
            .retain(|name, _| entries.iter().any(|entry| entry.name() == *name));
        module
    }

    pub fn without(mut self, name: &str) -> Self {
        self.exports.remove(name);
        self
    }

    pub fn failing_unload(mut self) -> Self {
        self.fail_unload = true;
        self
    }

    pub fn boxed(self) -> Box<dyn NativeModule> {
        Box::new(self)
    }
}

impl NativeModule for StubModule {
    fn path(&self) -> &Path {
        &self.path
    }

    fn lookup(&self, name: &str) -> Result<NonNull<c_void>, String> {
        self.exports
            .get(name)
            .and_then(|&address| NonNull::new(address as *mut c_void))
            .ok_or_else(|| format!("undefined symbol: {name}"))
    }

    fn unload(self: Box<Self>) -> iamai::Result<()> {
        record(Call::Unload {
            path: self.path.clone(),
        });
        if self.fail_unload {
            return Err(BindingError::UnloadFailed {
                path: self.path,
                message: "module is still referenced".to_string(),
            });
        }
        Ok(())
    }
}

/// Loader handing out [`StubModule`]s; paths containing `absent` do not exist.
#[derive(Default)]
pub struct StubLoader {
    pub missing: Vec<&'static str>,
}

impl ModuleLoader for StubLoader {
    fn load(&self, path: &Path) -> iamai::Result<Box<dyn NativeModule>> {
        if path.to_string_lossy().contains("absent") {
            return Err(BindingError::ModuleNotFound(path.to_path_buf()));
        }
        record(Call::Load {
            path: path.to_path_buf(),
        });
        let mut module = StubModule::at(path);
        for name in &self.missing {
            module = module.without(name);
        }
        Ok(module.boxed())
    }
}
