//! Minimal engine exporting the `iamai-core` C interface.
//!
//! It loads no model: `Generate` echoes the prompt, wrapped in the active
//! prompt format, so the binding can be exercised against a real shared
//! library without model files.
#![allow(non_snake_case)]

use std::ffi::{CStr, c_char, c_float, c_int, c_void};
use std::ptr;

const PLACEHOLDER: &str = "{prompt}";

// Thread and batch settings are accepted and ignored.
struct StubContext {
    max_tokens: c_int,
    context_size: c_int,
    prompt_format: Option<String>,
    used: c_int,
}

impl StubContext {
    fn new(max_tokens: c_int, context_size: c_int) -> Self {
        Self {
            max_tokens,
            context_size,
            prompt_format: None,
            used: 0,
        }
    }

    fn respond(&mut self, prompt: &str) -> String {
        let formatted = match &self.prompt_format {
            Some(format) => format.replace(PLACEHOLDER, prompt),
            None => prompt.to_string(),
        };
        // One "token" per whitespace-separated word.
        let reply = formatted
            .split_whitespace()
            .take(self.max_tokens.max(0) as usize)
            .collect::<Vec<_>>()
            .join(" ");
        let consumed = c_int::try_from(formatted.len() + reply.len()).unwrap_or(c_int::MAX);
        self.used = self.used.saturating_add(consumed).min(self.context_size);
        reply
    }
}

unsafe fn read_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

unsafe fn context<'a>(ctx: *mut c_void) -> Option<&'a mut StubContext> {
    unsafe { ctx.cast::<StubContext>().as_mut() }
}

fn into_handle(context: StubContext) -> *mut c_void {
    Box::into_raw(Box::new(context)).cast()
}

/// # Safety
/// `model_path` must be null or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn Init(model_path: *const c_char) -> *mut c_void {
    match unsafe { read_str(model_path) } {
        Some(model) if !model.is_empty() => into_handle(StubContext::new(256, 2048)),
        _ => ptr::null_mut(),
    }
}

/// # Safety
/// `model_path` must be null or a NUL-terminated string.
#[unsafe(no_mangle)]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn FullInit(
    model_path: *const c_char,
    max_tokens: c_int,
    batch: c_int,
    context_size: c_int,
    threads: c_int,
    _top_k: c_int,
    top_p: c_float,
    temperature: c_float,
    _seed: u32,
) -> *mut c_void {
    if unsafe { read_str(model_path) }.is_none_or(str::is_empty) {
        return ptr::null_mut();
    }
    if max_tokens <= 0 || batch <= 0 || context_size <= 0 || threads <= 0 {
        return ptr::null_mut();
    }
    if !(0.0..=1.0).contains(&top_p) || temperature < 0.0 {
        return ptr::null_mut();
    }
    into_handle(StubContext::new(max_tokens, context_size))
}

/// # Safety
/// `ctx` must come from `Init`/`FullInit`; `output` must hold `max_length`
/// bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn Generate(
    ctx: *mut c_void,
    prompt: *const c_char,
    output: *mut c_char,
    max_length: c_int,
) -> bool {
    let (Some(context), Some(prompt)) = (unsafe { context(ctx) }, unsafe { read_str(prompt) }) else {
        return false;
    };
    if output.is_null() || max_length <= 0 {
        return false;
    }

    let reply = context.respond(prompt);
    let copied = reply.len().min(max_length as usize - 1);
    unsafe {
        ptr::copy_nonoverlapping(reply.as_ptr(), output.cast::<u8>(), copied);
        *output.add(copied) = 0;
    }
    true
}

/// # Safety
/// `ctx` must be null or come from `Init`/`FullInit`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn SetMaxTokens(ctx: *mut c_void, max_tokens: c_int) {
    if let Some(context) = unsafe { context(ctx) } {
        context.max_tokens = max_tokens;
    }
}

/// # Safety
/// `ctx` must be null or come from `Init`/`FullInit`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn SetThreads(_ctx: *mut c_void, _threads: c_int) {}

/// # Safety
/// `ctx` must be null or come from `Init`/`FullInit`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn SetBatchSize(_ctx: *mut c_void, _batch: c_int) {}

/// # Safety
/// `ctx` must be null or come from `Init`/`FullInit`; `format` must be null
/// or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn SetPromptFormat(ctx: *mut c_void, format: *const c_char) {
    if let (Some(context), Some(format)) = (unsafe { context(ctx) }, unsafe { read_str(format) }) {
        context.prompt_format = Some(format.to_string());
    }
}

/// # Safety
/// `ctx` must be null or come from `Init`/`FullInit`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ClearPromptFormat(ctx: *mut c_void) {
    if let Some(context) = unsafe { context(ctx) } {
        context.prompt_format = None;
    }
}

/// # Safety
/// `ctx` must be null or come from `Init`/`FullInit`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ClearContext(ctx: *mut c_void) {
    if let Some(context) = unsafe { context(ctx) } {
        context.used = 0;
    }
}

/// # Safety
/// `ctx` must be null or come from `Init`/`FullInit`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn GetContextUsage(ctx: *mut c_void) -> c_int {
    unsafe { context(ctx) }.map_or(0, |context| context.used)
}

/// # Safety
/// `ctx` must be null or come from `Init`/`FullInit`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn GetContextSize(ctx: *mut c_void) -> c_int {
    unsafe { context(ctx) }.map_or(0, |context| context.context_size)
}

/// # Safety
/// `ctx` must be null or come from `Init`/`FullInit` and not be freed yet.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn Free(ctx: *mut c_void) {
    if !ctx.is_null() {
        drop(unsafe { Box::from_raw(ctx.cast::<StubContext>()) });
    }
}
