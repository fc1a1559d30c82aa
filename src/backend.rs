//! A stable-ABI adapter to the external inference plugin, plus an
//! in-process stub used for tests and `--driver stub`.

use std::ffi::{c_char, c_void, CStr, CString};
use std::sync::Arc;

use libloading::{Library, Symbol};
use thiserror::Error;

/// Inputs larger than this are rejected before crossing the FFI boundary.
pub const MAX_PATH_LEN: usize = 4096;
pub const MAX_PROMPT_LEN: usize = 1 << 20;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("path exceeds {} bytes", MAX_PATH_LEN)]
    PathTooLong,
    #[error("prompt exceeds {} bytes", MAX_PROMPT_LEN)]
    PromptTooLong,
    #[error("model load failed")]
    ModelLoadFailed,
    #[error("generation failed")]
    GenerationFailed,
    #[error("path or prompt contains an interior NUL byte")]
    InteriorNul,
    #[error("failed to load driver library: {0}")]
    LibraryLoad(String),
    #[error("driver is missing required symbol: {0}")]
    MissingSymbol(&'static str),
    #[error("model id {0} is already in use")]
    DuplicateModelId(u64),
}

/// An opaque handle to a loaded model, owned by the backend plugin. Stored
/// as a `usize` rather than a raw pointer so it can cross thread boundaries
/// without an `unsafe impl Send` on the pointer type itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawModelHandle(pub usize);

/// The seven entry points a backend plugin exposes.
pub trait Backend: Send + Sync {
    fn load_model(&self, path: &str) -> Result<RawModelHandle, BackendError>;
    fn unload_model(&self, handle: RawModelHandle);
    fn generate(
        &self,
        handle: RawModelHandle,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String, BackendError>;
    fn driver_name(&self) -> &str;
    fn driver_version(&self) -> &str;
}

fn check_lengths(path_or_prompt: &str, max: usize, err: BackendError) -> Result<(), BackendError> {
    if path_or_prompt.len() > max {
        return Err(err);
    }
    Ok(())
}

// ============================================================================
// FFI backend — dynamically loaded plugin
// ============================================================================

type InitializeContextFn = unsafe extern "C" fn() -> *mut c_void;
type LoadModelFn = unsafe extern "C" fn(ctx: *mut c_void, path: *const c_char) -> *mut c_void;
type UnloadModelFn = unsafe extern "C" fn(ctx: *mut c_void, handle: *mut c_void);
type GenerateFn = unsafe extern "C" fn(
    ctx: *mut c_void,
    handle: *mut c_void,
    prompt: *const c_char,
    max_tokens: u32,
) -> *mut c_char;
type FreeStringFn = unsafe extern "C" fn(s: *mut c_char);
type DriverNameFn = unsafe extern "C" fn() -> *const c_char;
type DriverVersionFn = unsafe extern "C" fn() -> *const c_char;

/// Owns the dynamic-library handle and the plugin's context for its entire
/// lifetime; both are released exactly once, on drop.
pub struct FfiBackend {
    // Kept alive for the lifetime of the cached symbols below; never read
    // directly after construction.
    _library: Library,
    context: *mut c_void,
    load_model_fn: LoadModelFn,
    unload_model_fn: UnloadModelFn,
    generate_fn: GenerateFn,
    free_string_fn: FreeStringFn,
    name: String,
    version: String,
}

// SAFETY: the plugin contract requires the backend to be thread-safe
// per-handle, and concurrent `generate` calls on *different* handles must
// be supported. Two calls landing on the same handle concurrently is only
// a soft possibility, not one the plugin is required to forbid.
unsafe impl Send for FfiBackend {}
unsafe impl Sync for FfiBackend {}

impl FfiBackend {
    /// Load a plugin shared library from `driver_path` and call its
    /// `initialize_context` entry point.
    pub fn load(driver_path: &str) -> Result<Self, BackendError> {
        let library = unsafe {
            Library::new(driver_path).map_err(|e| BackendError::LibraryLoad(e.to_string()))?
        };

        macro_rules! sym {
            ($name:literal, $ty:ty) => {
                unsafe {
                    let s: Symbol<$ty> = library
                        .get($name)
                        .map_err(|_| BackendError::MissingSymbol($name))?;
                    *s
                }
            };
        }

        let initialize_context: InitializeContextFn = sym!(b"initialize_context\0", InitializeContextFn);
        let load_model_fn: LoadModelFn = sym!(b"load_model\0", LoadModelFn);
        let unload_model_fn: UnloadModelFn = sym!(b"unload_model\0", UnloadModelFn);
        let generate_fn: GenerateFn = sym!(b"generate\0", GenerateFn);
        let free_string_fn: FreeStringFn = sym!(b"free_string\0", FreeStringFn);
        let driver_name_fn: DriverNameFn = sym!(b"driver_name\0", DriverNameFn);
        let driver_version_fn: DriverVersionFn = sym!(b"driver_version\0", DriverVersionFn);

        let context = unsafe { initialize_context() };
        let name = unsafe { borrow_c_str(driver_name_fn()) };
        let version = unsafe { borrow_c_str(driver_version_fn()) };

        Ok(Self {
            _library: library,
            context,
            load_model_fn,
            unload_model_fn,
            generate_fn,
            free_string_fn,
            name,
            version,
        })
    }
}

/// Copy a borrowed, plugin-owned C string into an owned Rust `String`
/// without attempting to free it (name/version strings are plugin statics).
unsafe fn borrow_c_str(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

impl Backend for FfiBackend {
    fn load_model(&self, path: &str) -> Result<RawModelHandle, BackendError> {
        check_lengths(path, MAX_PATH_LEN, BackendError::PathTooLong)?;
        let c_path = CString::new(path).map_err(|_| BackendError::InteriorNul)?;
        let handle = unsafe { (self.load_model_fn)(self.context, c_path.as_ptr()) };
        if handle.is_null() {
            return Err(BackendError::ModelLoadFailed);
        }
        Ok(RawModelHandle(handle as usize))
    }

    fn unload_model(&self, handle: RawModelHandle) {
        unsafe { (self.unload_model_fn)(self.context, handle.0 as *mut c_void) };
    }

    fn generate(
        &self,
        handle: RawModelHandle,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String, BackendError> {
        check_lengths(prompt, MAX_PROMPT_LEN, BackendError::PromptTooLong)?;
        let c_prompt = CString::new(prompt).map_err(|_| BackendError::InteriorNul)?;
        let raw = unsafe {
            (self.generate_fn)(self.context, handle.0 as *mut c_void, c_prompt.as_ptr(), max_tokens)
        };
        if raw.is_null() {
            return Err(BackendError::GenerationFailed);
        }
        // Convert before returning the borrowed C string to the plugin.
        let text = unsafe { CStr::from_ptr(raw).to_string_lossy().into_owned() };
        unsafe { (self.free_string_fn)(raw) };
        Ok(text)
    }

    fn driver_name(&self) -> &str {
        &self.name
    }

    fn driver_version(&self) -> &str {
        &self.version
    }
}

// ============================================================================
// Stub backend — in-process, no dynamic library
// ============================================================================

/// A deterministic, injectable backend for tests and `--driver stub`. Each
/// loaded model gets a fresh handle; `generate` defaults to echoing the
/// prompt back unless a response function was configured.
pub struct StubBackend {
    next_handle: std::sync::atomic::AtomicUsize,
    responder: Arc<dyn Fn(&str) -> Result<String, BackendError> + Send + Sync>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            next_handle: std::sync::atomic::AtomicUsize::new(1),
            responder: Arc::new(|prompt| Ok(prompt.to_string())),
        }
    }

    /// Build a stub whose `generate` is driven by a custom closure — used to
    /// simulate a classifier returning a fixed priority token or a forced
    /// failure.
    pub fn with_responder(
        f: impl Fn(&str) -> Result<String, BackendError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            next_handle: std::sync::atomic::AtomicUsize::new(1),
            responder: Arc::new(f),
        }
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for StubBackend {
    fn load_model(&self, path: &str) -> Result<RawModelHandle, BackendError> {
        check_lengths(path, MAX_PATH_LEN, BackendError::PathTooLong)?;
        use std::sync::atomic::Ordering;
        Ok(RawModelHandle(self.next_handle.fetch_add(1, Ordering::Relaxed)))
    }

    fn unload_model(&self, _handle: RawModelHandle) {}

    fn generate(
        &self,
        _handle: RawModelHandle,
        prompt: &str,
        _max_tokens: u32,
    ) -> Result<String, BackendError> {
        check_lengths(prompt, MAX_PROMPT_LEN, BackendError::PromptTooLong)?;
        (self.responder)(prompt)
    }

    fn driver_name(&self) -> &str {
        "stub"
    }

    fn driver_version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }
}
