// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Typed binding of the native entry points.
//!
//! [`NativeApi`] is the only surface callers see: three operations with fixed
//! signatures. [`NativeLibrary`] implements it over a loaded library; test
//! stubs implement it in-process.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use libc::{c_char, c_int};
use libloading::Library;

use crate::error::LibraryError;
use crate::ffi::resolver::{close_library, LibraryHandle};

/// Exported symbol names.
pub mod symbols {
    pub const COMPUTE_AND_GREET: &str = "compute_and_greet";
    pub const COMPUTE_BATCH: &str = "compute_batch";
    pub const RELEASE: &str = "release";
}

type ComputeAndGreetFn = unsafe extern "C" fn(*const c_char, c_int) -> *mut c_char;
type ComputeBatchFn = unsafe extern "C" fn(*const c_int, c_int) -> *mut c_char;
type ReleaseFn = unsafe extern "C" fn(*mut c_char);

/// Path of the first library bound in this process.
static BOUND_LIBRARY: OnceLock<PathBuf> = OnceLock::new();

/// The native interface: scalar call, batch call, release.
///
/// Raw pointers only appear here; `ffi::marshal` wraps them into owned values.
pub trait NativeApi {
    /// Compute F(n) and return an owned greeting string.
    ///
    /// # Safety
    ///
    /// `name` must point to a NUL-terminated string valid for the call. The
    /// returned pointer, if non-null, must be passed to [`NativeApi::release`]
    /// on this same implementation exactly once.
    unsafe fn compute_and_greet(&self, name: *const c_char, n: c_int) -> *mut c_char;

    /// Compute F(v) for every element and return an owned JSON string.
    ///
    /// # Safety
    ///
    /// `values` must point to `count` initialised `c_int`s valid for the call.
    /// The returned pointer follows the same release rule as above.
    unsafe fn compute_batch(&self, values: *const c_int, count: c_int) -> *mut c_char;

    /// Free a string returned by one of the calls above.
    ///
    /// # Safety
    ///
    /// `ptr` must come from this implementation and must not have been
    /// released before. It must not be used afterwards.
    unsafe fn release(&self, ptr: *mut c_char);
}

/// A native library with its entry points bound.
///
/// Read-only after construction. The function pointers stay valid for as long
/// as `library` is held.
pub struct NativeLibrary {
    path: PathBuf,
    compute_and_greet: ComputeAndGreetFn,
    compute_batch: ComputeBatchFn,
    release: ReleaseFn,
    library: Library,
}

impl NativeLibrary {
    /// Bind every entry point of `handle`.
    ///
    /// Consumes the handle, so a given handle is bound at most once. The first
    /// successful bind pins the process to that library path: binding the same
    /// path again succeeds, binding a different one fails with
    /// [`LibraryError::AlreadyBound`].
    pub fn bind(handle: LibraryHandle) -> Result<Self, LibraryError> {
        let compute_and_greet: ComputeAndGreetFn =
            lookup(&handle, symbols::COMPUTE_AND_GREET)?;
        let compute_batch: ComputeBatchFn = lookup(&handle, symbols::COMPUTE_BATCH)?;
        let release: ReleaseFn = lookup(&handle, symbols::RELEASE)?;

        let bound = BOUND_LIBRARY.get_or_init(|| handle.path().to_path_buf());
        if bound != handle.path() {
            return Err(LibraryError::AlreadyBound {
                bound: bound.clone(),
                requested: handle.path().to_path_buf(),
            });
        }

        let (path, library) = handle.into_parts();
        tracing::info!(path = %path.display(), "Bound native interface");

        Ok(Self {
            path,
            compute_and_greet,
            compute_batch,
            release,
            library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unload the library now instead of at drop.
    pub fn close(self) -> Result<(), LibraryError> {
        close_library(self.path, self.library)
    }
}

impl NativeApi for NativeLibrary {
    unsafe fn compute_and_greet(&self, name: *const c_char, n: c_int) -> *mut c_char {
        (self.compute_and_greet)(name, n)
    }

    unsafe fn compute_batch(&self, values: *const c_int, count: c_int) -> *mut c_char {
        (self.compute_batch)(values, count)
    }

    unsafe fn release(&self, ptr: *mut c_char) {
        (self.release)(ptr)
    }
}

impl std::fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeLibrary")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn lookup<T: Copy>(handle: &LibraryHandle, symbol: &'static str) -> Result<T, LibraryError> {
    // SAFETY: T is one of the fn pointer types above, matching the exported
    // signatures of fibffi-native. The copied pointer does not outlive the
    // library because NativeLibrary keeps it alive.
    unsafe {
        handle
            .library()
            .get::<T>(symbol.as_bytes())
            .map(|sym| *sym)
            .map_err(|e| LibraryError::SymbolNotFound {
                symbol,
                path: handle.path().to_path_buf(),
                reason: e.to_string(),
            })
    }
}
