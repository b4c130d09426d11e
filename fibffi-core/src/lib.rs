//! fibffi Core Library
//!
//! Core of the fibffi benchmark: configuration, the in-process reference
//! algorithm, native library resolution and binding, and marshaling across
//! the C-ABI boundary with an explicit ownership protocol.

pub mod config;
pub mod error;
pub mod ffi;
pub mod implementation;
pub mod reference;

// Re-export commonly used types
pub use config::{AnomalyPolicy, BenchmarkConfig, ConfigLoader, LibraryConfig};
pub use error::{BenchError, BenchResult, LibraryError, MarshalingError, ValidationError};
pub use ffi::{LibraryHandle, LibraryResolver, NativeApi, NativeLibrary, Platform};
pub use implementation::{
    Computation, Implementation, ImplementationKind, NativeImplementation,
    ReferenceImplementation,
};
