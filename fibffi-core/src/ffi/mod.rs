//! The native call boundary.
//!
//! Resolver → binding → marshaling, leaves first. Only `marshal` is meant to
//! be called per trial; resolution and binding happen once at startup.

pub mod binding;
pub mod marshal;
pub mod resolver;

#[cfg(any(test, feature = "test-support"))]
pub mod stub;

pub use binding::{NativeApi, NativeLibrary};
pub use marshal::{call_batch, call_scalar, BatchBuffer, BatchPayload, Greeting, NativeString};
pub use resolver::{LibraryHandle, LibraryResolver, Platform};

use crate::config::LibraryConfig;
use crate::error::LibraryError;

/// Resolve, open, and bind the configured native library.
pub fn load(config: &LibraryConfig) -> Result<NativeLibrary, LibraryError> {
    let resolver = LibraryResolver::new(config)?;
    let handle = resolver.resolve(&config.name)?;
    NativeLibrary::bind(handle)
}
