//! Custom error types for fibffi.
//!
//! Explicit enum error types, one per concern. Everything carried by
//! [`BenchError`] aborts a run; marshaling errors stay scoped to a single
//! trial and are recorded by the harness instead.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for fibffi.
#[derive(Debug, Error)]
pub enum BenchError {
    // =========================================================================
    // Configuration Errors - Fail-Fast on Invalid Config
    // =========================================================================
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Native Library Errors - Environment Not Provisioned, No Retry
    // =========================================================================
    #[error("Native library error: {0}")]
    Library(#[from] LibraryError),

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration validation errors. Any of these prevents startup.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Input size {size} exceeds the largest supported index {max}")]
    InputSizeOutOfRange { size: u32, max: u32 },

    #[error("Empty list for field: {field}")]
    EmptyList { field: &'static str },
}

/// Errors locating, loading, or binding the native library.
///
/// All variants are fatal: retrying without rebuilding or reprovisioning the
/// library cannot succeed.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Unsupported platform: {os}")]
    UnsupportedPlatform { os: String },

    #[error("Could not find {filename} in:\n{}", CandidateList(.candidates))]
    NotFound {
        filename: String,
        candidates: Vec<PathBuf>,
    },

    #[error("Failed to load library '{}': {reason}", .path.display())]
    LoadFailed { path: PathBuf, reason: String },

    #[error("Symbol '{symbol}' not found in '{}': {reason}", .path.display())]
    SymbolNotFound {
        symbol: &'static str,
        path: PathBuf,
        reason: String,
    },

    #[error(
        "Native interface already bound to '{}', refusing to rebind to '{}'",
        .bound.display(),
        .requested.display()
    )]
    AlreadyBound { bound: PathBuf, requested: PathBuf },

    #[error("Failed to close library '{}': {reason}", .path.display())]
    CloseFailed { path: PathBuf, reason: String },
}

/// Errors converting data across the call boundary.
///
/// Scoped to a single call: the harness records the trial as failed and
/// continues.
#[derive(Debug, Error)]
pub enum MarshalingError {
    #[error("Native call '{call}' returned a null pointer")]
    NullResult { call: &'static str },

    #[error("Argument '{argument}' contains an interior NUL byte")]
    InteriorNul { argument: &'static str },

    #[error("Native call '{call}' returned invalid UTF-8: {reason}")]
    InvalidUtf8 { call: &'static str, reason: String },

    #[error("Malformed payload from '{call}': {reason}")]
    MalformedPayload { call: &'static str, reason: String },

    #[error("Batch of {len} elements cannot be passed across the boundary: {reason}")]
    InvalidBatch { len: usize, reason: String },

    #[error("Value {value} does not fit the native integer type")]
    ValueOutOfRange { value: u64 },

    #[error("Internal time {internal_ns}ns exceeds total elapsed {total_ns}ns")]
    InternalExceedsTotal { internal_ns: u128, total_ns: u128 },
}

/// Renders candidate paths one per line.
struct CandidateList<'a>(&'a Vec<PathBuf>);

impl fmt::Display for CandidateList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for path in self.0.iter() {
            if !first {
                writeln!(f)?;
            }
            write!(f, "{}", path.display())?;
            first = false;
        }
        Ok(())
    }
}

/// Result type alias using BenchError.
pub type BenchResult<T> = Result<T, BenchError>;
