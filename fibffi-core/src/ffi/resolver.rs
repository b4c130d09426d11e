// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Native library resolution.
//!
//! Maps the running platform to its shared-library naming convention, searches
//! the configured build profiles in order, and opens the first file found.

use std::path::{Path, PathBuf};

use libloading::Library;

use crate::config::LibraryConfig;
use crate::error::LibraryError;

/// Shared-library naming convention of a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// `lib<name>.dylib`
    MacOs,
    /// `lib<name>.so`, shared by Linux and the other ELF unixes.
    Elf,
    /// `<name>.dll`
    Windows,
}

impl Platform {
    /// Platform of the running process.
    pub fn current() -> Result<Self, LibraryError> {
        Self::from_os(std::env::consts::OS)
    }

    /// Map an OS name as reported by `std::env::consts::OS`.
    pub fn from_os(os: &str) -> Result<Self, LibraryError> {
        match os {
            "macos" | "ios" => Ok(Self::MacOs),
            "linux" | "android" | "freebsd" | "netbsd" | "openbsd" | "dragonfly" => Ok(Self::Elf),
            "windows" => Ok(Self::Windows),
            other => Err(LibraryError::UnsupportedPlatform {
                os: other.to_string(),
            }),
        }
    }

    /// Platform-qualified file name for a logical library name.
    pub fn library_filename(&self, name: &str) -> String {
        match self {
            Self::MacOs => format!("lib{}.dylib", name),
            Self::Elf => format!("lib{}.so", name),
            Self::Windows => format!("{}.dll", name),
        }
    }
}

/// An opened native library.
///
/// Owns the loader handle; the library stays mapped until this value (or the
/// binding built from it) is dropped or explicitly closed.
#[derive(Debug)]
pub struct LibraryHandle {
    path: PathBuf,
    library: Library,
}

impl LibraryHandle {
    /// Open the library at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LibraryError> {
        let path = path.as_ref().to_path_buf();

        // SAFETY: loading runs the library's initialisers. The path comes from
        // the resolver's search of our own build output.
        let library = unsafe { Library::new(&path) }.map_err(|e| LibraryError::LoadFailed {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        tracing::info!(path = %path.display(), "Loaded native library");
        Ok(Self { path, library })
    }

    /// Path the library was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn library(&self) -> &Library {
        &self.library
    }

    pub(crate) fn into_parts(self) -> (PathBuf, Library) {
        (self.path, self.library)
    }

    /// Unload the library now instead of at drop.
    pub fn close(self) -> Result<(), LibraryError> {
        let (path, library) = self.into_parts();
        close_library(path, library)
    }
}

pub(crate) fn close_library(path: PathBuf, library: Library) -> Result<(), LibraryError> {
    library.close().map_err(|e| LibraryError::CloseFailed {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    tracing::debug!(path = %path.display(), "Closed native library");
    Ok(())
}

/// Locates the native library for the current platform.
#[derive(Debug, Clone)]
pub struct LibraryResolver {
    platform: Platform,
    search_root: PathBuf,
    profiles: Vec<String>,
}

impl LibraryResolver {
    /// Resolver for the running platform.
    pub fn new(config: &LibraryConfig) -> Result<Self, LibraryError> {
        Ok(Self::with_platform(Platform::current()?, config))
    }

    /// Resolver for an explicit platform.
    pub fn with_platform(platform: Platform, config: &LibraryConfig) -> Self {
        let search_root = if config.search_root.is_absolute() {
            config.search_root.clone()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(&config.search_root))
                .unwrap_or_else(|_| config.search_root.clone())
        };

        Self {
            platform,
            search_root,
            profiles: config.profiles.clone(),
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Candidate paths for `name`, in search order.
    pub fn candidates(&self, name: &str) -> Vec<PathBuf> {
        let filename = self.platform.library_filename(name);
        self.profiles
            .iter()
            .map(|profile| self.search_root.join(profile).join(&filename))
            .collect()
    }

    /// First existing candidate path for `name`.
    pub fn locate(&self, name: &str) -> Result<PathBuf, LibraryError> {
        let candidates = self.candidates(name);

        if let Some(found) = candidates.iter().find(|path| path.is_file()) {
            tracing::debug!(path = %found.display(), "Located native library");
            return Ok(found.clone());
        }

        Err(LibraryError::NotFound {
            filename: self.platform.library_filename(name),
            candidates,
        })
    }

    /// Locate and open the library for `name`.
    pub fn resolve(&self, name: &str) -> Result<LibraryHandle, LibraryError> {
        let path = self.locate(name)?;
        LibraryHandle::open(path)
    }
}
