// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML configuration parser with strict validation.
//!
//! Run parameters are validated once at startup. Any invalid field results in
//! a ValidationError that prevents the benchmark from starting.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, BenchResult, ValidationError};
use crate::reference::MAX_INDEX;

/// Default native library logical name (the `fibffi-native` crate).
pub const DEFAULT_LIBRARY_NAME: &str = "fibffi_native";

/// What to do when a callee reports more internal time than the caller
/// observed around the whole call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyPolicy {
    /// Keep the trial, flag it, and count it in the report.
    #[default]
    Log,
    /// Record the trial as failed and exclude it from the means.
    Reject,
}

/// Raw benchmark section as parsed from YAML (before validation).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBenchmarkSection {
    #[serde(default = "default_input_sizes")]
    input_sizes: Vec<u32>,
    #[serde(default = "default_iterations")]
    iterations: u64,
    #[serde(default = "default_warmup_iterations")]
    warmup_iterations: u64,
    #[serde(default = "default_batch_size")]
    batch_size: usize,
    #[serde(default = "default_label")]
    label: String,
    #[serde(default)]
    anomaly_policy: AnomalyPolicy,
}

fn default_input_sizes() -> Vec<u32> {
    vec![10, 20, 40, 80, 100]
}

fn default_iterations() -> u64 {
    1000
}

fn default_warmup_iterations() -> u64 {
    1
}

fn default_batch_size() -> usize {
    10
}

fn default_label() -> String {
    "Benchmark".to_string()
}

impl Default for RawBenchmarkSection {
    fn default() -> Self {
        Self {
            input_sizes: default_input_sizes(),
            iterations: default_iterations(),
            warmup_iterations: default_warmup_iterations(),
            batch_size: default_batch_size(),
            label: default_label(),
            anomaly_policy: AnomalyPolicy::default(),
        }
    }
}

/// Raw library section.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLibrarySection {
    #[serde(default = "default_library_name")]
    name: String,
    #[serde(default = "default_search_root")]
    search_root: String,
    #[serde(default = "default_profiles")]
    profiles: Vec<String>,
}

fn default_library_name() -> String {
    DEFAULT_LIBRARY_NAME.to_string()
}

fn default_search_root() -> String {
    "target".to_string()
}

fn default_profiles() -> Vec<String> {
    vec!["release".to_string(), "debug".to_string()]
}

impl Default for RawLibrarySection {
    fn default() -> Self {
        Self {
            name: default_library_name(),
            search_root: default_search_root(),
            profiles: default_profiles(),
        }
    }
}

/// Raw root configuration file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    benchmark: RawBenchmarkSection,
    #[serde(default)]
    library: RawLibrarySection,
    #[serde(default = "default_output_dir")]
    output_dir: String,
}

fn default_output_dir() -> String {
    "data".to_string()
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            benchmark: RawBenchmarkSection::default(),
            library: RawLibrarySection::default(),
            output_dir: default_output_dir(),
        }
    }
}

/// Where to look for the native library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryConfig {
    /// Logical name, without platform prefix or suffix.
    pub name: String,
    /// Build output directory containing one subdirectory per profile.
    pub search_root: PathBuf,
    /// Profiles to search, in order.
    pub profiles: Vec<String>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            name: default_library_name(),
            search_root: PathBuf::from(default_search_root()),
            profiles: default_profiles(),
        }
    }
}

/// Validated, immutable run parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkConfig {
    pub input_sizes: Vec<u32>,
    pub iterations: u64,
    pub warmup_iterations: u64,
    pub batch_size: usize,
    /// Text label passed to the scalar native call.
    pub label: String,
    pub anomaly_policy: AnomalyPolicy,
    pub library: LibraryConfig,
    /// Directory JSON reports are written to.
    pub output_dir: PathBuf,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            input_sizes: default_input_sizes(),
            iterations: default_iterations(),
            warmup_iterations: default_warmup_iterations(),
            batch_size: default_batch_size(),
            label: default_label(),
            anomaly_policy: AnomalyPolicy::default(),
            library: LibraryConfig::default(),
            output_dir: PathBuf::from(default_output_dir()),
        }
    }
}

impl BenchmarkConfig {
    /// Check every invariant the harness relies on.
    ///
    /// Callers that override fields after loading must call this again.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.input_sizes.is_empty() {
            return Err(ValidationError::EmptyList {
                field: "input_sizes",
            });
        }
        if let Some(&size) = self.input_sizes.iter().find(|&&n| n > MAX_INDEX) {
            return Err(ValidationError::InputSizeOutOfRange {
                size,
                max: MAX_INDEX,
            });
        }

        if self.iterations == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "iterations",
                value: "0".to_string(),
                reason: "At least one measured iteration is required".to_string(),
            });
        }

        if self.batch_size == 0 || self.batch_size > i32::MAX as usize {
            return Err(ValidationError::InvalidFieldValue {
                field: "batch_size",
                value: self.batch_size.to_string(),
                reason: format!("Must be between 1 and {}", i32::MAX),
            });
        }

        if self.label.contains('\0') {
            return Err(ValidationError::InvalidFieldValue {
                field: "label",
                value: self.label.escape_debug().to_string(),
                reason: "Label cannot contain NUL bytes".to_string(),
            });
        }

        if self.library.name.is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "library.name",
                value: String::new(),
                reason: "Library name cannot be empty".to_string(),
            });
        }
        if self.library.profiles.is_empty() {
            return Err(ValidationError::EmptyList {
                field: "library.profiles",
            });
        }

        Ok(())
    }
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    pub fn load_file(path: impl AsRef<Path>) -> BenchResult<BenchmarkConfig> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(BenchError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| BenchError::Io {
            context: "reading config file",
            source: e,
        })?;

        Self::load_string(&content)
    }

    /// Load from `path` if given, otherwise use validated defaults.
    ///
    /// An explicitly requested file that does not exist is an error.
    pub fn load_or_default(path: Option<&Path>) -> BenchResult<BenchmarkConfig> {
        match path {
            Some(path) => Self::load_file(path),
            None => {
                let config = BenchmarkConfig::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Load and validate configuration from a YAML string.
    pub fn load_string(content: &str) -> BenchResult<BenchmarkConfig> {
        let raw: RawConfig = if content.trim().is_empty() {
            RawConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| BenchError::ConfigParse {
                message: format!("YAML parse error: {}", e),
            })?
        };

        let config = BenchmarkConfig {
            input_sizes: raw.benchmark.input_sizes,
            iterations: raw.benchmark.iterations,
            warmup_iterations: raw.benchmark.warmup_iterations,
            batch_size: raw.benchmark.batch_size,
            label: raw.benchmark.label,
            anomaly_policy: raw.benchmark.anomaly_policy,
            library: LibraryConfig {
                name: raw.library.name,
                search_root: PathBuf::from(raw.library.search_root),
                profiles: raw.library.profiles,
            },
            output_dir: PathBuf::from(raw.output_dir),
        };
        config.validate()?;

        Ok(config)
    }
}
