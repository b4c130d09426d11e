// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Report output: timestamped JSON files and a plain-text comparison table.

use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use fibffi_core::ImplementationKind;
use thiserror::Error;

use crate::metrics::{BenchmarkReport, LatencyMetrics, TimingEntry};

/// Errors that can occur during report generation.
#[derive(Debug, Error)]
pub enum ReporterError {
    #[error("Failed to access report directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// JSON reporter for benchmark results.
pub struct JsonReporter {
    /// Output directory for benchmark data
    output_dir: PathBuf,
}

impl JsonReporter {
    /// Create a new JSON reporter with the specified output directory.
    pub fn new(output_dir: impl AsRef<Path>) -> Result<Self, ReporterError> {
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir)?;
        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Save a benchmark report to a JSON file.
    ///
    /// Returns the path to the created file.
    pub fn save(&self, report: &BenchmarkReport) -> Result<PathBuf, ReporterError> {
        let timestamp = report.timestamp.format("%Y-%m-%dT%H-%M-%SZ");
        let run = report.run_id.simple().to_string();
        let filename = format!("{}_{}_{}.json", report.mode, timestamp, &run[..8]);
        let filepath = self.output_dir.join(&filename);

        let file = File::create(&filepath)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, report)?;

        tracing::info!(path = %filepath.display(), "Saved benchmark report");
        Ok(filepath)
    }

    /// List all existing benchmark files in the output directory.
    pub fn list_reports(&self) -> Result<Vec<PathBuf>, ReporterError> {
        let mut reports = Vec::new();
        for entry in fs::read_dir(&self.output_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                reports.push(path);
            }
        }
        reports.sort();
        Ok(reports)
    }

    /// Load an existing benchmark report from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<BenchmarkReport, ReporterError> {
        let file = File::open(path)?;
        let report = serde_json::from_reader(file)?;
        Ok(report)
    }
}

fn cell(entry: Option<&TimingEntry>, pick: fn(&TimingEntry) -> Option<f64>) -> String {
    entry
        .and_then(pick)
        .map(|ms| LatencyMetrics::format_latency((ms * 1_000_000.0) as u64))
        .unwrap_or_else(|| "-".to_string())
}

/// Render the per-size comparison as an aligned text table.
pub fn render_table(report: &BenchmarkReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>6}  {:>12}  {:>12}  {:>12}  {:>12}  {:>18}",
        "n", "reference", "native", "internal", "ffi/call", "speedup"
    );

    for size in &report.results {
        let reference = size.implementations.get(&ImplementationKind::Reference);
        let native = size.implementations.get(&ImplementationKind::Native);
        let speedup = size
            .speedup
            .map(|s| format!("{} {:.2}x", s.faster, s.ratio))
            .unwrap_or_else(|| "-".to_string());

        let _ = writeln!(
            out,
            "{:>6}  {:>12}  {:>12}  {:>12}  {:>12}  {:>18}{}",
            size.input_size,
            cell(reference, |e| e.total_time),
            cell(native, |e| e.total_time),
            cell(native, |e| e.internal_time),
            cell(native, |e| e.ffi_overhead_per_call),
            speedup,
            if size.values_agree { "" } else { "  MISMATCH" },
        );
    }

    let failed = report.failed_trials();
    let anomalies = report.anomalies();
    if failed > 0 || anomalies > 0 {
        let _ = writeln!(out, "failed trials: {}, anomalies: {}", failed, anomalies);
    }
    out
}
