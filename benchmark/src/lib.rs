// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! fibffi Benchmarking Framework
//!
//! Times the reference and native Fibonacci implementations under the same
//! contract and splits native time into the callee's own computation and the
//! overhead of crossing the boundary.
//!
//! # Modes
//!
//! - **Scalar**: one value per call, greeting string result
//! - **Batch**: many values per call, JSON result
//!
//! # Data Output
//!
//! Runs are saved as timestamped JSON reports for later comparison.

pub mod harness;
pub mod metrics;
pub mod reporter;

pub use harness::{BenchmarkHarness, HarnessError, PhaseTracker, SizeResults, TrialPhase};
pub use metrics::{
    AggregateResult, BenchmarkReport, CallMode, LatencyMetrics, SizeReport, Speedup, SystemInfo,
    TrialOutcome, TrialRecord,
};
pub use reporter::{render_table, JsonReporter, ReporterError};
