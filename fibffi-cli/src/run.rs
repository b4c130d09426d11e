// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! A single run of one or both implementations, and its printed summary.

use std::fmt::Write as _;
use std::time::Duration;

use fibffi_benchmark::metrics::{as_millis_f64, relative};
use fibffi_benchmark::{AggregateResult, BenchmarkHarness, CallMode, HarnessError, Speedup};
use fibffi_core::{
    ffi, BenchError, BenchmarkConfig, Implementation, ImplementationKind, NativeImplementation,
    ReferenceImplementation,
};
use thiserror::Error;
use tracing::{debug, info};

/// Errors that end a CLI run with exit code 1.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Bench(#[from] BenchError),

    #[error(transparent)]
    Harness(#[from] HarnessError),

    #[error("Every {implementation} trial failed; last error: {last_error}")]
    NoSuccessfulTrials {
        implementation: ImplementationKind,
        last_error: String,
    },
}

/// What to run, resolved from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub name: String,
    pub number: u32,
    pub native: bool,
    pub reference: bool,
    pub mode: CallMode,
    pub iterations: u64,
}

impl RunOptions {
    /// Fold the options into the loaded configuration and validate the result.
    pub fn apply(&self, config: &mut BenchmarkConfig) -> Result<(), BenchError> {
        config.input_sizes = vec![self.number];
        config.iterations = self.iterations;
        config.label = self.name.clone();
        if let CallMode::Batch { size } = self.mode {
            config.batch_size = size;
        }
        config.validate()?;
        Ok(())
    }
}

/// Aggregates of whichever implementations ran.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub native: Option<AggregateResult>,
    pub reference: Option<AggregateResult>,
}

/// Run the selected implementations against the validated configuration.
pub fn execute(options: &RunOptions, config: &BenchmarkConfig) -> Result<RunSummary, CliError> {
    debug!(
        name = %options.name,
        number = options.number,
        mode = %options.mode,
        iterations = options.iterations,
        native = options.native,
        reference = options.reference,
        "Resolved run options"
    );
    let harness = BenchmarkHarness::from_config(config);
    let mut summary = RunSummary::default();

    if options.native {
        info!(library = %config.library.name, "Loading native implementation");
        let library = ffi::load(&config.library).map_err(BenchError::from)?;
        let native = NativeImplementation::new(&library);
        summary.native = Some(measure_one(&harness, &native, options)?);
        drop(native);
        library.close().map_err(BenchError::from)?;
        info!("Closed native library");
    }

    if options.reference {
        info!("Running reference implementation");
        summary.reference = Some(measure_one(&harness, &ReferenceImplementation, options)?);
    }

    Ok(summary)
}

/// Measure one implementation, failing when no trial succeeded.
pub fn measure_one(
    harness: &BenchmarkHarness,
    implementation: &dyn Implementation,
    options: &RunOptions,
) -> Result<AggregateResult, CliError> {
    let aggregate = harness.measure_size(implementation, options.mode, options.number)?;
    if aggregate.successful == 0 {
        return Err(CliError::NoSuccessfulTrials {
            implementation: aggregate.implementation,
            last_error: aggregate
                .last_error
                .clone()
                .unwrap_or_else(|| "no trials ran".to_string()),
        });
    }
    Ok(aggregate)
}

fn ms(d: Duration) -> String {
    format!("{:.6} ms", as_millis_f64(d))
}

fn per_call(d: Duration, size: usize) -> Duration {
    d / u32::try_from(size.max(1)).unwrap_or(u32::MAX)
}

/// Human-readable summary of a run.
pub fn render(options: &RunOptions, summary: &RunSummary) -> String {
    let mut out = String::new();

    if let Some(native) = &summary.native {
        let total = native.mean_total.unwrap_or_default();
        match options.mode {
            CallMode::Scalar => {
                if let Some(value) = native.value {
                    let _ = writeln!(
                        out,
                        "Hello {}! The {}th Fibonacci number is: {}",
                        options.name, options.number, value
                    );
                }
                if let Some(internal) = native.mean_internal {
                    let _ = writeln!(out, "Native internal time: {}", ms(internal));
                }
                let _ = writeln!(out, "Total time (including FFI): {}", ms(total));
            }
            CallMode::Batch { size } => {
                let _ = writeln!(out, "Batch Results:");
                if let Some(internal) = native.mean_internal {
                    let _ = writeln!(out, "Internal calculation time: {}", ms(internal));
                }
                let _ = writeln!(out, "Total time (including FFI): {}", ms(total));
                let _ = writeln!(
                    out,
                    "Average time per calculation: {}",
                    ms(per_call(total, size))
                );
                if let Some(overhead) = native.mean_ffi_overhead_per_call {
                    let _ = writeln!(out, "FFI overhead per call: {}", ms(overhead));
                }
            }
        }
        if native.failed > 0 || native.anomalies > 0 {
            let _ = writeln!(
                out,
                "Failed trials: {}, anomalies: {}",
                native.failed, native.anomalies
            );
        }
    }

    if let Some(reference) = &summary.reference {
        let total = reference.mean_total.unwrap_or_default();
        match options.mode {
            CallMode::Scalar => {
                if let Some(value) = reference.value {
                    let _ = writeln!(
                        out,
                        "Hello {}! The {}th Fibonacci number is: {}",
                        options.name, options.number, value
                    );
                }
                let _ = writeln!(out, "Reference total time: {}", ms(total));
            }
            CallMode::Batch { size } => {
                let _ = writeln!(out, "\nReference Batch Results:");
                let _ = writeln!(out, "Total time: {}", ms(total));
                let _ = writeln!(
                    out,
                    "Average time per calculation: {}",
                    ms(per_call(total, size))
                );
            }
        }
    }

    if let (Some(native), Some(reference)) = (&summary.native, &summary.reference) {
        render_comparison(&mut out, native, reference);
    }

    out
}

fn render_comparison(out: &mut String, native: &AggregateResult, reference: &AggregateResult) {
    if let (Some(internal), Some(total)) = (native.mean_internal, reference.mean_total) {
        let _ = writeln!(out, "\nComparison (native internal vs reference total):");
        if internal < total {
            if let Some(ratio) = relative(total, internal) {
                let _ = writeln!(
                    out,
                    "Native internal calculation was {:.3}x faster than reference",
                    ratio
                );
            }
        } else if let Some(ratio) = relative(internal, total) {
            let _ = writeln!(
                out,
                "Reference was {:.3}x faster than native internal calculation",
                ratio
            );
        }
    }

    if let Some(speedup) = Speedup::of_totals(native, reference) {
        let _ = writeln!(
            out,
            "Total time: {} was {:.3}x faster than {}",
            speedup.faster, speedup.ratio, speedup.slower
        );
    }

    if native.value != reference.value {
        let _ = writeln!(
            out,
            "WARNING: results differ (native {:?}, reference {:?})",
            native.value, reference.value
        );
    }
    for aggregate in [native, reference] {
        if !aggregate.values_consistent {
            let _ = writeln!(
                out,
                "WARNING: {} returned differing values across calls",
                aggregate.implementation
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fibffi_core::ffi::stub::TrackingStub;

    fn options(mode: CallMode) -> RunOptions {
        RunOptions {
            name: "Ferris".to_string(),
            number: 10,
            native: true,
            reference: true,
            mode,
            iterations: 2,
        }
    }

    fn harness() -> BenchmarkHarness {
        BenchmarkHarness::new().warmup(0).iterations(2).label("Ferris")
    }

    #[test]
    fn test_apply_overrides_config() {
        let mut config = BenchmarkConfig::default();
        options(CallMode::Batch { size: 7 }).apply(&mut config).unwrap();

        assert_eq!(config.input_sizes, vec![10]);
        assert_eq!(config.iterations, 2);
        assert_eq!(config.batch_size, 7);
        assert_eq!(config.label, "Ferris");
    }

    #[test]
    fn test_apply_rejects_out_of_range_number() {
        let mut config = BenchmarkConfig::default();
        let mut opts = options(CallMode::Scalar);
        opts.number = 500;
        assert!(matches!(
            opts.apply(&mut config),
            Err(BenchError::Validation(_))
        ));
    }

    #[test]
    fn test_scalar_summary_with_comparison() {
        let stub = TrackingStub::new();
        let native = NativeImplementation::new(&stub);
        let opts = options(CallMode::Scalar);

        let summary = RunSummary {
            native: Some(measure_one(&harness(), &native, &opts).unwrap()),
            reference: Some(measure_one(&harness(), &ReferenceImplementation, &opts).unwrap()),
        };
        let text = render(&opts, &summary);

        assert!(text.starts_with("Hello Ferris! The 10th Fibonacci number is: 55\n"));
        assert!(text.contains("Total time (including FFI): "));
        assert!(text.contains("Reference total time: "));
        assert!(text.contains("Comparison (native internal vs reference total):"));
        assert!(!text.contains("WARNING"));
        stub.assert_balanced();
    }

    #[test]
    fn test_batch_summary() {
        let stub = TrackingStub::new();
        let native = NativeImplementation::new(&stub);
        let opts = RunOptions {
            reference: false,
            ..options(CallMode::Batch { size: 10 })
        };

        let summary = RunSummary {
            native: Some(measure_one(&harness(), &native, &opts).unwrap()),
            reference: None,
        };
        let text = render(&opts, &summary);

        assert!(text.starts_with("Batch Results:\n"));
        assert!(text.contains("Internal calculation time: "));
        assert!(text.contains("Average time per calculation: "));
        assert!(text.contains("FFI overhead per call: "));
        assert!(!text.contains("Comparison"));
    }

    #[test]
    fn test_inconsistent_values_are_flagged() {
        let stub = TrackingStub::new();
        let native = NativeImplementation::new(&stub);
        let opts = options(CallMode::Batch { size: 4 });

        let mut native_result = measure_one(&harness(), &native, &opts).unwrap();
        native_result.values_consistent = false;
        let summary = RunSummary {
            native: Some(native_result),
            reference: Some(measure_one(&harness(), &ReferenceImplementation, &opts).unwrap()),
        };
        let text = render(&opts, &summary);

        assert!(text.contains("WARNING: native returned differing values across calls"));
        assert!(!text.contains("reference returned differing"));
    }

    #[test]
    fn test_all_trials_failing_is_an_error() {
        let stub = TrackingStub::new().return_null(true);
        let native = NativeImplementation::new(&stub);

        let err = measure_one(&harness(), &native, &options(CallMode::Scalar)).unwrap_err();
        assert!(matches!(
            err,
            CliError::NoSuccessfulTrials {
                implementation: ImplementationKind::Native,
                ..
            }
        ));
    }
}
