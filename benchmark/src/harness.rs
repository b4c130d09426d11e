// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Benchmark harness for timing implementations.
//!
//! For every input size the harness runs `Warmup → Measuring(1..=N) →
//! Aggregated`. Each measured trial brackets the whole call, marshaling
//! included, with [`Instant`], and keeps the callee's own internal time when
//! it reports one.

use std::time::{Duration, Instant};

use fibffi_core::{
    AnomalyPolicy, BenchmarkConfig, Computation, Implementation, ImplementationKind,
    MarshalingError,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::metrics::{AggregateResult, CallMode, TrialOutcome, TrialRecord};

/// Errors from driving the phase machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HarnessError {
    #[error("Invalid phase transition from {from} to {to}")]
    InvalidTransition { from: TrialPhase, to: TrialPhase },
}

/// Where a per-size run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialPhase {
    /// Untimed calls whose results are discarded.
    Warmup,
    /// Timed trial `iteration` of the configured count (1-based).
    Measuring { iteration: u64 },
    /// All trials done; only aggregation remains.
    Aggregated,
}

impl TrialPhase {
    /// Whether `target` directly follows `self` for a run of `iterations`.
    pub fn can_transition_to(&self, target: TrialPhase, iterations: u64) -> bool {
        match (self, target) {
            (Self::Warmup, Self::Measuring { iteration }) => iteration == 1 && iterations >= 1,
            (Self::Warmup, Self::Aggregated) => iterations == 0,
            (Self::Measuring { iteration: from }, Self::Measuring { iteration: to }) => {
                to == from + 1 && to <= iterations
            }
            (Self::Measuring { iteration }, Self::Aggregated) => *iteration == iterations,
            _ => false,
        }
    }

    /// The phase that follows `self`, or `None` once aggregated.
    pub fn next(&self, iterations: u64) -> Option<TrialPhase> {
        match self {
            Self::Warmup if iterations == 0 => Some(Self::Aggregated),
            Self::Warmup => Some(Self::Measuring { iteration: 1 }),
            Self::Measuring { iteration } if *iteration < iterations => Some(Self::Measuring {
                iteration: iteration + 1,
            }),
            Self::Measuring { .. } => Some(Self::Aggregated),
            Self::Aggregated => None,
        }
    }
}

impl std::fmt::Display for TrialPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Warmup => write!(f, "Warmup"),
            Self::Measuring { iteration } => write!(f, "Measuring({})", iteration),
            Self::Aggregated => write!(f, "Aggregated"),
        }
    }
}

/// Tracks the phase of one per-size run and rejects invalid transitions.
#[derive(Debug)]
pub struct PhaseTracker {
    implementation: ImplementationKind,
    input_size: u32,
    iterations: u64,
    current: TrialPhase,
}

impl PhaseTracker {
    pub fn new(implementation: ImplementationKind, input_size: u32, iterations: u64) -> Self {
        Self {
            implementation,
            input_size,
            iterations,
            current: TrialPhase::Warmup,
        }
    }

    pub fn current(&self) -> TrialPhase {
        self.current
    }

    /// Attempt to move to `target`.
    pub fn transition_to(&mut self, target: TrialPhase) -> Result<(), HarnessError> {
        if !self.current.can_transition_to(target, self.iterations) {
            return Err(HarnessError::InvalidTransition {
                from: self.current,
                to: target,
            });
        }

        debug!(
            implementation = %self.implementation,
            input_size = self.input_size,
            from = %self.current,
            to = %target,
            "Phase transition"
        );
        self.current = target;
        Ok(())
    }

    /// Move to the phase that follows the current one.
    pub fn advance(&mut self) -> Result<TrialPhase, HarnessError> {
        let target = self
            .current
            .next(self.iterations)
            .ok_or(HarnessError::InvalidTransition {
                from: self.current,
                to: self.current,
            })?;
        self.transition_to(target)?;
        Ok(target)
    }
}

/// Measure the execution time of a closure.
pub fn measure<F, T>(f: F) -> (T, Duration)
where
    F: FnOnce() -> T,
{
    let start = Instant::now();
    let result = f();
    let elapsed = start.elapsed();
    (result, elapsed)
}

/// Aggregates of every implementation at one input size.
#[derive(Debug, Clone)]
pub struct SizeResults {
    pub input_size: u32,
    pub aggregates: Vec<AggregateResult>,
}

/// A benchmark harness for timing implementations against each other.
#[derive(Debug, Clone)]
pub struct BenchmarkHarness {
    /// Number of untimed warm-up calls per input size
    warmup_iterations: u64,
    /// Number of measured trials per input size
    measurement_iterations: u64,
    anomaly_policy: AnomalyPolicy,
    /// Greeting label passed to scalar calls
    label: String,
}

impl BenchmarkHarness {
    /// Create a new benchmark harness with default settings.
    pub fn new() -> Self {
        Self {
            warmup_iterations: 1,
            measurement_iterations: 1,
            anomaly_policy: AnomalyPolicy::default(),
            label: "Benchmark".to_string(),
        }
    }

    /// Harness configured from a validated [`BenchmarkConfig`].
    pub fn from_config(config: &BenchmarkConfig) -> Self {
        Self::new()
            .warmup(config.warmup_iterations)
            .iterations(config.iterations)
            .anomaly_policy(config.anomaly_policy)
            .label(config.label.clone())
    }

    /// Set the number of warmup iterations.
    pub fn warmup(mut self, iterations: u64) -> Self {
        self.warmup_iterations = iterations;
        self
    }

    /// Set the number of measurement iterations.
    pub fn iterations(mut self, iterations: u64) -> Self {
        self.measurement_iterations = iterations;
        self
    }

    pub fn anomaly_policy(mut self, policy: AnomalyPolicy) -> Self {
        self.anomaly_policy = policy;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn measurement_iterations(&self) -> u64 {
        self.measurement_iterations
    }

    /// Perform one call in `mode` and time it.
    ///
    /// Under [`AnomalyPolicy::Reject`] a trial whose internal time exceeds its
    /// total time is returned as [`MarshalingError::InternalExceedsTotal`].
    pub fn run_trial(
        &self,
        implementation: &dyn Implementation,
        mode: CallMode,
        n: u32,
    ) -> Result<(TrialRecord, Computation), MarshalingError> {
        let (computed, total) = match mode {
            CallMode::Scalar => measure(|| implementation.compute_scalar(&self.label, n)),
            CallMode::Batch { size } => {
                let inputs = vec![n; size];
                measure(|| implementation.compute_batch(&inputs))
            }
        };
        let computed = computed?;

        let record = TrialRecord {
            total,
            internal: computed.internal,
            values_per_call: mode.values_per_call(),
        };

        if record.is_anomalous() && self.anomaly_policy == AnomalyPolicy::Reject {
            return Err(MarshalingError::InternalExceedsTotal {
                internal_ns: record.internal.map(|d| d.as_nanos()).unwrap_or_default(),
                total_ns: total.as_nanos(),
            });
        }

        Ok((record, computed))
    }

    /// Run warm-up and measured trials of one implementation at one size.
    ///
    /// Failed trials are logged and counted; they never abort the run.
    pub fn measure_size(
        &self,
        implementation: &dyn Implementation,
        mode: CallMode,
        n: u32,
    ) -> Result<AggregateResult, HarnessError> {
        let kind = implementation.kind();
        let mut tracker = PhaseTracker::new(kind, n, self.measurement_iterations);

        for warmup in 1..=self.warmup_iterations {
            if let Err(error) = self.run_trial(implementation, mode, n) {
                warn!(
                    implementation = %kind,
                    input_size = n,
                    warmup,
                    error = %error,
                    "Warm-up call failed"
                );
            }
        }

        let mut outcomes = Vec::with_capacity(self.measurement_iterations as usize);
        let mut value = None;
        let mut values_consistent = true;

        while let TrialPhase::Measuring { iteration } = tracker.advance()? {
            match self.run_trial(implementation, mode, n) {
                Ok((record, computed)) => {
                    debug!(
                        implementation = %kind,
                        input_size = n,
                        iteration,
                        total_ns = record.total.as_nanos() as u64,
                        internal_ns = record.internal.map(|d| d.as_nanos() as u64),
                        "Trial completed"
                    );
                    if record.is_anomalous() {
                        warn!(
                            implementation = %kind,
                            input_size = n,
                            iteration,
                            "Reported internal time exceeds total time"
                        );
                    }
                    for &v in &computed.values {
                        match value {
                            None => value = Some(v),
                            Some(first) if first != v => {
                                if values_consistent {
                                    warn!(
                                        implementation = %kind,
                                        input_size = n,
                                        iteration,
                                        expected = %first,
                                        got = %v,
                                        "Inconsistent computed values"
                                    );
                                }
                                values_consistent = false;
                            }
                            Some(_) => {}
                        }
                    }
                    outcomes.push(TrialOutcome::Completed(record));
                }
                Err(error) => {
                    warn!(
                        implementation = %kind,
                        input_size = n,
                        iteration,
                        error = %error,
                        "Trial failed"
                    );
                    outcomes.push(TrialOutcome::Failed { iteration, error });
                }
            }
        }

        let mut aggregate = AggregateResult::from_outcomes(kind, n, mode, &outcomes, value);
        aggregate.values_consistent = values_consistent;
        info!(
            implementation = %kind,
            input_size = n,
            mode = %mode,
            successful = aggregate.successful,
            failed = aggregate.failed,
            anomalies = aggregate.anomalies,
            "Aggregated trials"
        );
        Ok(aggregate)
    }

    /// Measure every implementation at every input size, in order.
    pub fn run_suite(
        &self,
        implementations: &[&dyn Implementation],
        input_sizes: &[u32],
        mode: CallMode,
    ) -> Result<Vec<SizeResults>, HarnessError> {
        input_sizes
            .iter()
            .map(|&n| {
                let aggregates = implementations
                    .iter()
                    .map(|imp| self.measure_size(*imp, mode, n))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(SizeResults {
                    input_size: n,
                    aggregates,
                })
            })
            .collect()
    }
}

impl Default for BenchmarkHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fibffi_core::ffi::stub::TrackingStub;
    use fibffi_core::{NativeImplementation, ReferenceImplementation};

    #[test]
    fn test_phase_sequence() {
        let mut phase = TrialPhase::Warmup;
        let mut seen = vec![phase];
        while let Some(next) = phase.next(3) {
            assert!(phase.can_transition_to(next, 3));
            phase = next;
            seen.push(phase);
        }

        assert_eq!(
            seen,
            vec![
                TrialPhase::Warmup,
                TrialPhase::Measuring { iteration: 1 },
                TrialPhase::Measuring { iteration: 2 },
                TrialPhase::Measuring { iteration: 3 },
                TrialPhase::Aggregated,
            ]
        );
    }

    #[test]
    fn test_invalid_transitions() {
        let mut tracker = PhaseTracker::new(ImplementationKind::Reference, 10, 2);

        assert!(tracker.transition_to(TrialPhase::Aggregated).is_err());
        assert!(tracker
            .transition_to(TrialPhase::Measuring { iteration: 2 })
            .is_err());
        assert_eq!(tracker.current(), TrialPhase::Warmup);

        tracker
            .transition_to(TrialPhase::Measuring { iteration: 1 })
            .unwrap();
        assert!(tracker.transition_to(TrialPhase::Warmup).is_err());

        assert_eq!(tracker.advance().unwrap(), TrialPhase::Measuring { iteration: 2 });
        assert_eq!(tracker.advance().unwrap(), TrialPhase::Aggregated);
        assert!(tracker.advance().is_err());
    }

    #[test]
    fn test_measure() {
        let (result, duration) = measure(|| {
            std::thread::sleep(Duration::from_millis(5));
            42
        });

        assert_eq!(result, 42);
        assert!(duration >= Duration::from_millis(5));
    }

    #[test]
    fn test_reference_scalar_run() {
        let harness = BenchmarkHarness::new().warmup(2).iterations(5);
        let agg = harness
            .measure_size(&ReferenceImplementation, CallMode::Scalar, 10)
            .unwrap();

        assert_eq!(agg.implementation, ImplementationKind::Reference);
        assert_eq!(agg.value, Some(55));
        assert_eq!(agg.successful, 5);
        assert_eq!(agg.failed, 0);
        assert!(agg.mean_total.is_some());
        assert_eq!(agg.mean_internal, None);
    }

    #[test]
    fn test_reject_policy_fails_anomalous_trials() {
        let stub = TrackingStub::new().reported_internal(Duration::from_secs(60));
        let native = NativeImplementation::new(&stub);
        let harness = BenchmarkHarness::new()
            .warmup(0)
            .iterations(3)
            .anomaly_policy(AnomalyPolicy::Reject);

        let agg = harness.measure_size(&native, CallMode::Scalar, 20).unwrap();

        assert_eq!(agg.successful, 0);
        assert_eq!(agg.failed, 3);
        assert_eq!(agg.anomalies, 3);
        assert_eq!(agg.mean_total, None);
        drop(native);
        stub.assert_balanced();
    }

    /// Returns F(n) except for one wrong element in the middle of a batch.
    struct SkewedBatch;

    impl Implementation for SkewedBatch {
        fn kind(&self) -> ImplementationKind {
            ImplementationKind::Native
        }

        fn compute_scalar(&self, label: &str, n: u32) -> Result<Computation, MarshalingError> {
            ReferenceImplementation.compute_scalar(label, n)
        }

        fn compute_batch(&self, values: &[u32]) -> Result<Computation, MarshalingError> {
            let mut computed = ReferenceImplementation.compute_batch(values)?;
            if let Some(middle) = computed.values.get_mut(values.len() / 2) {
                *middle += 1;
            }
            Ok(computed)
        }
    }

    #[test]
    fn test_inconsistent_batch_elements_break_agreement() {
        let harness = BenchmarkHarness::new().warmup(0).iterations(2);
        let mode = CallMode::Batch { size: 3 };

        let skewed = harness.measure_size(&SkewedBatch, mode, 5).unwrap();
        assert_eq!(skewed.value, Some(5));
        assert!(!skewed.values_consistent);

        let reference = harness
            .measure_size(&ReferenceImplementation, mode, 5)
            .unwrap();
        assert!(reference.values_consistent);

        let report = crate::metrics::SizeReport::from_aggregates(5, &[reference, skewed]);
        assert!(!report.values_agree);
    }

    #[test]
    fn test_zero_iterations_aggregates_nothing() {
        let harness = BenchmarkHarness::new().warmup(1).iterations(0);
        let agg = harness
            .measure_size(&ReferenceImplementation, CallMode::Scalar, 10)
            .unwrap();

        assert_eq!(agg.iterations, 0);
        assert_eq!(agg.mean_total, None);
    }
}
