// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Trial records, aggregation, speedups, and the persisted report schema.
//!
//! Durations stay as [`Duration`] while aggregating and are converted to
//! milliseconds only in the serialized report.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fibffi_core::{BenchmarkConfig, ImplementationKind, MarshalingError};
use serde::{Deserialize, Serialize};
use sysinfo::System;
use uuid::Uuid;

/// Call shape under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CallMode {
    /// One value per call.
    Scalar,
    /// `size` copies of the input per call.
    Batch { size: usize },
}

impl CallMode {
    /// Number of values computed per call.
    pub fn values_per_call(&self) -> usize {
        match self {
            Self::Scalar => 1,
            Self::Batch { size } => *size,
        }
    }
}

impl std::fmt::Display for CallMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallMode::Scalar => write!(f, "scalar"),
            CallMode::Batch { size } => write!(f, "batch_{}", size),
        }
    }
}

/// One measured timing sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialRecord {
    /// Caller wall time around the whole call, marshaling included.
    pub total: Duration,
    /// Time the callee reported for its own computation.
    pub internal: Option<Duration>,
    /// Values computed by the call.
    pub values_per_call: usize,
}

impl TrialRecord {
    /// `internal > total` breaks the decomposition law.
    pub fn is_anomalous(&self) -> bool {
        self.internal.is_some_and(|internal| internal > self.total)
    }

    /// `(total - internal) / values_per_call`, when internal time is known.
    ///
    /// Anomalous records yield zero rather than a negative overhead.
    pub fn ffi_overhead_per_call(&self) -> Option<Duration> {
        let internal = self.internal?;
        let per_call = u32::try_from(self.values_per_call.max(1)).unwrap_or(u32::MAX);
        Some(self.total.saturating_sub(internal) / per_call)
    }
}

/// Result of one measured iteration.
#[derive(Debug)]
pub enum TrialOutcome {
    Completed(TrialRecord),
    Failed {
        iteration: u64,
        error: MarshalingError,
    },
}

impl TrialOutcome {
    fn is_anomaly(&self) -> bool {
        match self {
            Self::Completed(record) => record.is_anomalous(),
            Self::Failed { error, .. } => {
                matches!(error, MarshalingError::InternalExceedsTotal { .. })
            }
        }
    }
}

/// Arithmetic mean. `None` for an empty input.
pub fn mean_duration<I>(samples: I) -> Option<Duration>
where
    I: IntoIterator<Item = Duration>,
{
    let (sum, count) = samples
        .into_iter()
        .fold((0u128, 0u128), |(sum, count), d| (sum + d.as_nanos(), count + 1));
    if count == 0 {
        return None;
    }
    let mean = sum / count;
    Some(Duration::from_nanos(u64::try_from(mean).unwrap_or(u64::MAX)))
}

/// Milliseconds as a float, the unit of the persisted report.
pub fn as_millis_f64(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Latency distribution of the successful trials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyMetrics {
    pub min_ns: u64,
    pub max_ns: u64,
    pub mean_ns: f64,
    /// Median (p50)
    pub median_ns: u64,
    pub p95_ns: u64,
    pub p99_ns: u64,
    pub std_dev_ns: f64,
}

impl LatencyMetrics {
    /// Calculate metrics from latency samples. `None` for no samples.
    pub fn from_durations(samples: &[Duration]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut samples: Vec<u64> = samples
            .iter()
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
            .collect();
        samples.sort_unstable();
        let len = samples.len();

        let mean_ns = samples.iter().map(|&x| x as f64).sum::<f64>() / len as f64;
        let variance = samples
            .iter()
            .map(|&x| {
                let diff = x as f64 - mean_ns;
                diff * diff
            })
            .sum::<f64>()
            / len as f64;

        Some(Self {
            min_ns: samples[0],
            max_ns: samples[len - 1],
            mean_ns,
            median_ns: samples[len / 2],
            p95_ns: samples[((len as f64 * 0.95) as usize).min(len - 1)],
            p99_ns: samples[((len as f64 * 0.99) as usize).min(len - 1)],
            std_dev_ns: variance.sqrt(),
        })
    }

    /// Format latency in human-readable form (auto-selects ns/μs/ms/s).
    pub fn format_latency(ns: u64) -> String {
        if ns < 1_000 {
            format!("{}ns", ns)
        } else if ns < 1_000_000 {
            format!("{:.2}μs", ns as f64 / 1_000.0)
        } else if ns < 1_000_000_000 {
            format!("{:.2}ms", ns as f64 / 1_000_000.0)
        } else {
            format!("{:.2}s", ns as f64 / 1_000_000_000.0)
        }
    }

    /// [`LatencyMetrics::format_latency`] for a `Duration`.
    pub fn format_duration(d: Duration) -> String {
        Self::format_latency(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }
}

/// Aggregated measurements for one implementation at one input size.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateResult {
    pub implementation: ImplementationKind,
    pub input_size: u32,
    pub mode: CallMode,
    /// Measured iterations attempted.
    pub iterations: u64,
    pub successful: u64,
    pub failed: u64,
    /// Trials whose internal time exceeded their total time.
    pub anomalies: u64,
    pub mean_total: Option<Duration>,
    /// Mean over the trials that reported internal time.
    pub mean_internal: Option<Duration>,
    pub mean_ffi_overhead_per_call: Option<Duration>,
    /// F(input_size) as computed by this implementation.
    pub value: Option<u128>,
    /// False if any returned element, in any trial, differed from `value`.
    pub values_consistent: bool,
    pub latency: Option<LatencyMetrics>,
    pub last_error: Option<String>,
}

impl AggregateResult {
    /// Aggregate the outcomes of the measured iterations.
    ///
    /// Failed trials count towards `failed` only; they never enter a mean.
    pub fn from_outcomes(
        implementation: ImplementationKind,
        input_size: u32,
        mode: CallMode,
        outcomes: &[TrialOutcome],
        value: Option<u128>,
    ) -> Self {
        let records: Vec<&TrialRecord> = outcomes
            .iter()
            .filter_map(|o| match o {
                TrialOutcome::Completed(record) => Some(record),
                TrialOutcome::Failed { .. } => None,
            })
            .collect();
        let totals: Vec<Duration> = records.iter().map(|r| r.total).collect();

        let last_error = outcomes.iter().rev().find_map(|o| match o {
            TrialOutcome::Failed { iteration, error } => {
                Some(format!("iteration {}: {}", iteration, error))
            }
            TrialOutcome::Completed(_) => None,
        });

        Self {
            implementation,
            input_size,
            mode,
            iterations: outcomes.len() as u64,
            successful: records.len() as u64,
            failed: (outcomes.len() - records.len()) as u64,
            anomalies: outcomes.iter().filter(|o| o.is_anomaly()).count() as u64,
            mean_total: mean_duration(totals.iter().copied()),
            mean_internal: mean_duration(records.iter().filter_map(|r| r.internal)),
            mean_ffi_overhead_per_call: mean_duration(
                records.iter().filter_map(|r| r.ffi_overhead_per_call()),
            ),
            value,
            values_consistent: true,
            latency: LatencyMetrics::from_durations(&totals),
            last_error,
        }
    }

    fn to_entry(&self) -> TimingEntry {
        TimingEntry {
            total_time: self.mean_total.map(as_millis_f64),
            internal_time: self.mean_internal.map(as_millis_f64),
            ffi_overhead_per_call: self.mean_ffi_overhead_per_call.map(as_millis_f64),
            iterations: self.iterations,
            successful: self.successful,
            failed: self.failed,
            anomalies: self.anomalies,
            value: self.value,
            values_consistent: self.values_consistent,
            latency: self.latency.clone(),
            last_error: self.last_error.clone(),
        }
    }
}

/// Relative speed of two implementations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Speedup {
    pub faster: ImplementationKind,
    pub slower: ImplementationKind,
    /// `slower_mean / faster_mean`, always ≥ 1.
    pub ratio: f64,
}

impl Speedup {
    /// Compare two mean times. `None` if either is zero.
    ///
    /// Symmetric: the argument order does not change the result.
    pub fn between(a: (ImplementationKind, Duration), b: (ImplementationKind, Duration)) -> Option<Self> {
        if a.1.is_zero() || b.1.is_zero() {
            return None;
        }
        let (faster, slower) = if a.1 <= b.1 { (a, b) } else { (b, a) };
        Some(Self {
            faster: faster.0,
            slower: slower.0,
            ratio: slower.1.as_secs_f64() / faster.1.as_secs_f64(),
        })
    }

    /// Speedup of the mean total times of two aggregates.
    pub fn of_totals(a: &AggregateResult, b: &AggregateResult) -> Option<Self> {
        Self::between(
            (a.implementation, a.mean_total?),
            (b.implementation, b.mean_total?),
        )
    }
}

/// `numerator / denominator`; reciprocal when the arguments are swapped.
pub fn relative(numerator: Duration, denominator: Duration) -> Option<f64> {
    if denominator.is_zero() {
        return None;
    }
    Some(numerator.as_secs_f64() / denominator.as_secs_f64())
}

/// System information captured at benchmark time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub os_version: String,
    pub kernel_version: Option<String>,
    pub cpu_model: String,
    pub cpu_cores: usize,
    pub memory_bytes: u64,
}

impl SystemInfo {
    /// Collect current system information.
    pub fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu();
        sys.refresh_memory();

        Self {
            os: System::name().unwrap_or_else(|| "Unknown".to_string()),
            os_version: System::os_version().unwrap_or_else(|| "Unknown".to_string()),
            kernel_version: System::kernel_version(),
            cpu_model: sys
                .cpus()
                .first()
                .map(|cpu| cpu.brand().to_string())
                .unwrap_or_else(|| "Unknown".to_string()),
            cpu_cores: sys.cpus().len(),
            memory_bytes: sys.total_memory(),
        }
    }
}

/// Per-implementation timings at one input size, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingEntry {
    pub total_time: Option<f64>,
    pub internal_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ffi_overhead_per_call: Option<f64>,
    pub iterations: u64,
    pub successful: u64,
    pub failed: u64,
    pub anomalies: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<u128>,
    #[serde(default = "consistent_by_default")]
    pub values_consistent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<LatencyMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

fn consistent_by_default() -> bool {
    true
}

/// Everything measured at one input size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeReport {
    pub input_size: u32,
    pub implementations: BTreeMap<ImplementationKind, TimingEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speedup: Option<Speedup>,
    /// Whether every implementation computed the same value, every time.
    pub values_agree: bool,
}

impl SizeReport {
    /// Build from the aggregates of every implementation at one size.
    pub fn from_aggregates(input_size: u32, aggregates: &[AggregateResult]) -> Self {
        let implementations = aggregates
            .iter()
            .map(|a| (a.implementation, a.to_entry()))
            .collect();

        let speedup = match aggregates {
            [a, b] => Speedup::of_totals(a, b),
            _ => None,
        };

        let mut values = aggregates.iter().filter_map(|a| a.value);
        let values_agree = aggregates.iter().all(|a| a.values_consistent)
            && match values.next() {
                Some(first) => values.all(|v| v == first),
                None => true,
            };

        Self {
            input_size,
            implementations,
            speedup,
            values_agree,
        }
    }
}

/// Complete benchmark run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub benchmark_suite: String,
    pub version: String,
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub system_info: SystemInfo,
    pub mode: CallMode,
    pub iterations: u64,
    pub input_sizes: Vec<u32>,
    pub results: Vec<SizeReport>,
}

impl BenchmarkReport {
    /// Create an empty report for a run.
    pub fn new(config: &BenchmarkConfig, mode: CallMode) -> Self {
        Self {
            benchmark_suite: "fibffi-benchmarks".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            run_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            system_info: SystemInfo::collect(),
            mode,
            iterations: config.iterations,
            input_sizes: Vec::new(),
            results: Vec::new(),
        }
    }

    /// Add the aggregates of one input size.
    pub fn add_size(&mut self, input_size: u32, aggregates: &[AggregateResult]) {
        self.input_sizes.push(input_size);
        self.results
            .push(SizeReport::from_aggregates(input_size, aggregates));
    }

    /// Total failed trials across all sizes and implementations.
    pub fn failed_trials(&self) -> u64 {
        self.results
            .iter()
            .flat_map(|r| r.implementations.values())
            .map(|e| e.failed)
            .sum()
    }

    /// Total anomalous trials across all sizes and implementations.
    pub fn anomalies(&self) -> u64 {
        self.results
            .iter()
            .flat_map(|r| r.implementations.values())
            .map(|e| e.anomalies)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn record(total: Duration, internal: Option<Duration>) -> TrialOutcome {
        TrialOutcome::Completed(TrialRecord {
            total,
            internal,
            values_per_call: 1,
        })
    }

    #[test]
    fn test_mean_of_constant_is_constant() {
        let v = Duration::from_nanos(123_456);
        for k in 1..20 {
            assert_eq!(mean_duration(std::iter::repeat(v).take(k)), Some(v));
        }
    }

    #[test]
    fn test_mean_of_two_four_six() {
        assert_eq!(mean_duration([ms(2), ms(4), ms(6)]), Some(ms(4)));
        assert_eq!(mean_duration(Vec::new()), None);
    }

    #[test]
    fn test_internal_mean_only_over_reporting_trials() {
        let outcomes = vec![
            record(ms(10), Some(ms(2))),
            record(ms(20), None),
            record(ms(30), Some(ms(4))),
        ];
        let agg = AggregateResult::from_outcomes(
            ImplementationKind::Native,
            10,
            CallMode::Scalar,
            &outcomes,
            Some(55),
        );

        assert_eq!(agg.mean_total, Some(ms(20)));
        assert_eq!(agg.mean_internal, Some(ms(3)));
        assert_eq!(agg.successful, 3);
    }

    #[test]
    fn test_failed_trials_excluded_and_counted() {
        let outcomes = vec![
            record(ms(2), None),
            TrialOutcome::Failed {
                iteration: 2,
                error: MarshalingError::NullResult { call: "compute_batch" },
            },
            record(ms(6), None),
        ];
        let agg = AggregateResult::from_outcomes(
            ImplementationKind::Native,
            5,
            CallMode::Scalar,
            &outcomes,
            None,
        );

        assert_eq!(agg.iterations, 3);
        assert_eq!(agg.failed, 1);
        assert_eq!(agg.mean_total, Some(ms(4)));
        assert!(agg.last_error.unwrap().starts_with("iteration 2:"));
    }

    #[test]
    fn test_anomaly_flagged() {
        let anomalous = TrialRecord {
            total: ms(1),
            internal: Some(ms(5)),
            values_per_call: 1,
        };
        assert!(anomalous.is_anomalous());
        assert_eq!(anomalous.ffi_overhead_per_call(), Some(Duration::ZERO));

        let agg = AggregateResult::from_outcomes(
            ImplementationKind::Native,
            1,
            CallMode::Scalar,
            &[TrialOutcome::Completed(anomalous)],
            Some(1),
        );
        assert_eq!(agg.anomalies, 1);
    }

    #[test]
    fn test_ffi_overhead_per_call() {
        let record = TrialRecord {
            total: ms(12),
            internal: Some(ms(2)),
            values_per_call: 5,
        };
        assert_eq!(record.ffi_overhead_per_call(), Some(ms(2)));
        assert!(!record.is_anomalous());
    }

    #[test]
    fn test_speedup_symmetric_and_at_least_one() {
        let a = (ImplementationKind::Reference, ms(8));
        let b = (ImplementationKind::Native, ms(2));

        let ab = Speedup::between(a, b).unwrap();
        let ba = Speedup::between(b, a).unwrap();
        assert_eq!(ab, ba);
        assert_eq!(ab.faster, ImplementationKind::Native);
        assert_eq!(ab.slower, ImplementationKind::Reference);
        assert!((ab.ratio - 4.0).abs() < 1e-12);
        assert!(ab.ratio >= 1.0);

        let tie = Speedup::between(a, (ImplementationKind::Native, ms(8))).unwrap();
        assert_eq!(tie.ratio, 1.0);
        assert!(Speedup::between(a, (ImplementationKind::Native, Duration::ZERO)).is_none());
    }

    #[test]
    fn test_relative_is_reciprocal() {
        let x = relative(ms(3), ms(7)).unwrap();
        let y = relative(ms(7), ms(3)).unwrap();
        assert!((x * y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_latency_metrics_from_samples() {
        let samples: Vec<Duration> = (1..=10).map(|i| Duration::from_nanos(i * 100)).collect();
        let metrics = LatencyMetrics::from_durations(&samples).unwrap();

        assert_eq!(metrics.min_ns, 100);
        assert_eq!(metrics.max_ns, 1000);
        assert_eq!(metrics.median_ns, 600);
        assert!((metrics.mean_ns - 550.0).abs() < 0.01);
        assert!(LatencyMetrics::from_durations(&[]).is_none());
    }

    #[test]
    fn test_latency_format() {
        assert_eq!(LatencyMetrics::format_latency(500), "500ns");
        assert_eq!(LatencyMetrics::format_latency(1500), "1.50μs");
        assert_eq!(LatencyMetrics::format_latency(1_500_000), "1.50ms");
        assert_eq!(LatencyMetrics::format_latency(1_500_000_000), "1.50s");
    }

    #[test]
    fn test_size_report_flags_disagreement() {
        let reference = AggregateResult::from_outcomes(
            ImplementationKind::Reference,
            10,
            CallMode::Scalar,
            &[record(ms(4), None)],
            Some(55),
        );
        let mut native = AggregateResult::from_outcomes(
            ImplementationKind::Native,
            10,
            CallMode::Scalar,
            &[record(ms(2), Some(ms(1)))],
            Some(55),
        );

        let report = SizeReport::from_aggregates(10, &[reference.clone(), native.clone()]);
        assert!(report.values_agree);
        assert_eq!(report.speedup.unwrap().faster, ImplementationKind::Native);

        native.value = Some(56);
        let pair = [reference.clone(), native.clone()];
        assert!(!SizeReport::from_aggregates(10, &pair).values_agree);

        native.value = Some(55);
        native.values_consistent = false;
        assert!(!SizeReport::from_aggregates(10, &[reference, native]).values_agree);
    }

    #[test]
    fn test_report_serialization_schema() {
        let mut report = BenchmarkReport::new(&BenchmarkConfig::default(), CallMode::Scalar);
        let agg = AggregateResult::from_outcomes(
            ImplementationKind::Native,
            10,
            CallMode::Scalar,
            &[record(ms(2), Some(ms(1)))],
            Some(55),
        );
        report.add_size(10, &[agg]);

        let json: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(json["input_sizes"], serde_json::json!([10]));
        let native = &json["results"][0]["implementations"]["native"];
        assert!((native["total_time"].as_f64().unwrap() - 2.0).abs() < 1e-9);
        assert!((native["internal_time"].as_f64().unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(json["mode"]["kind"], "scalar");
    }
}
