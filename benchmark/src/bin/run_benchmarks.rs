// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI tool to run the full comparison suite and generate reports.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use fibffi_benchmark::{render_table, BenchmarkHarness, BenchmarkReport, CallMode, JsonReporter};
use fibffi_core::{
    ffi, BenchError, ConfigLoader, Implementation, NativeImplementation, ReferenceImplementation,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "run_benchmarks")]
#[command(about = "Compare the reference and native Fibonacci implementations")]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory for benchmark data
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of measured iterations for each input size
    #[arg(short, long)]
    iterations: Option<u64>,

    /// Input sizes to test, comma separated
    #[arg(short, long, value_delimiter = ',')]
    sizes: Option<Vec<u32>>,

    /// Also run in batch mode
    #[arg(long)]
    batch: bool,

    /// Values per batch call
    #[arg(long)]
    batch_size: Option<usize>,

    /// Run in quick mode (fewer iterations)
    #[arg(long)]
    quick: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let mut config = ConfigLoader::load_or_default(args.config.as_deref())
        .context("failed to load configuration")?;
    if let Some(output) = args.output {
        config.output_dir = output;
    }
    if let Some(iterations) = args.iterations {
        config.iterations = iterations;
    }
    if args.quick {
        config.iterations = config.iterations.min(10);
    }
    if let Some(sizes) = args.sizes {
        config.input_sizes = sizes;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    config
        .validate()
        .map_err(BenchError::from)
        .context("invalid benchmark options")?;

    println!("fibffi Benchmark Suite");
    println!("======================");
    println!("Output directory: {:?}", config.output_dir);
    println!("Iterations: {}", config.iterations);
    println!("Input sizes: {:?}", config.input_sizes);
    println!();

    let library = ffi::load(&config.library)
        .map_err(BenchError::from)
        .context("failed to load native library")?;
    let native = NativeImplementation::new(&library);
    let implementations: [&dyn Implementation; 2] = [&ReferenceImplementation, &native];

    let harness = BenchmarkHarness::from_config(&config);
    let reporter = JsonReporter::new(&config.output_dir)?;

    let mut modes = vec![CallMode::Scalar];
    if args.batch {
        modes.push(CallMode::Batch {
            size: config.batch_size,
        });
    }

    let mut mismatches = Vec::new();
    for mode in modes {
        println!("Running {} benchmarks...", mode);
        let mut report = BenchmarkReport::new(&config, mode);
        for size in harness.run_suite(&implementations, &config.input_sizes, mode)? {
            report.add_size(size.input_size, &size.aggregates);
        }

        println!();
        print!("{}", render_table(&report));

        let path = reporter.save(&report)?;
        println!();
        println!("Benchmark report saved to: {:?}", path);
        println!();

        mismatches.extend(
            report
                .results
                .iter()
                .filter(|r| !r.values_agree)
                .map(|r| (mode, r.input_size)),
        );
    }

    drop(native);
    library
        .close()
        .map_err(BenchError::from)
        .context("failed to close native library")?;

    if !mismatches.is_empty() {
        anyhow::bail!("implementations disagree at {:?}", mismatches);
    }
    Ok(())
}
