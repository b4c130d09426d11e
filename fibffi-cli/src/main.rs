// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! fibffi CLI
//!
//! Computes one Fibonacci number with the reference implementation, the
//! native library, or both, and prints how long each took.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use fibffi_benchmark::CallMode;
use fibffi_core::ConfigLoader;
use tracing_subscriber::EnvFilter;

mod run;

use run::{CliError, RunOptions};

/// fibffi - reference vs native Fibonacci across a C-ABI boundary
#[derive(Parser, Debug)]
#[command(name = "fibffi")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Name to greet
    #[arg(short = 'n', long, default_value = "friend")]
    pub name: String,

    /// Fibonacci number to calculate
    #[arg(short = 'N', long, default_value_t = 10)]
    pub number: u32,

    /// Use the native implementation
    #[arg(long, visible_alias = "rust")]
    pub native: bool,

    /// Use the reference implementation (default if neither is given)
    #[arg(long, visible_alias = "ruby")]
    pub reference: bool,

    /// Run batch mode
    #[arg(long)]
    pub batch: bool,

    /// Batch size for testing
    #[arg(long, default_value_t = 10)]
    pub batch_size: usize,

    /// Measured iterations per implementation
    #[arg(short, long, default_value_t = 1)]
    pub iterations: u64,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn run_options(&self) -> RunOptions {
        let reference = self.reference || !self.native;
        RunOptions {
            name: self.name.clone(),
            number: self.number,
            native: self.native,
            reference,
            mode: if self.batch {
                CallMode::Batch {
                    size: self.batch_size,
                }
            } else {
                CallMode::Scalar
            },
            iterations: self.iterations,
        }
    }
}

fn execute(cli: &Cli) -> Result<String, CliError> {
    let mut config = ConfigLoader::load_or_default(cli.config.as_deref())?;
    let options = cli.run_options();
    options.apply(&mut config)?;

    let summary = run::execute(&options, &config)?;
    Ok(run::render(&options, &summary))
}

fn report_error(err: &dyn std::error::Error) {
    eprintln!("Error: {}", err);
    let mut source = err.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {}", cause);
        source = cause.source();
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match execute(&cli) {
        Ok(summary) => {
            print!("{}", summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}
