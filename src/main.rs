//! # fabricsim - Simulator Entry Point
//!
//! This is the main entry point for the `fabricsim` architectural
//! interconnect simulator. The binary orchestrates a single tick-driven run
//! of a topology built either from:
//! - A small built-in example (one compute unit issuing reads through a
//!   read bus to a memory), or
//! - A dynamically loaded configuration library (a `cdylib` exposing
//!   `extern "C" fn build(&mut Topology)`).
//!
//! ## Architecture Overview
//!
//! The main function performs these key operations:
//! 1. **Initialize logging**: Sets up structured logging with tracing
//! 2. **Parse arguments**: Processes command-line configuration
//! 3. **Build the topology**: Either the built-in demo or a loaded config
//! 4. **Run the simulation**: Drives the tick loop to completion
//! 5. **Report results**: Prints the topology, a metrics summary, and
//!    optionally writes the summary to a JSON file
//!
//! ## Error Handling
//!
//! Construction-time failures (bad config library, malformed topology) exit
//! with a nonzero status rather than panicking; see the `cli` module docs
//! for the exact exit code contract.
//!
//! ## Concurrency Model
//!
//! There is no async runtime here: the simulation kernel is single-threaded
//! and cooperative, ticking one component at a time in a fixed phase order.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{filter::LevelFilter, prelude::*, Layer};

use fabricsim::buffer_pool::BufferPool;
use fabricsim::cli::Args;
use fabricsim::metrics::Metrics;
use fabricsim::trace::{ConsoleTracer, TraceOptions, Tracer};
use fabricsim::{builtin, config, display, Simulator};

mod logging;
use logging::ColorizedFormatter;

fn main() -> ExitCode {
    let args = Args::parse();

    // Configure logging level based on verbosity flags.
    // This level applies to both the log file and stdout.
    // - default: WARN
    // -v: INFO
    // -vv: DEBUG
    // -vvv and more: TRACE
    let log_level = match args.verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let guard;
    let detailed_log_layer;

    if let Some("stderr") | None = args.log_file.as_deref() {
        detailed_log_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(log_level)
            .boxed();
        guard = None;
    } else {
        let path_str = args.log_file.as_deref().unwrap();
        let log_path = std::path::Path::new(path_str);
        let log_dir = log_path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let log_filename = log_path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("fabricsim.log"));
        let file_appender = tracing_appender::rolling::never(log_dir, log_filename);
        let (non_blocking_writer, file_guard) = tracing_appender::non_blocking(file_appender);
        detailed_log_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_ansi(false)
            .with_filter(log_level)
            .boxed();
        guard = Some(file_guard);
    }

    // User-facing output to stdout, only when not --quiet.
    let stdout_log = if !args.quiet {
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .event_format(ColorizedFormatter)
                .with_filter(log_level),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(detailed_log_layer)
        .with(stdout_log)
        .init();
    let _log_guard = guard;

    info!("starting fabricsim");

    let mut sim = match &args.config {
        None => {
            info!("no config provided, running built-in example topology");
            builtin::default_topology()
        }
        Some(path) => {
            if !path.exists() {
                error!("config file '{}' does not exist", path.display());
                return ExitCode::from(2);
            }
            match config::load_topology(path) {
                Ok(topology) => Simulator::new(topology, BufferPool::new(), Metrics::default()),
                Err(e) => {
                    error!("failed to load config '{}': {}", path.display(), e);
                    return ExitCode::from(1);
                }
            }
        }
    };

    if args.trace {
        let options = TraceOptions {
            verbose: args.trace_every == 0,
            every_n: args.trace_every,
            queues: args.trace_queues,
            links: args.trace_links,
            show_empty: args.trace_show_empty,
        };
        let tracer: Box<dyn Tracer> = Box::new(ConsoleTracer::new(options));
        sim.set_tracer(Some(tracer));
    }

    if !args.quiet {
        display::show_topology(&sim.topology);
    }

    sim.run(args.max_ticks, args.until_quiescent);

    info!(
        ticks = sim.ticks,
        messages_delivered = sim.metrics.messages_delivered,
        bytes_transferred = sim.metrics.bytes_transferred,
        "run complete"
    );

    if !args.quiet {
        println!("{}", serde_json::to_string_pretty(&sim.metrics.summary()).unwrap_or_default());
    }

    if let Some(output_path) = &args.output {
        if let Err(e) = write_summary(output_path, &sim.metrics) {
            error!("{e:#}");
            return ExitCode::from(1);
        }
    }

    ExitCode::SUCCESS
}

/// Serialize the metrics summary and write it to `path`, the way a benchmark
/// run's results manager persists its final report. `anyhow::Context` names
/// which path failed without the caller needing its own error variant.
fn write_summary(path: &std::path::Path, metrics: &fabricsim::metrics::Metrics) -> anyhow::Result<()> {
    let body = serde_json::to_string_pretty(&metrics.summary()).context("serializing metrics summary")?;
    std::fs::write(path, body).with_context(|| format!("writing output summary to '{}'", path.display()))
}
