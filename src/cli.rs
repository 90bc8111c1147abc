//! # Command-line interface
//!
//! Argument parsing for the `fabricsim` binary. The simulator
//! either runs a small built-in example topology or dynamically loads a
//! user-supplied topology library; tracing and logging verbosity are
//! controlled the same way across both paths.

use std::path::PathBuf;

use clap::{
    builder::styling::{AnsiColor, Styles},
    Parser,
};

/// Defines the styles for the help message to replicate clap v3's appearance.
fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Yellow.on_default())
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// fabricsim - a discrete-event architectural/interconnect simulator.
///
/// Runs a tick-driven simulation of memories, buses, links, and processing
/// elements either from a built-in example topology or from a dynamically
/// loaded configuration library.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None, styles = styles())]
pub struct Args {
    /// Path to a shared library exposing `extern "C" fn build(&mut Topology)`.
    ///
    /// If omitted, a small built-in example topology runs instead (one
    /// compute unit issuing reads through a read bus to a memory).
    pub config: Option<PathBuf>,

    /// Maximum number of ticks to run.
    #[arg(long, default_value_t = 200)]
    pub max_ticks: u64,

    /// Stop early once the simulation is quiescent (no queue or link has
    /// anything left to move).
    #[arg(long)]
    pub until_quiescent: bool,

    /// Enable per-tick tracing.
    #[arg(long, help_heading = "Tracing")]
    pub trace: bool,

    /// Emit a progress summary line every N ticks (0 disables).
    #[arg(long, default_value_t = 0, help_heading = "Tracing")]
    pub trace_every: u64,

    /// Include per-resource queue depths in the trace output.
    #[arg(long, requires = "trace", help_heading = "Tracing")]
    pub trace_queues: bool,

    /// Include per-link pipeline occupancy in the trace output.
    #[arg(long, requires = "trace", help_heading = "Tracing")]
    pub trace_links: bool,

    /// When tracing queues/links, also show entries that are empty.
    #[arg(long, help_heading = "Tracing")]
    pub trace_show_empty: bool,

    /// Silence all user-facing informational output on stdout.
    #[arg(short = 'q', long, help_heading = "Output and Logging")]
    pub quiet: bool,

    /// Increase diagnostic log verbosity on stderr.
    ///
    /// Can be used multiple times to increase detail:
    ///  -v: info
    ///  -vv: debug
    ///  -vvv: trace
    /// By default, only WARNING and ERROR messages are shown.
    #[arg(short, long, action = clap::ArgAction::Count, help_heading = "Output and Logging")]
    pub verbose: u8,

    /// Write diagnostic logs to this file instead of (or in addition to)
    /// stderr. Pass "stderr" to force stderr-only even under `--quiet`.
    #[arg(long, help_heading = "Output and Logging")]
    pub log_file: Option<String>,

    /// Write the final metrics summary as JSON to this path.
    #[arg(short = 'o', long, help_heading = "Output and Logging")]
    pub output: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn default_max_ticks_is_200() {
        let args = Args::parse_from(["fabricsim"]);
        assert_eq!(args.max_ticks, 200);
        assert!(args.config.is_none());
    }

    #[test]
    fn verbose_flag_counts_repetitions() {
        let args = Args::parse_from(["fabricsim", "-vvv"]);
        assert_eq!(args.verbose, 3);
    }

    #[test]
    fn config_path_is_positional() {
        let args = Args::parse_from(["fabricsim", "demo.so", "--max-ticks", "50"]);
        assert_eq!(args.config, Some(PathBuf::from("demo.so")));
        assert_eq!(args.max_ticks, 50);
    }
}
