//! wdtctl - Watchdog Supervisor CLI
//!
//! Inspects the calibrated bounds of a watchdog counter and runs the
//! supervisor against simulated hardware.

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod commands;
mod error;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::CliError;

#[derive(Parser)]
#[command(name = "wdtctl")]
#[command(about = "Watchdog Supervisor CLI - Inspect timeout bounds and simulate supervision")]
#[command(version)]
#[command(long_about = "
wdtctl drives the hardware watchdog supervisor against a simulated counter.
It reports the timeout bounds a counter of the given frequency and width can
support, clamps requested timeouts, and replays ping and escalation scenarios
on virtual time.

Use --json flag for machine-readable output suitable for scripting.
")]
struct Cli {
    /// Output format (human-readable or JSON)
    #[arg(
        long,
        global = true,
        help = "Output in JSON format for machine parsing"
    )]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Counter tick frequency in Hz
    #[arg(long, global = true, env = "WDTCTL_FREQUENCY", default_value_t = 166_000_000)]
    frequency: u64,

    /// Counter width in bits
    #[arg(long, global = true, default_value_t = 32)]
    bits: u32,

    /// Supervisor settings file (JSON)
    #[arg(long, global = true, env = "WDTCTL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show calibrated bounds and supervisor state
    Info,

    /// Clamp a requested timeout against the calibrated bounds
    Clamp {
        /// Requested timeout in seconds
        seconds: f64,
    },

    /// Supervise a simulated counter with periodic pings
    Simulate {
        /// Timeout in seconds for User mode
        #[arg(long, default_value_t = 2.0)]
        timeout: f64,

        /// Ping interval in seconds; omit to never ping
        #[arg(long)]
        ping_every: Option<f64>,

        /// Virtual time to run, in seconds
        #[arg(long, default_value_t = 10.0)]
        duration: f64,
    },

    /// Replay the escalation path with a restart attempt that never completes
    Escalate {
        /// Timeout in seconds for User mode
        #[arg(long, default_value_t = 2.0)]
        timeout: f64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("wdtctl={log_level},wdt_supervisor={log_level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    match execute_command(&cli) {
        Ok(()) => Ok(()),
        Err(e) => {
            if cli.json {
                output::print_error_json(&e);
            } else {
                output::print_error_human(&e);
            }

            let exit_code = e.downcast_ref::<CliError>().map_or(1, CliError::exit_code);
            std::process::exit(exit_code);
        }
    }
}

fn execute_command(cli: &Cli) -> Result<()> {
    let target = commands::Target::load(cli.frequency, cli.bits, cli.config.as_deref())
        .context("Failed to load supervisor settings")?;

    match &cli.command {
        Commands::Info => commands::info::show_info(&target, cli.json),
        Commands::Clamp { seconds } => commands::info::clamp(&target, *seconds, cli.json),
        Commands::Simulate {
            timeout,
            ping_every,
            duration,
        } => commands::simulate::run(&target, *timeout, *ping_every, *duration, cli.json),
        Commands::Escalate { timeout } => commands::simulate::escalate(&target, *timeout, cli.json),
    }
}
