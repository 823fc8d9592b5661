//! Output formatting for CLI responses

use anyhow::{Error, Result};
use colored::Colorize;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use wdt_supervisor::{ConfigurationWarning, SupervisorMode, TimeoutOutcome, WatchdogInfo};

use crate::commands::simulate::{EscalationReport, SimulationReport};

/// Print error in JSON format
pub fn print_error_json(error: &Error) {
    let error_json = json!({
        "success": false,
        "error": {
            "message": error.to_string(),
        }
    });
    match serde_json::to_string_pretty(&error_json) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("Failed to format error as JSON: {e}"),
    }
}

/// Print error in human-readable format
pub fn print_error_human(error: &Error) {
    eprintln!("{} {}", "Error:".red().bold(), error);

    let mut source = error.source();
    while let Some(err) = source {
        eprintln!("  {} {}", "Caused by:".yellow(), err);
        source = err.source();
    }
}

fn print_json(key: &str, value: &impl Serialize) -> Result<()> {
    let mut output = serde_json::Map::new();
    output.insert("success".to_string(), json!(true));
    output.insert(key.to_string(), serde_json::to_value(value)?);
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn secs(duration: Duration) -> String {
    format!("{:.2}s", duration.as_secs_f64())
}

pub fn print_info(info: &WatchdogInfo, json: bool) -> Result<()> {
    if json {
        return print_json("info", info);
    }

    let mode = match info.mode {
        SupervisorMode::Auto => info.mode.as_str().green(),
        SupervisorMode::User => info.mode.as_str().yellow(),
    };
    println!("{}", info.identity.bold());
    println!("  Tick frequency: {} Hz", info.tick_frequency);
    println!("  Counter width:  {} bits", info.counter_bits);
    println!("  Min timeout:    {}", secs(info.min_timeout));
    println!("  Max timeout:    {}", secs(info.max_timeout));
    println!("  Timeout:        {}", secs(info.current_timeout));
    println!("  Mode:           {mode}");
    println!("  Stop policy:    {:?}", info.stop_policy);
    println!(
        "  Magic close:    {}",
        if info.options.magic_close { "yes" } else { "no" }
    );
    Ok(())
}

pub fn print_clamp(
    requested: Duration,
    outcome: &TimeoutOutcome,
    info: &WatchdogInfo,
    json: bool,
) -> Result<()> {
    let warning = outcome.warning.map(|w| match w {
        ConfigurationWarning::BelowMinimum { .. } => "below_minimum",
        ConfigurationWarning::AboveMaximum { .. } => "above_maximum",
    });

    if json {
        let value = json!({
            "requested": requested.as_secs_f64(),
            "applied": outcome.applied.as_secs_f64(),
            "min_timeout": info.min_timeout.as_secs_f64(),
            "max_timeout": info.max_timeout.as_secs_f64(),
            "warning": warning,
        });
        return print_json("clamp", &value);
    }

    match outcome.warning {
        Some(w) => println!("{} {}", "Clamped:".yellow().bold(), w),
        None => println!("{} {}", "Accepted:".green().bold(), secs(outcome.applied)),
    }
    println!(
        "  Range: {} .. {}",
        secs(info.min_timeout),
        secs(info.max_timeout)
    );
    Ok(())
}

pub fn print_simulation(report: &SimulationReport, json: bool) -> Result<()> {
    if json {
        return print_json("simulation", report);
    }

    println!("{}", "Simulation:".bold());
    println!("  Timeout:          {:.2}s", report.timeout_secs);
    match report.ping_every_secs {
        Some(p) => println!("  Ping every:       {p:.2}s"),
        None => println!("  Ping every:       never"),
    }
    println!("  Elapsed:          {:.2}s", report.elapsed_secs);
    println!("  Pings:            {}", report.pings);
    println!("  Expiries:         {}", report.expiries);
    println!("  Restart attempts: {}", report.restart_attempts);
    if report.halted {
        println!(
            "  {}",
            "Secondary hardware reset fired".red().bold()
        );
    } else if report.expiries == 0 {
        println!("  {}", "Watchdog never expired".green());
    }
    Ok(())
}

pub fn print_escalation(report: &EscalationReport, json: bool) -> Result<()> {
    if json {
        let value = json!({
            "timeout_secs": report.timeout_secs,
            "expiry_at_secs": report.expiry_at_secs,
            "restart_attempts": report.restart_attempts,
            "hardware_reset_at_secs": report.hardware_reset_at_secs,
            "fallback_delay_secs": report.fallback_delay_secs(),
        });
        return print_json("escalation", &value);
    }

    println!("{}", "Escalation:".bold());
    println!("  Timeout:          {:.2}s", report.timeout_secs);
    match report.expiry_at_secs {
        Some(t) => println!("  Expiry at:        {t:.2}s"),
        None => println!("  Expiry at:        {}", "never".yellow()),
    }
    println!(
        "  Restart attempts: {} (never completed)",
        report.restart_attempts
    );
    match report.hardware_reset_at_secs {
        Some(t) => println!("  {} at {t:.2}s", "Hardware reset".red().bold()),
        None => println!("  Hardware reset:   {}", "did not fire".yellow()),
    }
    if let Some(delay) = report.fallback_delay_secs() {
        println!("  Fallback delay:   {delay:.2}s");
    }
    Ok(())
}
