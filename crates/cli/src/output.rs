//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print any value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a table from a list of rows
pub fn print_table<T: Tabled>(rows: Vec<T>) {
    if rows.is_empty() {
        println!("{}", "No items found".yellow());
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a GiB figure, dropping to MiB below one GiB
pub fn format_gib(gib: f64) -> String {
    if gib >= 1.0 {
        format!("{:.2}Gi", gib)
    } else {
        format!("{:.0}Mi", gib * 1024.0)
    }
}

/// Format a FLOPS figure with a decimal SI prefix
pub fn format_flops(flops: f64) -> String {
    const UNITS: &[(f64, &str)] = &[(1e12, "TFLOPS"), (1e9, "GFLOPS"), (1e6, "MFLOPS")];

    for (scale, unit) in UNITS {
        if flops >= *scale {
            return format!("{:.2} {}", flops / scale, unit);
        }
    }
    format!("{:.0} FLOPS", flops)
}

/// Format a clock frequency in MHz as GHz
pub fn format_mhz(mhz: f64) -> String {
    format!("{:.2} GHz", mhz / 1000.0)
}

/// Format a percentage, colored by how much headroom it leaves
pub fn color_load(load_percent: f64) -> String {
    let formatted = format!("{:.1}%", load_percent);
    if load_percent >= 90.0 {
        formatted.red().to_string()
    } else if load_percent >= 60.0 {
        formatted.yellow().to_string()
    } else {
        formatted.green().to_string()
    }
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "running" => status.green().to_string(),
        "created" => status.blue().to_string(),
        "degraded" | "exited" => status.yellow().to_string(),
        "unhealthy" | "removed" => status.red().to_string(),
        _ => status.to_string(),
    }
}
