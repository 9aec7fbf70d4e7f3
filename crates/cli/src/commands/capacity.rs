//! Capacity and synthetic load commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, LoadReport};
use crate::output::{
    color_load, format_flops, format_gib, format_mhz, print_json, print_success, print_table,
    print_warning, OutputFormat,
};

#[derive(Tabled)]
struct CapacityRow {
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Load")]
    load: String,
    #[tabled(rename = "Total")]
    total: String,
    #[tabled(rename = "Available")]
    available: String,
    #[tabled(rename = "Available %")]
    available_percent: String,
}

fn capacity_rows(report: &LoadReport) -> Vec<CapacityRow> {
    let mut rows = vec![CapacityRow {
        device: "cpu".to_string(),
        load: color_load(report.cpu_load),
        total: format_flops(report.total_flops),
        available: format_flops(report.available_flops),
        available_percent: format!("{:.1}%", report.available_flops_percentage),
    }];

    if let Some(gpu) = &report.gpu {
        rows.push(CapacityRow {
            device: "gpu".to_string(),
            load: format!("{} ({})", color_load(gpu.gpu_load), gpu.gpu_load_source),
            total: format_flops(gpu.total_flops),
            available: format_flops(gpu.available_flops),
            available_percent: format!("{:.1}%", gpu.available_flops_percentage),
        });
    }

    rows
}

/// Show current and theoretical capacity
pub async fn show_load(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let report = client.load().await?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            println!("{}", "Host Capacity".bold());
            println!("{}", "=".repeat(60));
            println!("Clock:         {}", format_mhz(report.current_freq).cyan());
            println!("Available RAM: {}", format_gib(report.available_ram).cyan());
            println!();

            print_table(capacity_rows(&report));

            if let Some(gpu) = &report.gpu {
                if gpu.gpu_load_source == "cpu_proxy" {
                    print_warning("GPU load is estimated from CPU load, not measured");
                }
            }
        }
    }

    Ok(())
}

/// Start the load generator on the agent
pub async fn start_stress(
    client: &ApiClient,
    percent: u32,
    duration_secs: u64,
    format: OutputFormat,
) -> Result<()> {
    let container_id = client.stress(percent, duration_secs).await?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({ "container_id": container_id }))?,
        OutputFormat::Table => {
            print_success(&format!(
                "Load generator started at {}% for {}s",
                percent, duration_secs
            ));
            println!("Container: {}", container_id.cyan());
        }
    }

    Ok(())
}
