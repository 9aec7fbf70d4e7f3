//! Compute grid agent CLI
//!
//! A command-line tool for inspecting a worker agent's capacity and
//! managing the container jobs it runs.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{capacity, containers, health};
use std::time::Duration;

/// Compute grid agent CLI
#[derive(Parser)]
#[command(name = "gridctl")]
#[command(author, version, about = "CLI for the compute grid worker agent", long_about = None)]
pub struct Cli {
    /// Agent URL (can also be set via GRIDCTL_AGENT_URL or the config file)
    #[arg(long, env = "GRIDCTL_AGENT_URL")]
    pub agent_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Request timeout in seconds (ignored by `run --wait`)
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show current and theoretical capacity
    Load,

    /// Drive the host to a target CPU load
    Stress {
        /// Target load percentage (0-100)
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..=100))]
        percent: u32,

        /// How long to hold the load, in seconds
        #[arg(long)]
        duration: u64,
    },

    /// Launch a container job
    Run {
        /// Image to run
        image: String,

        /// Environment variable for the job (KEY=VALUE, repeatable)
        #[arg(long, short)]
        env: Vec<String>,

        /// Block until the job exits and print its JSON output
        #[arg(long)]
        wait: bool,
    },

    /// List containers on the agent
    Containers,

    /// Stop and remove every container on the agent
    Reclaim,

    /// Show agent health
    Health,
}

async fn execute(cli: Cli) -> Result<()> {
    let config = config::Config::load()?;
    let agent_url = config.resolve_agent_url(cli.agent_url);

    // Waited runs last as long as the job does
    let timeout = match &cli.command {
        Commands::Run { wait: true, .. } => None,
        _ => Some(Duration::from_secs(cli.timeout)),
    };
    let client = client::ApiClient::new(&agent_url, timeout)?;

    match cli.command {
        Commands::Load => capacity::show_load(&client, cli.format).await?,
        Commands::Stress { percent, duration } => {
            capacity::start_stress(&client, percent, duration, cli.format).await?;
        }
        Commands::Run { image, env, wait } => {
            containers::run_job(&client, &image, &env, wait, cli.format).await?;
        }
        Commands::Containers => containers::list_containers(&client, cli.format).await?,
        Commands::Reclaim => containers::reclaim(&client, cli.format).await?,
        Commands::Health => health::show_health(&client, cli.format).await?,
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = execute(cli).await {
        output::print_error(&format!("{:#}", err));
        std::process::exit(1);
    }
}
