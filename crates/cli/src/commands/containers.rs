//! Container job commands

use anyhow::{bail, Result};
use colored::Colorize;
use std::collections::HashMap;
use tabled::Tabled;

use crate::client::{ApiClient, ApiFailure, Job};
use crate::output::{
    color_status, print_error, print_info, print_json, print_success, print_table, OutputFormat,
};

#[derive(Tabled)]
struct JobRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Image")]
    image: String,
    #[tabled(rename = "Status")]
    status: String,
}

impl From<&Job> for JobRow {
    fn from(job: &Job) -> Self {
        Self {
            id: short_id(&job.id).to_string(),
            image: job.image.clone(),
            status: color_status(&job.status),
        }
    }
}

/// First 12 characters, as `docker ps` shows them
fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

/// Parse `KEY=VALUE` pairs into an environment map
pub fn parse_env_pairs(pairs: &[String]) -> Result<HashMap<String, String>> {
    let mut environment = HashMap::new();
    for pair in pairs {
        match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                environment.insert(key.to_string(), value.to_string());
            }
            _ => bail!("invalid environment entry '{}', expected KEY=VALUE", pair),
        }
    }
    Ok(environment)
}

/// Launch a container job
pub async fn run_job(
    client: &ApiClient,
    image: &str,
    env: &[String],
    wait: bool,
    format: OutputFormat,
) -> Result<()> {
    let environment = parse_env_pairs(env)?;
    if wait {
        print_info(&format!("Waiting for {} to finish...", image));
    }

    let result = client.run(image, &environment, wait).await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            print_success(&format!(
                "Container {} is {}",
                short_id(&result.container_id).cyan(),
                color_status(&result.status)
            ));
            if let Some(code) = result.exit_code {
                println!("Exit code: {}", code);
            }
            if wait {
                println!("{}", serde_json::to_string_pretty(&result.logs)?);
            }
        }
    }

    Ok(())
}

/// List containers known to the agent's runtime
pub async fn list_containers(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let jobs = client.containers().await?;

    match format {
        OutputFormat::Json => print_json(&jobs)?,
        OutputFormat::Table => {
            let rows: Vec<JobRow> = jobs.iter().map(JobRow::from).collect();
            print_table(rows);
        }
    }

    Ok(())
}

/// Stop and remove every container on the agent
pub async fn reclaim(client: &ApiClient, format: OutputFormat) -> Result<()> {
    match client.reclaim().await {
        Ok(()) => {
            match format {
                OutputFormat::Json => print_json(&serde_json::json!({ "reclaimed": true }))?,
                OutputFormat::Table => print_success("All containers reclaimed"),
            }
            Ok(())
        }
        Err(err) => {
            if let Some(failure) = err.downcast_ref::<ApiFailure>() {
                if !failure.failures.is_empty() {
                    if let OutputFormat::Json = format {
                        print_json(&failure.failures)?;
                    } else {
                        for f in &failure.failures {
                            print_error(&format!(
                                "{} failed at {}: {}",
                                short_id(&f.container_id),
                                f.stage,
                                f.reason
                            ));
                        }
                    }
                }
            }
            Err(err)
        }
    }
}
