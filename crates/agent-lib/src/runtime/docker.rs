//! Docker runtime driven through the `docker` CLI

use super::ContainerRuntime;
use crate::error::{AgentError, Result};
use crate::models::{Job, JobStatus};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error};

const INSPECT_FORMAT: &str = "{{.Id}}|{{.Config.Image}}|{{.State.Status}}";
const PS_FORMAT: &str = "{{.ID}}|{{.Image}}|{{.State}}";

/// Stderr fragments meaning the daemon itself is not reachable
const UNREACHABLE_MARKERS: &[&str] = &[
    "Cannot connect to the Docker daemon",
    "error during connect",
    "Is the docker daemon running",
];

/// Container runtime backed by the Docker CLI.
///
/// Each call spawns one `docker` process, so concurrent requests never share
/// mutable state on this side.
#[derive(Debug, Clone)]
pub struct DockerCli {
    docker_bin: String,
    stop_timeout: Duration,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker", Duration::from_secs(10))
    }
}

impl DockerCli {
    pub fn new(docker_bin: impl Into<String>, stop_timeout: Duration) -> Self {
        Self {
            docker_bin: docker_bin.into(),
            stop_timeout,
        }
    }

    /// Run a docker subcommand and return its stdout
    async fn exec(&self, args: &[&str], target: Option<&str>) -> Result<String> {
        let command = args.first().copied().unwrap_or_default();
        debug!(bin = %self.docker_bin, ?args, "Running docker command");

        let output = Command::new(&self.docker_bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                error!(bin = %self.docker_bin, error = %e, "Failed to spawn docker");
                AgentError::RuntimeUnreachable(format!(
                    "failed to run {}: {}",
                    self.docker_bin, e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(command, &stderr, target));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Map a failed docker invocation onto the error taxonomy
pub fn classify_failure(command: &str, stderr: &str, target: Option<&str>) -> AgentError {
    let message = stderr.trim();

    if UNREACHABLE_MARKERS.iter().any(|m| message.contains(m)) {
        return AgentError::RuntimeUnreachable(message.to_string());
    }

    if message.contains("No such container") {
        return AgentError::ContainerNotFound(target.unwrap_or(message).to_string());
    }

    AgentError::runtime_command(format!("docker {}", command), message)
}

/// Parse one line of `docker inspect --format INSPECT_FORMAT`
pub fn parse_inspect_output(output: &str) -> Result<Job> {
    let line = output.trim();
    let mut parts = line.splitn(3, '|');
    let (Some(id), Some(image), Some(state)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(AgentError::runtime_command(
            "docker inspect",
            format!("unexpected output: {:?}", line),
        ));
    };

    Ok(Job {
        id: id.to_string(),
        image: image.to_string(),
        status: parse_state(state)?,
    })
}

/// Parse `docker ps -a --format PS_FORMAT`
pub fn parse_ps_output(output: &str) -> Result<Vec<Job>> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let parts: Vec<&str> = line.splitn(3, '|').collect();
            if parts.len() != 3 {
                return Err(AgentError::runtime_command(
                    "docker ps",
                    format!("unexpected output: {:?}", line),
                ));
            }
            Ok(Job {
                id: parts[0].to_string(),
                image: parts[1].to_string(),
                status: parse_state(parts[2])?,
            })
        })
        .collect()
}

fn parse_state(state: &str) -> Result<JobStatus> {
    JobStatus::from_runtime_state(state).ok_or_else(|| {
        AgentError::runtime_command("docker", format!("unrecognized container state {:?}", state))
    })
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn ping(&self) -> Result<String> {
        let version = self
            .exec(&["version", "--format", "{{.Server.Version}}"], None)
            .await?;
        Ok(version.trim().to_string())
    }

    async fn run_detached(
        &self,
        image: &str,
        environment: &HashMap<String, String>,
    ) -> Result<String> {
        // Sorted so the command line is stable for a given request
        let sorted: BTreeMap<&String, &String> = environment.iter().collect();
        let pairs: Vec<String> = sorted.iter().map(|(k, v)| format!("{}={}", k, v)).collect();

        let mut args: Vec<&str> = vec!["run", "--detach"];
        for pair in &pairs {
            args.push("--env");
            args.push(pair.as_str());
        }
        // Ends option parsing so the image is never read as a flag
        args.push("--");
        args.push(image);

        let id = self.exec(&args, None).await?;
        let id = id.trim();
        if id.is_empty() {
            return Err(AgentError::runtime_command(
                "docker run",
                "runtime returned no container id",
            ));
        }
        Ok(id.to_string())
    }

    async fn inspect(&self, id: &str) -> Result<Job> {
        let output = self
            .exec(&["inspect", "--format", INSPECT_FORMAT, id], Some(id))
            .await?;
        parse_inspect_output(&output)
    }

    async fn wait(&self, id: &str) -> Result<i64> {
        let output = self.exec(&["wait", id], Some(id)).await?;
        output.trim().parse().map_err(|_| {
            AgentError::runtime_command("docker wait", format!("unexpected exit code {:?}", output))
        })
    }

    async fn logs(&self, id: &str) -> Result<String> {
        self.exec(&["logs", id], Some(id)).await
    }

    async fn list_all(&self) -> Result<Vec<Job>> {
        let output = self
            .exec(&["ps", "--all", "--no-trunc", "--format", PS_FORMAT], None)
            .await?;
        parse_ps_output(&output)
    }

    async fn stop(&self, id: &str) -> Result<()> {
        let timeout = self.stop_timeout.as_secs().to_string();
        self.exec(&["stop", "--time", timeout.as_str(), id], Some(id))
            .await
            .map(|_| ())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.exec(&["rm", id], Some(id)).await.map(|_| ())
    }
}
