//! Error taxonomy for capacity reads and container job operations

use crate::models::ReclaimReport;
use thiserror::Error;

/// Failures surfaced by the agent core.
///
/// Nothing here is retried internally; the transport layer maps each variant
/// to a status code and the controller decides what to do next.
#[derive(Error, Debug)]
pub enum AgentError {
    /// An OS or driver query for CPU/GPU figures failed or returned an unusable value
    #[error("telemetry unavailable: {0}")]
    TelemetryUnavailable(String),

    /// The container runtime could not be reached at all
    #[error("container runtime unreachable: {0}")]
    RuntimeUnreachable(String),

    /// The runtime was reachable but rejected or failed a command
    #[error("container runtime command `{command}` failed: {message}")]
    RuntimeCommand { command: String, message: String },

    /// The referenced container does not exist (anymore)
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// A waited job did not emit a single JSON document on stdout
    #[error("job {container_id} output is not a single JSON document: {source}")]
    JobOutputMalformed {
        container_id: String,
        #[source]
        source: serde_json::Error,
    },

    /// A reclaim sweep finished but left some containers behind
    #[error("reclaimed {} of {} containers; {} failed", .0.reclaimed.len(), .0.attempted, .0.failures.len())]
    PartialReclamation(ReclaimReport),
}

impl AgentError {
    pub fn runtime_command(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RuntimeCommand {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Short machine-readable name for logs and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::TelemetryUnavailable(_) => "telemetry_unavailable",
            AgentError::RuntimeUnreachable(_) => "runtime_unreachable",
            AgentError::RuntimeCommand { .. } => "runtime_command",
            AgentError::ContainerNotFound(_) => "container_not_found",
            AgentError::JobOutputMalformed { .. } => "job_output_malformed",
            AgentError::PartialReclamation(_) => "partial_reclamation",
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
