//! Container job lifecycle
//!
//! A thin, stateless layer over [`ContainerRuntime`]:
//! - `launch` starts a container and optionally waits for its JSON result
//! - `reclaim_all` stops and removes every container the runtime knows about
//!
//! Per-job lifecycle is `Created -> Running -> {Exited, Removed}`, as reported
//! by the runtime.

use crate::error::{AgentError, Result};
use crate::models::{Job, JobSpec, ReclaimFailure, ReclaimReport, ReclaimStage, RunResponse};
use crate::runtime::ContainerRuntime;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Launches and reclaims container jobs
#[derive(Clone)]
pub struct JobManager {
    runtime: Arc<dyn ContainerRuntime>,
}

impl JobManager {
    /// Create a manager over a shared runtime handle
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Start a job.
    ///
    /// With `spec.wait` unset this returns as soon as the runtime has started
    /// the container, with empty logs. With it set, the calling task blocks
    /// until the container exits and its stdout must be exactly one JSON
    /// document; anything else is [`AgentError::JobOutputMalformed`].
    pub async fn launch(&self, spec: &JobSpec) -> Result<RunResponse> {
        let id = self
            .runtime
            .run_detached(&spec.image, &spec.environment)
            .await?;
        info!(container_id = %id, image = %spec.image, wait = spec.wait, "Container started");

        if !spec.wait {
            let job = self.runtime.inspect(&id).await?;
            return Ok(RunResponse {
                container_id: job.id,
                image: job.image,
                status: job.status,
                logs: RunResponse::empty_logs(),
                exit_code: None,
            });
        }

        let exit_code = self.runtime.wait(&id).await?;
        debug!(container_id = %id, exit_code, "Container exited");

        let output = self.runtime.logs(&id).await?;
        let logs = parse_job_output(&id, &output)?;
        let job = self.runtime.inspect(&id).await?;

        Ok(RunResponse {
            container_id: job.id,
            image: job.image,
            status: job.status,
            logs,
            exit_code: Some(exit_code),
        })
    }

    /// All containers known to the runtime, stopped ones included
    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        self.runtime.list_all().await
    }

    /// Stop and remove every container the runtime knows about.
    ///
    /// Failing to list is fatal. After that every container is attempted and
    /// per-container failures are collected in the report instead of ending
    /// the sweep. A container that disappears mid-sweep counts as reclaimed.
    pub async fn reclaim_all(&self) -> Result<ReclaimReport> {
        let jobs = self.runtime.list_all().await?;
        let mut report = ReclaimReport {
            attempted: jobs.len(),
            ..Default::default()
        };

        for job in jobs {
            match self.reclaim_one(&job.id).await {
                Ok(()) => report.reclaimed.push(job.id),
                Err((stage, err)) => {
                    warn!(
                        container_id = %job.id,
                        stage = ?stage,
                        error = %err,
                        "Failed to reclaim container"
                    );
                    report.failures.push(ReclaimFailure {
                        container_id: job.id,
                        stage,
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            attempted = report.attempted,
            reclaimed = report.reclaimed.len(),
            failed = report.failures.len(),
            "Reclaim sweep finished"
        );

        Ok(report)
    }

    async fn reclaim_one(&self, id: &str) -> std::result::Result<(), (ReclaimStage, AgentError)> {
        match self.runtime.stop(id).await {
            Ok(()) => {}
            Err(AgentError::ContainerNotFound(_)) => return Ok(()),
            Err(e) => return Err((ReclaimStage::Stop, e)),
        }

        match self.runtime.remove(id).await {
            Ok(()) | Err(AgentError::ContainerNotFound(_)) => Ok(()),
            Err(e) => Err((ReclaimStage::Remove, e)),
        }
    }
}

/// Parse a finished job's stdout as exactly one JSON document
pub fn parse_job_output(container_id: &str, output: &str) -> Result<Value> {
    serde_json::from_str(output.trim()).map_err(|source| AgentError::JobOutputMalformed {
        container_id: container_id.to_string(),
        source,
    })
}
