//! Agent facade
//!
//! Composes the capacity estimator and the job manager behind the four
//! operations the HTTP layer exposes, and records metrics, structured logs and
//! component health for each of them.
//!
//! Nothing here gates launches on capacity: admission policy belongs to the
//! controller, which should read capacity before submitting work.

use crate::capacity::CapacityEstimator;
use crate::error::{AgentError, Result};
use crate::health::HealthRegistry;
use crate::jobs::JobManager;
use crate::models::{CapacitySnapshot, Job, JobSpec, ReclaimReport, RunResponse};
use crate::observability::{AgentMetrics, StructuredLogger};
use std::time::Instant;

/// Environment variable carrying the target load percentage
pub const LOAD_PERCENT_ENV: &str = "LOAD_PERCENT";
/// Environment variable carrying the load duration in seconds
pub const LOAD_DURATION_ENV: &str = "LOAD_DURATION_SECONDS";

/// Default image used for synthetic load
pub const DEFAULT_LOAD_GENERATOR_IMAGE: &str = "grid/load-generator:latest";

/// The worker agent's core operations
#[derive(Clone)]
pub struct GridAgent {
    estimator: CapacityEstimator,
    jobs: JobManager,
    load_generator_image: String,
    health: HealthRegistry,
    metrics: AgentMetrics,
    logger: StructuredLogger,
}

impl GridAgent {
    pub fn new(
        estimator: CapacityEstimator,
        jobs: JobManager,
        health: HealthRegistry,
        metrics: AgentMetrics,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            estimator,
            jobs,
            load_generator_image: DEFAULT_LOAD_GENERATOR_IMAGE.to_string(),
            health,
            metrics,
            logger,
        }
    }

    pub fn with_load_generator_image(mut self, image: impl Into<String>) -> Self {
        self.load_generator_image = image.into();
        self
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    /// Sample host capacity.
    ///
    /// Blocks the calling task for the estimator's sampling window. Failures
    /// come back as an error value; the caller answers with an error payload.
    pub async fn read_capacity(&self) -> Result<CapacitySnapshot> {
        let start = Instant::now();
        let result = self.estimator.read_capacity().await;
        let elapsed = start.elapsed();

        match &result {
            Ok(snapshot) => {
                self.metrics
                    .observe_capacity_read(elapsed.as_secs_f64(), snapshot.cpu_load_percent);
                self.logger.log_capacity_read(snapshot, elapsed.as_millis());
                self.health.record_capacity_outcome(None).await;
            }
            Err(err) => {
                self.metrics.inc_capacity_read_errors();
                self.logger.log_capacity_read_failed(&err.to_string());
                self.health.record_capacity_outcome(Some(err)).await;
            }
        }

        result
    }

    /// Launch a container job, optionally waiting for its JSON result
    pub async fn launch_job(&self, spec: JobSpec) -> Result<RunResponse> {
        let result = self.jobs.launch(&spec).await;
        self.health
            .record_runtime_outcome(result.as_ref().err())
            .await;

        match &result {
            Ok(response) => {
                self.metrics.inc_jobs_launched();
                self.logger
                    .log_job_launched(&spec.image, &response.container_id, spec.wait);
                if spec.wait {
                    self.logger.log_job_completed(response);
                }
            }
            Err(err) => {
                self.metrics.inc_job_failures(err.kind());
                self.logger
                    .log_job_failed(&spec.image, err.kind(), &err.to_string());
            }
        }

        result
    }

    /// Start the load generator at `percent` for `duration_secs`; returns its job id.
    ///
    /// Contract: the HTTP boundary has already validated both values. They
    /// are forwarded to the generator unchanged.
    pub async fn impose_synthetic_load(&self, percent: u32, duration_secs: u64) -> Result<String> {
        let spec = JobSpec::new(self.load_generator_image.clone())
            .with_env(LOAD_PERCENT_ENV, percent.to_string())
            .with_env(LOAD_DURATION_ENV, duration_secs.to_string());

        let response = self.launch_job(spec).await?;
        self.logger
            .log_synthetic_load(percent, duration_secs, &response.container_id);

        Ok(response.container_id)
    }

    /// All containers the runtime currently knows about
    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        let result = self.jobs.list_jobs().await;
        self.health
            .record_runtime_outcome(result.as_ref().err())
            .await;
        result
    }

    /// Stop and remove every container.
    ///
    /// Returns the report when every container was reclaimed and
    /// [`AgentError::PartialReclamation`] carrying the same report otherwise.
    pub async fn reclaim_all(&self) -> Result<ReclaimReport> {
        let report = match self.jobs.reclaim_all().await {
            Ok(report) => report,
            Err(err) => {
                self.health.record_runtime_outcome(Some(&err)).await;
                self.metrics.inc_job_failures(err.kind());
                return Err(err);
            }
        };
        self.health.record_runtime_outcome(None).await;

        self.metrics
            .record_reclaim(report.reclaimed.len(), report.failures.len());
        self.logger.log_reclaim(&report);

        if report.is_complete() {
            Ok(report)
        } else {
            Err(AgentError::PartialReclamation(report))
        }
    }
}
