//! Observability infrastructure for the worker agent
//!
//! Provides:
//! - Prometheus metrics (capacity read latency, job launches, reclaim sweeps)
//! - Structured JSON logging with tracing

use crate::models::{CapacitySnapshot, ReclaimReport, RunResponse};
use prometheus::{
    register_gauge, register_histogram, register_int_counter, register_int_counter_vec, Gauge,
    Histogram, IntCounter, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Capacity reads always include the one second sampling window
const CAPACITY_READ_BUCKETS: &[f64] = &[0.5, 0.9, 1.0, 1.05, 1.1, 1.25, 1.5, 2.0, 5.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AgentMetricsInner> = OnceLock::new();

struct AgentMetricsInner {
    capacity_read_seconds: Histogram,
    capacity_read_errors: IntCounter,
    cpu_load_percent: Gauge,
    jobs_launched: IntCounter,
    job_failures: IntCounterVec,
    containers_reclaimed: IntCounter,
    reclaim_failures: IntCounter,
}

impl AgentMetricsInner {
    fn new() -> Self {
        Self {
            capacity_read_seconds: register_histogram!(
                "grid_agent_capacity_read_seconds",
                "Time spent sampling host capacity",
                CAPACITY_READ_BUCKETS.to_vec()
            )
            .expect("Failed to register capacity_read_seconds"),

            capacity_read_errors: register_int_counter!(
                "grid_agent_capacity_read_errors_total",
                "Capacity reads that failed on telemetry"
            )
            .expect("Failed to register capacity_read_errors"),

            cpu_load_percent: register_gauge!(
                "grid_agent_cpu_load_percent",
                "CPU load observed by the most recent capacity read"
            )
            .expect("Failed to register cpu_load_percent"),

            jobs_launched: register_int_counter!(
                "grid_agent_jobs_launched_total",
                "Container jobs started by the agent"
            )
            .expect("Failed to register jobs_launched"),

            job_failures: register_int_counter_vec!(
                "grid_agent_job_failures_total",
                "Failed job operations by error kind",
                &["kind"]
            )
            .expect("Failed to register job_failures"),

            containers_reclaimed: register_int_counter!(
                "grid_agent_containers_reclaimed_total",
                "Containers stopped and removed by reclaim sweeps"
            )
            .expect("Failed to register containers_reclaimed"),

            reclaim_failures: register_int_counter!(
                "grid_agent_reclaim_failures_total",
                "Containers a reclaim sweep could not stop or remove"
            )
            .expect("Failed to register reclaim_failures"),
        }
    }
}

/// Agent metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct AgentMetrics {
    _private: (),
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AgentMetricsInner {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new)
    }

    pub fn observe_capacity_read(&self, duration_secs: f64, cpu_load_percent: f64) {
        self.inner().capacity_read_seconds.observe(duration_secs);
        self.inner().cpu_load_percent.set(cpu_load_percent);
    }

    pub fn inc_capacity_read_errors(&self) {
        self.inner().capacity_read_errors.inc();
    }

    pub fn inc_jobs_launched(&self) {
        self.inner().jobs_launched.inc();
    }

    pub fn inc_job_failures(&self, kind: &str) {
        self.inner().job_failures.with_label_values(&[kind]).inc();
    }

    pub fn record_reclaim(&self, reclaimed: usize, failed: usize) {
        self.inner().containers_reclaimed.inc_by(reclaimed as u64);
        self.inner().reclaim_failures.inc_by(failed as u64);
    }
}

/// Structured logger for agent events
///
/// Emits one event-tagged record per significant operation so a log pipeline
/// can follow capacity reads and job lifecycles per node.
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn log_capacity_read(&self, snapshot: &CapacitySnapshot, elapsed_ms: u128) {
        info!(
            event = "capacity_read",
            node = %self.node_name,
            cpu_load_percent = snapshot.cpu_load_percent,
            cpu_cores = snapshot.cpu_core_count,
            total_flops = snapshot.cpu_total_flops,
            available_flops = snapshot.cpu_available_flops,
            ram_available_bytes = snapshot.ram_available_bytes,
            gpu = ?snapshot.gpu.as_ref().map(|g| g.device_name.as_str()),
            elapsed_ms = elapsed_ms as u64,
            "Read host capacity"
        );
    }

    pub fn log_capacity_read_failed(&self, error: &str) {
        warn!(
            event = "capacity_read_failed",
            node = %self.node_name,
            error = %error,
            "Capacity read failed"
        );
    }

    pub fn log_job_launched(&self, image: &str, container_id: &str, wait: bool) {
        info!(
            event = "job_launched",
            node = %self.node_name,
            image = %image,
            container_id = %container_id,
            wait = wait,
            "Launched container job"
        );
    }

    pub fn log_job_completed(&self, result: &RunResponse) {
        info!(
            event = "job_completed",
            node = %self.node_name,
            image = %result.image,
            container_id = %result.container_id,
            status = %result.status,
            exit_code = ?result.exit_code,
            "Waited container job finished"
        );
    }

    pub fn log_job_failed(&self, image: &str, kind: &str, error: &str) {
        warn!(
            event = "job_failed",
            node = %self.node_name,
            image = %image,
            kind = %kind,
            error = %error,
            "Container job failed"
        );
    }

    pub fn log_synthetic_load(&self, percent: u32, duration_secs: u64, container_id: &str) {
        info!(
            event = "synthetic_load_started",
            node = %self.node_name,
            percent = percent,
            duration_secs = duration_secs,
            container_id = %container_id,
            "Started synthetic load generator"
        );
    }

    pub fn log_reclaim(&self, report: &ReclaimReport) {
        if report.is_complete() {
            info!(
                event = "reclaim_completed",
                node = %self.node_name,
                attempted = report.attempted,
                reclaimed = report.reclaimed.len(),
                "Reclaimed all containers"
            );
        } else {
            let failed: Vec<&str> = report
                .failures
                .iter()
                .map(|f| f.container_id.as_str())
                .collect();
            warn!(
                event = "reclaim_completed",
                node = %self.node_name,
                attempted = report.attempted,
                reclaimed = report.reclaimed.len(),
                failed = ?failed,
                "Reclaim sweep left containers behind"
            );
        }
    }

    pub fn log_startup(&self, version: &str, runtime_version: Option<&str>) {
        info!(
            event = "agent_started",
            node = %self.node_name,
            agent_version = %version,
            runtime_version = ?runtime_version,
            "Worker agent started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Worker agent shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_metrics_creation() {
        // Handles share one global registry, so creating several is fine
        let metrics = AgentMetrics::new();
        let other = AgentMetrics::new();

        metrics.observe_capacity_read(1.01, 42.0);
        metrics.inc_capacity_read_errors();
        metrics.inc_jobs_launched();
        other.inc_job_failures("runtime_unreachable");
        other.record_reclaim(3, 1);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-node");
        assert_eq!(logger.node_name(), "test-node");
    }
}
