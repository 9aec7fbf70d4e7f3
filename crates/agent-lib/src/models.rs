//! Core data models for the worker agent

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Point-in-time host capacity, derived from a single telemetry sample
#[derive(Debug, Clone, PartialEq)]
pub struct CapacitySnapshot {
    pub cpu_load_percent: f64,
    pub cpu_core_count: usize,
    pub cpu_clock_current_hz: f64,
    pub cpu_clock_max_hz: f64,
    pub cpu_total_flops: f64,
    pub cpu_available_flops: f64,
    pub cpu_available_flops_percent: f64,
    pub ram_available_bytes: u64,
    pub gpu: Option<GpuCapacity>,
}

/// Capacity of the first detected accelerator
#[derive(Debug, Clone, PartialEq)]
pub struct GpuCapacity {
    pub device_name: String,
    /// Copied from the CPU sample; there is no accelerator utilization source
    pub load_percent: f64,
    pub load_source: GpuLoadSource,
    pub total_flops: f64,
    pub available_flops: f64,
    pub available_flops_percent: f64,
}

/// Where a GPU load figure came from
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpuLoadSource {
    CpuProxy,
}

const BYTES_PER_GIB: f64 = (1u64 << 30) as f64;
const HZ_PER_MHZ: f64 = 1_000_000.0;

/// Body of `GET /server/load`.
///
/// FLOPS figures are raw; RAM is reported in GiB and the clock in MHz.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadReport {
    pub cpu_load: f64,
    #[serde(rename = "total_FLOPS")]
    pub total_flops: f64,
    #[serde(rename = "available_FLOPS")]
    pub available_flops: f64,
    #[serde(rename = "available_FLOPS_percentage")]
    pub available_flops_percentage: f64,
    /// GiB
    #[serde(rename = "available_RAM")]
    pub available_ram: f64,
    /// MHz
    pub current_freq: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu: Option<GpuLoadReport>,
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuLoadReport {
    pub gpu_load: f64,
    pub gpu_load_source: GpuLoadSource,
    #[serde(rename = "total_FLOPS")]
    pub total_flops: f64,
    #[serde(rename = "available_FLOPS")]
    pub available_flops: f64,
    #[serde(rename = "available_FLOPS_percentage")]
    pub available_flops_percentage: f64,
}

impl From<&CapacitySnapshot> for LoadReport {
    fn from(snapshot: &CapacitySnapshot) -> Self {
        Self {
            cpu_load: snapshot.cpu_load_percent,
            total_flops: snapshot.cpu_total_flops,
            available_flops: snapshot.cpu_available_flops,
            available_flops_percentage: snapshot.cpu_available_flops_percent,
            available_ram: snapshot.ram_available_bytes as f64 / BYTES_PER_GIB,
            current_freq: snapshot.cpu_clock_current_hz / HZ_PER_MHZ,
            gpu: snapshot.gpu.as_ref().map(|gpu| GpuLoadReport {
                gpu_load: gpu.load_percent,
                gpu_load_source: gpu.load_source,
                total_flops: gpu.total_flops,
                available_flops: gpu.available_flops,
                available_flops_percentage: gpu.available_flops_percent,
            }),
        }
    }
}

/// Container lifecycle as reported by the runtime
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Created,
    Running,
    Exited,
    Removed,
}

impl JobStatus {
    /// Map a runtime state string onto the job lifecycle
    pub fn from_runtime_state(state: &str) -> Option<Self> {
        match state.trim().to_ascii_lowercase().as_str() {
            "created" => Some(JobStatus::Created),
            "running" | "paused" | "restarting" => Some(JobStatus::Running),
            "exited" | "dead" => Some(JobStatus::Exited),
            "removing" => Some(JobStatus::Removed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::Running => "running",
            JobStatus::Exited => "exited",
            JobStatus::Removed => "removed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A container known to the runtime
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub image: String,
    pub status: JobStatus,
}

/// Launch parameters for a container job
#[derive(Debug, Clone, Default)]
pub struct JobSpec {
    pub image: String,
    pub environment: HashMap<String, String>,
    pub wait: bool,
}

impl JobSpec {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            environment: HashMap::new(),
            wait: false,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn waited(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }
}

/// Query parameters of `POST /docker/run`; the environment arrives as the body
#[cfg_attr(
    feature = "openapi",
    derive(utoipa::IntoParams),
    into_params(parameter_in = Query)
)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    /// Image to start
    pub image: String,
    /// Block until the container exits and return its JSON output
    #[serde(default)]
    pub waited: bool,
}

impl RunRequest {
    pub fn into_spec(self, environment: HashMap<String, String>) -> JobSpec {
        JobSpec {
            image: self.image,
            environment,
            wait: self.waited,
        }
    }
}

/// Outcome of a launch; also the `POST /docker/run` body
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResponse {
    pub container_id: String,
    pub image: String,
    pub status: JobStatus,
    /// Parsed output document for waited jobs, empty object otherwise
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub logs: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
}

impl RunResponse {
    pub fn empty_logs() -> Value {
        Value::Object(Map::new())
    }
}

/// Which step of a reclaim failed for a container
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReclaimStage {
    Stop,
    Remove,
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReclaimFailure {
    pub container_id: String,
    pub stage: ReclaimStage,
    pub reason: String,
}

/// Result of a best-effort reclaim sweep
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReclaimReport {
    pub attempted: usize,
    pub reclaimed: Vec<String>,
    pub failures: Vec<ReclaimFailure>,
}

impl ReclaimReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_state_mapping() {
        assert_eq!(JobStatus::from_runtime_state("created"), Some(JobStatus::Created));
        assert_eq!(JobStatus::from_runtime_state("Running\n"), Some(JobStatus::Running));
        assert_eq!(JobStatus::from_runtime_state("paused"), Some(JobStatus::Running));
        assert_eq!(JobStatus::from_runtime_state("dead"), Some(JobStatus::Exited));
        assert_eq!(JobStatus::from_runtime_state("removing"), Some(JobStatus::Removed));
        assert_eq!(JobStatus::from_runtime_state("sleeping"), None);
    }

    #[test]
    fn test_load_report_field_names() {
        let snapshot = CapacitySnapshot {
            cpu_load_percent: 25.0,
            cpu_core_count: 4,
            cpu_clock_current_hz: 2.0e9,
            cpu_clock_max_hz: 3.0e9,
            cpu_total_flops: 2.4e10,
            cpu_available_flops: 1.8e10,
            cpu_available_flops_percent: 75.0,
            ram_available_bytes: 3 << 29,
            gpu: None,
        };

        let json = serde_json::to_value(LoadReport::from(&snapshot)).unwrap();
        assert_eq!(json["cpu_load"], 25.0);
        assert_eq!(json["total_FLOPS"], 2.4e10);
        assert_eq!(json["available_FLOPS"], 1.8e10);
        assert_eq!(json["available_FLOPS_percentage"], 75.0);
        assert_eq!(json["available_RAM"], 1.5);
        assert_eq!(json["current_freq"], 2000.0);
        assert!(json.get("gpu").is_none());
    }

    #[test]
    fn test_gpu_report_is_labelled_as_proxy() {
        let snapshot = CapacitySnapshot {
            cpu_load_percent: 10.0,
            cpu_core_count: 1,
            cpu_clock_current_hz: 1.0e9,
            cpu_clock_max_hz: 1.0e9,
            cpu_total_flops: 2.0e9,
            cpu_available_flops: 1.8e9,
            cpu_available_flops_percent: 90.0,
            ram_available_bytes: 0,
            gpu: Some(GpuCapacity {
                device_name: "test".to_string(),
                load_percent: 10.0,
                load_source: GpuLoadSource::CpuProxy,
                total_flops: 1.0e12,
                available_flops: 9.0e11,
                available_flops_percent: 90.0,
            }),
        };

        let json = serde_json::to_value(LoadReport::from(&snapshot)).unwrap();
        assert_eq!(json["gpu"]["gpu_load"], 10.0);
        assert_eq!(json["gpu"]["gpu_load_source"], "cpu_proxy");
        assert_eq!(json["gpu"]["total_FLOPS"], 1.0e12);
    }

    #[test]
    fn test_run_response_omits_missing_exit_code() {
        let response = RunResponse {
            container_id: "abc".to_string(),
            image: "busybox:latest".to_string(),
            status: JobStatus::Running,
            logs: RunResponse::empty_logs(),
            exit_code: None,
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "running");
        assert_eq!(json["logs"], serde_json::json!({}));
        assert!(json.get("exit_code").is_none());
    }

    #[test]
    fn test_run_request_defaults_to_fire_and_forget() {
        let request: RunRequest = serde_json::from_str(r#"{"image": "busybox"}"#).unwrap();
        assert!(!request.waited);

        let mut env = HashMap::new();
        env.insert("A".to_string(), "1".to_string());
        let spec = request.into_spec(env);
        assert_eq!(spec.image, "busybox");
        assert_eq!(spec.environment["A"], "1");
        assert!(!spec.wait);
    }
}
