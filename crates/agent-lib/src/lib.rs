//! Worker agent library for the compute grid
//!
//! This crate provides the core functionality for:
//! - Host capacity estimation (CPU load, FLOPS, RAM, optional GPU)
//! - Container job launch and reclamation over a container runtime
//! - The agent facade composing both
//! - Health checks and observability

pub mod capacity;
pub mod error;
pub mod facade;
pub mod health;
pub mod jobs;
pub mod models;
pub mod observability;
pub mod runtime;

pub use capacity::{
    CapacityEstimator, ClinfoGpuProbe, GpuTelemetry, HostTelemetry, SysinfoHostProbe,
};
pub use error::{AgentError, Result};
pub use facade::GridAgent;
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use jobs::JobManager;
pub use models::*;
pub use observability::{AgentMetrics, StructuredLogger};
pub use runtime::{ContainerRuntime, DockerCli, InMemoryRuntime};
