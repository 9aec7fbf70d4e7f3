//! Container runtime client
//!
//! The runtime is the source of truth for job state. The agent keeps no job
//! registry of its own; every listing and sweep queries the runtime live.
//! Implementations must be safe to share across concurrent requests.

mod docker;
pub mod memory;

pub use docker::{classify_failure, parse_inspect_output, parse_ps_output, DockerCli};
pub use memory::InMemoryRuntime;

use crate::error::Result;
use crate::models::Job;
use async_trait::async_trait;
use std::collections::HashMap;

/// Operations the job manager needs from a container runtime
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Check the runtime is reachable; returns its version string
    async fn ping(&self) -> Result<String>;

    /// Start a detached container and return its id
    async fn run_detached(&self, image: &str, environment: &HashMap<String, String>)
        -> Result<String>;

    /// Current state of a container
    async fn inspect(&self, id: &str) -> Result<Job>;

    /// Block until the container exits; returns its exit code
    async fn wait(&self, id: &str) -> Result<i64>;

    /// Captured stdout of the container
    async fn logs(&self, id: &str) -> Result<String>;

    /// Every container the runtime knows about, stopped ones included
    async fn list_all(&self) -> Result<Vec<Job>>;

    /// Stop a container. Stopping an already stopped container succeeds.
    async fn stop(&self, id: &str) -> Result<()>;

    /// Remove a stopped container
    async fn remove(&self, id: &str) -> Result<()>;
}
