//! In-memory container runtime
//!
//! Mirrors the Docker semantics the agent relies on: stopping an exited
//! container succeeds, removing a running one fails, unknown ids are
//! `ContainerNotFound`. Used as the runtime double in tests.

use super::ContainerRuntime;
use crate::error::{AgentError, Result};
use crate::models::{Job, JobStatus};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// Scripted behaviour of an image when run
#[derive(Debug, Clone, Default)]
struct ImageScript {
    output: String,
    exit_code: i64,
}

#[derive(Debug, Clone)]
struct FakeContainer {
    image: String,
    status: JobStatus,
    environment: HashMap<String, String>,
    output: String,
    exit_code: i64,
}

#[derive(Debug, Default)]
struct State {
    containers: BTreeMap<String, FakeContainer>,
    images: HashMap<String, ImageScript>,
    missing_images: HashSet<String>,
    refuse_stop: HashSet<String>,
    refuse_remove: HashSet<String>,
    vanish_on_stop: HashSet<String>,
    unreachable: bool,
    next_id: u64,
}

/// Runtime double holding containers in a map
#[derive(Debug, Default)]
pub struct InMemoryRuntime {
    state: Mutex<State>,
}

impl InMemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // Poisoned only after a panic elsewhere; the map is still consistent
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make `image` print `output` and exit with `exit_code`
    pub fn script_image(&self, image: &str, output: &str, exit_code: i64) {
        self.lock().images.insert(
            image.to_string(),
            ImageScript {
                output: output.to_string(),
                exit_code,
            },
        );
    }

    /// Make `docker run` of `image` fail as if it could not be pulled
    pub fn mark_image_missing(&self, image: &str) {
        self.lock().missing_images.insert(image.to_string());
    }

    /// Add a pre-existing container in the given state
    pub fn insert_container(&self, id: &str, image: &str, status: JobStatus) {
        self.lock().containers.insert(
            id.to_string(),
            FakeContainer {
                image: image.to_string(),
                status,
                environment: HashMap::new(),
                output: String::new(),
                exit_code: 0,
            },
        );
    }

    /// Container ignores stop requests
    pub fn refuse_stop(&self, id: &str) {
        self.lock().refuse_stop.insert(id.to_string());
    }

    /// Container cannot be removed
    pub fn refuse_remove(&self, id: &str) {
        self.lock().refuse_remove.insert(id.to_string());
    }

    /// Container disappears (removed by someone else) when stop is attempted
    pub fn vanish_on_stop(&self, id: &str) {
        self.lock().vanish_on_stop.insert(id.to_string());
    }

    /// Simulate the daemon going away
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    /// Ids of all containers currently held
    pub fn container_ids(&self) -> Vec<String> {
        self.lock().containers.keys().cloned().collect()
    }

    pub fn status_of(&self, id: &str) -> Option<JobStatus> {
        self.lock().containers.get(id).map(|c| c.status)
    }

    pub fn environment_of(&self, id: &str) -> Option<HashMap<String, String>> {
        self.lock().containers.get(id).map(|c| c.environment.clone())
    }

    fn check_reachable(state: &State) -> Result<()> {
        if state.unreachable {
            return Err(AgentError::RuntimeUnreachable(
                "in-memory runtime marked unreachable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for InMemoryRuntime {
    async fn ping(&self) -> Result<String> {
        let state = self.lock();
        Self::check_reachable(&state)?;
        Ok("in-memory".to_string())
    }

    async fn run_detached(
        &self,
        image: &str,
        environment: &HashMap<String, String>,
    ) -> Result<String> {
        let mut state = self.lock();
        Self::check_reachable(&state)?;

        if state.missing_images.contains(image) {
            return Err(AgentError::runtime_command(
                "docker run",
                format!("Unable to find image '{}' locally", image),
            ));
        }

        state.next_id += 1;
        let id = format!("{:064x}", state.next_id);
        let script = state.images.get(image).cloned().unwrap_or_default();

        state.containers.insert(
            id.clone(),
            FakeContainer {
                image: image.to_string(),
                status: JobStatus::Running,
                environment: environment.clone(),
                output: script.output,
                exit_code: script.exit_code,
            },
        );

        Ok(id)
    }

    async fn inspect(&self, id: &str) -> Result<Job> {
        let state = self.lock();
        Self::check_reachable(&state)?;

        state
            .containers
            .get(id)
            .map(|c| Job {
                id: id.to_string(),
                image: c.image.clone(),
                status: c.status,
            })
            .ok_or_else(|| AgentError::ContainerNotFound(id.to_string()))
    }

    async fn wait(&self, id: &str) -> Result<i64> {
        let mut state = self.lock();
        Self::check_reachable(&state)?;

        let container = state
            .containers
            .get_mut(id)
            .ok_or_else(|| AgentError::ContainerNotFound(id.to_string()))?;
        container.status = JobStatus::Exited;
        Ok(container.exit_code)
    }

    async fn logs(&self, id: &str) -> Result<String> {
        let state = self.lock();
        Self::check_reachable(&state)?;

        state
            .containers
            .get(id)
            .map(|c| c.output.clone())
            .ok_or_else(|| AgentError::ContainerNotFound(id.to_string()))
    }

    async fn list_all(&self) -> Result<Vec<Job>> {
        let state = self.lock();
        Self::check_reachable(&state)?;

        Ok(state
            .containers
            .iter()
            .map(|(id, c)| Job {
                id: id.clone(),
                image: c.image.clone(),
                status: c.status,
            })
            .collect())
    }

    async fn stop(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        Self::check_reachable(&state)?;

        if state.vanish_on_stop.contains(id) {
            state.containers.remove(id);
        }
        if state.refuse_stop.contains(id) {
            return Err(AgentError::runtime_command(
                "docker stop",
                format!("container {} did not stop", id),
            ));
        }

        let container = state
            .containers
            .get_mut(id)
            .ok_or_else(|| AgentError::ContainerNotFound(id.to_string()))?;
        if container.status != JobStatus::Removed {
            container.status = JobStatus::Exited;
        }
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        Self::check_reachable(&state)?;

        if state.refuse_remove.contains(id) {
            return Err(AgentError::runtime_command(
                "docker rm",
                format!("container {} is busy", id),
            ));
        }

        match state.containers.get(id).map(|c| c.status) {
            None => Err(AgentError::ContainerNotFound(id.to_string())),
            Some(JobStatus::Running) => Err(AgentError::runtime_command(
                "docker rm",
                format!("cannot remove running container {}", id),
            )),
            Some(_) => {
                state.containers.remove(id);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let runtime = InMemoryRuntime::new();
        runtime.insert_container("a", "busybox", JobStatus::Running);

        runtime.stop("a").await.unwrap();
        runtime.stop("a").await.unwrap();
        assert_eq!(runtime.status_of("a"), Some(JobStatus::Exited));
    }

    #[tokio::test]
    async fn test_remove_running_container_fails() {
        let runtime = InMemoryRuntime::new();
        runtime.insert_container("a", "busybox", JobStatus::Running);

        assert!(runtime.remove("a").await.is_err());
        runtime.stop("a").await.unwrap();
        runtime.remove("a").await.unwrap();
        assert!(runtime.container_ids().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_container_is_not_found() {
        let runtime = InMemoryRuntime::new();

        let err = runtime.stop("ghost").await.unwrap_err();
        assert!(matches!(err, AgentError::ContainerNotFound(_)));
    }

    #[tokio::test]
    async fn test_unreachable_fails_everything() {
        let runtime = InMemoryRuntime::new();
        runtime.set_unreachable(true);

        assert!(matches!(
            runtime.list_all().await.unwrap_err(),
            AgentError::RuntimeUnreachable(_)
        ));
        assert!(matches!(
            runtime.run_detached("busybox", &HashMap::new()).await.unwrap_err(),
            AgentError::RuntimeUnreachable(_)
        ));
    }
}
