//! Grid agent - worker-node agent for the compute grid
//!
//! Runs on each worker machine, reporting host capacity to the controller
//! and running container jobs on its behalf.

use agent_lib::{
    capacity::{CapacityEstimator, ClinfoGpuProbe, GpuTelemetry, SysinfoHostProbe},
    facade::GridAgent,
    health::{components, HealthRegistry},
    jobs::JobManager,
    observability::{AgentMetrics, StructuredLogger},
    runtime::{ContainerRuntime, DockerCli},
};
use anyhow::Result;
use grid_agent::{api, config};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting grid-agent");

    // Load configuration
    let config = config::AgentConfig::load()?;
    info!(
        node_name = %config.node_name,
        api_port = config.api_port,
        gpu_probe = config.gpu_probe_enabled,
        "Agent configured"
    );

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register(components::CAPACITY).await;
    health_registry.register(components::RUNTIME).await;

    let metrics = AgentMetrics::new();
    let logger = StructuredLogger::new(&config.node_name);

    // One runtime handle shared by every request
    let runtime: Arc<dyn ContainerRuntime> =
        Arc::new(DockerCli::new(&config.docker_bin, config.stop_timeout()));

    let runtime_version = match runtime.ping().await {
        Ok(version) => Some(version),
        Err(e) => {
            warn!(error = %e, "Container runtime not reachable at startup");
            health_registry.record_runtime_outcome(Some(&e)).await;
            None
        }
    };

    let gpu: Option<Arc<dyn GpuTelemetry>> = if config.gpu_probe_enabled {
        Some(Arc::new(
            ClinfoGpuProbe::new(&config.clinfo_bin).with_timeout(config.clinfo_timeout()),
        ))
    } else {
        None
    };
    let estimator = CapacityEstimator::new(
        Arc::new(SysinfoHostProbe::with_sysfs_root(&config.sysfs_root)),
        gpu,
    );

    let agent = GridAgent::new(
        estimator,
        JobManager::new(runtime),
        health_registry.clone(),
        metrics,
        logger.clone(),
    )
    .with_load_generator_image(&config.load_generator_image);

    logger.log_startup(AGENT_VERSION, runtime_version.as_deref());

    let app_state = Arc::new(api::AppState::new(agent));

    // Mark agent as ready after initialization
    health_registry.set_ready(true).await;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let mut api_handle = tokio::spawn(api::serve(config.api_port, app_state, async {
        let _ = shutdown_rx.await;
    }));

    // Wait for shutdown signal, or the server dying on its own (e.g. port in use)
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
        }
        result = &mut api_handle => {
            logger.log_shutdown("API server stopped");
            return match result {
                Ok(served) => served,
                Err(e) => Err(e.into()),
            };
        }
    }
    health_registry.set_ready(false).await;

    let _ = shutdown_tx.send(());
    match api_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "API server exited with error"),
        Err(e) => warn!(error = %e, "API server task failed"),
    }

    info!("Shutdown complete");
    Ok(())
}
