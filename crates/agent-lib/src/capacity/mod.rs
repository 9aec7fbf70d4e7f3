//! Host capacity estimation
//!
//! Turns one telemetry sample into a [`CapacitySnapshot`]:
//! - CPU utilization sampled over [`CPU_SAMPLE_WINDOW`]
//! - Peak throughput as `FLOPS_PER_CYCLE x cores x max clock`
//! - Available throughput as peak scaled by the idle fraction
//!
//! The peak figure is a coarse heuristic: issue width and SIMD lanes are not
//! modeled, so treat it as an approximation rather than a benchmark. The
//! controller calibrates against exactly these formulas, so they must not be
//! refined here.

mod gpu;
mod host;


pub use gpu::{parse_clinfo_raw, ClinfoGpuProbe, CLINFO_TIMEOUT};
pub use host::{parse_max_freq_khz, SysinfoHostProbe};

use crate::error::{AgentError, Result};
use crate::models::{CapacitySnapshot, GpuCapacity, GpuLoadSource};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Window over which CPU utilization is averaged.
///
/// Instantaneous utilization is noise; one second smooths scheduler jitter
/// while keeping `GET /server/load` responsive. Every capacity read blocks
/// its caller for this long.
pub const CPU_SAMPLE_WINDOW: Duration = Duration::from_secs(1);

/// Floating-point operations assumed per core per cycle
pub const FLOPS_PER_CYCLE: f64 = 2.0;

/// One raw reading of host CPU and memory telemetry
#[derive(Debug, Clone, PartialEq)]
pub struct HostSample {
    /// Utilization averaged over the sampling window, 0-100
    pub load_percent: f64,
    pub physical_cores: usize,
    pub current_clock_hz: f64,
    /// Zero when the platform does not expose a maximum clock
    pub max_clock_hz: f64,
    pub available_ram_bytes: u64,
}

/// Static description of an accelerator
#[derive(Debug, Clone, PartialEq)]
pub struct GpuDevice {
    pub name: String,
    pub compute_units: u32,
    pub max_clock_hz: f64,
}

/// Source of CPU and memory telemetry
#[async_trait]
pub trait HostTelemetry: Send + Sync {
    /// Sample utilization over `window` and read static topology
    async fn sample(&self, window: Duration) -> Result<HostSample>;
}

/// Source of accelerator topology
#[async_trait]
pub trait GpuTelemetry: Send + Sync {
    /// First GPU-class device on the host, if any
    async fn first_gpu(&self) -> Result<Option<GpuDevice>>;
}

/// Theoretical peak throughput for `units` executing at `clock_hz`
pub fn peak_flops(units: usize, clock_hz: f64) -> f64 {
    FLOPS_PER_CYCLE * units as f64 * clock_hz
}

/// Peak throughput scaled by the idle fraction of `load_percent`
pub fn available_flops(total_flops: f64, load_percent: f64) -> f64 {
    total_flops * (1.0 - load_percent / 100.0)
}

/// Validate and clamp a utilization reading to 0-100
fn normalize_load(load_percent: f64) -> Result<f64> {
    if !load_percent.is_finite() {
        return Err(AgentError::TelemetryUnavailable(format!(
            "cpu load reading is not a number: {}",
            load_percent
        )));
    }
    Ok(load_percent.clamp(0.0, 100.0))
}

/// Clock used for the peak figure: max clock, or current clock when max is unknown
fn effective_clock_hz(sample: &HostSample) -> Result<f64> {
    if sample.max_clock_hz.is_finite() && sample.max_clock_hz > 0.0 {
        return Ok(sample.max_clock_hz);
    }

    if sample.current_clock_hz.is_finite() && sample.current_clock_hz > 0.0 {
        debug!(
            current_clock_hz = sample.current_clock_hz,
            "Max CPU clock unavailable, using current clock"
        );
        return Ok(sample.current_clock_hz);
    }

    Err(AgentError::TelemetryUnavailable(
        "neither max nor current CPU clock is reported".to_string(),
    ))
}

/// Derive a snapshot from raw telemetry
pub fn derive_snapshot(sample: &HostSample, gpu: Option<&GpuDevice>) -> Result<CapacitySnapshot> {
    if sample.physical_cores == 0 {
        return Err(AgentError::TelemetryUnavailable(
            "cpu core count reported as zero".to_string(),
        ));
    }

    let load = normalize_load(sample.load_percent)?;
    let clock_hz = effective_clock_hz(sample)?;

    let cpu_total_flops = peak_flops(sample.physical_cores, clock_hz);
    let cpu_available_flops = available_flops(cpu_total_flops, load);

    let gpu = gpu.map(|device| derive_gpu(device, load)).transpose()?;

    Ok(CapacitySnapshot {
        cpu_load_percent: load,
        cpu_core_count: sample.physical_cores,
        cpu_clock_current_hz: sample.current_clock_hz,
        cpu_clock_max_hz: clock_hz,
        cpu_total_flops,
        cpu_available_flops,
        // Defined as the idle fraction, not measured
        cpu_available_flops_percent: 100.0 - load,
        ram_available_bytes: sample.available_ram_bytes,
        gpu,
    })
}

/// GPU figures reuse the CPU load because accelerator utilization is not measured
fn derive_gpu(device: &GpuDevice, cpu_load: f64) -> Result<GpuCapacity> {
    if device.compute_units == 0 || !device.max_clock_hz.is_finite() || device.max_clock_hz <= 0.0 {
        return Err(AgentError::TelemetryUnavailable(format!(
            "gpu {} reports {} compute units at {} Hz",
            device.name, device.compute_units, device.max_clock_hz
        )));
    }

    let total_flops = peak_flops(device.compute_units as usize, device.max_clock_hz);

    Ok(GpuCapacity {
        device_name: device.name.clone(),
        load_percent: cpu_load,
        load_source: GpuLoadSource::CpuProxy,
        total_flops,
        available_flops: available_flops(total_flops, cpu_load),
        available_flops_percent: 100.0 - cpu_load,
    })
}

/// Reads host capacity on demand.
///
/// Holds no state between calls; every read takes a fresh sample.
#[derive(Clone)]
pub struct CapacityEstimator {
    host: Arc<dyn HostTelemetry>,
    gpu: Option<Arc<dyn GpuTelemetry>>,
    window: Duration,
}

impl CapacityEstimator {
    /// Create an estimator over the given telemetry sources
    pub fn new(host: Arc<dyn HostTelemetry>, gpu: Option<Arc<dyn GpuTelemetry>>) -> Self {
        Self {
            host,
            gpu,
            window: CPU_SAMPLE_WINDOW,
        }
    }

    /// Override the sampling window (tests only need a few milliseconds)
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Take one sample and derive a snapshot
    pub async fn read_capacity(&self) -> Result<CapacitySnapshot> {
        // The GPU probe runs inside the CPU window, not after it
        let gpu = async {
            match &self.gpu {
                Some(probe) => probe.first_gpu().await,
                None => Ok(None),
            }
        };
        let (sample, device) = tokio::join!(self.host.sample(self.window), gpu);

        derive_snapshot(&sample?, device?.as_ref())
    }
}
