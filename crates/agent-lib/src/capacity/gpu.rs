//! Accelerator discovery through OpenCL's `clinfo --raw`

use super::{GpuDevice, GpuTelemetry};
use crate::error::{AgentError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

const DEVICE_NAME: &str = "CL_DEVICE_NAME";
const DEVICE_TYPE: &str = "CL_DEVICE_TYPE";
const MAX_COMPUTE_UNITS: &str = "CL_DEVICE_MAX_COMPUTE_UNITS";
const MAX_CLOCK_FREQUENCY: &str = "CL_DEVICE_MAX_CLOCK_FREQUENCY";

/// How long `clinfo` may take before the host is treated as GPU-less
pub const CLINFO_TIMEOUT: Duration = Duration::from_secs(1);

/// GPU probe that shells out to `clinfo`
pub struct ClinfoGpuProbe {
    clinfo_bin: String,
    timeout: Duration,
}

impl Default for ClinfoGpuProbe {
    fn default() -> Self {
        Self::new("clinfo")
    }
}

impl ClinfoGpuProbe {
    pub fn new(clinfo_bin: impl Into<String>) -> Self {
        Self {
            clinfo_bin: clinfo_bin.into(),
            timeout: CLINFO_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl GpuTelemetry for ClinfoGpuProbe {
    async fn first_gpu(&self) -> Result<Option<GpuDevice>> {
        let run = Command::new(&self.clinfo_bin)
            .arg("--raw")
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
                debug!(bin = %self.clinfo_bin, "clinfo not installed, assuming no GPU");
                return Ok(None);
            }
            Ok(Err(e)) => {
                return Err(AgentError::TelemetryUnavailable(format!(
                    "failed to run {}: {}",
                    self.clinfo_bin, e
                )))
            }
            Err(_) => {
                warn!(
                    bin = %self.clinfo_bin,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "clinfo did not answer in time, assuming no GPU"
                );
                return Ok(None);
            }
        };

        // clinfo exits non-zero when no OpenCL platform is installed
        if !output.status.success() {
            debug!(
                status = ?output.status.code(),
                "clinfo reported no OpenCL platforms"
            );
            return Ok(None);
        }

        parse_clinfo_raw(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Pick the first GPU-class device out of `clinfo --raw` output.
///
/// Device lines look like `[NV/0]  CL_DEVICE_MAX_COMPUTE_UNITS  68`; the
/// bracketed tag identifies the device, properties are grouped by it.
pub fn parse_clinfo_raw(content: &str) -> Result<Option<GpuDevice>> {
    let mut order: Vec<&str> = Vec::new();
    let mut devices: HashMap<&str, HashMap<&str, &str>> = HashMap::new();

    for line in content.lines() {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('[') else {
            continue;
        };
        let Some((tag, rest)) = rest.split_once(']') else {
            continue;
        };

        let rest = rest.trim_start();
        let (key, value) = match rest.split_once(char::is_whitespace) {
            Some((key, value)) => (key, value.trim()),
            None => (rest, ""),
        };
        if !key.starts_with("CL_DEVICE_") {
            continue;
        }

        if !devices.contains_key(tag) {
            order.push(tag);
        }
        devices.entry(tag).or_default().insert(key, value);
    }

    let Some(props) = order.iter().map(|tag| &devices[tag]).find(|props| {
        props
            .get(DEVICE_TYPE)
            .map(|t| t.contains("GPU"))
            .unwrap_or(false)
    }) else {
        return Ok(None);
    };

    let name = props.get(DEVICE_NAME).copied().unwrap_or("unknown").to_string();
    let compute_units: u32 = parse_property(props, MAX_COMPUTE_UNITS, &name)?;
    let max_clock_mhz: u64 = parse_property(props, MAX_CLOCK_FREQUENCY, &name)?;

    Ok(Some(GpuDevice {
        name,
        compute_units,
        max_clock_hz: max_clock_mhz as f64 * 1_000_000.0,
    }))
}

fn parse_property<T: std::str::FromStr>(
    props: &HashMap<&str, &str>,
    key: &str,
    device: &str,
) -> Result<T> {
    let raw = props.get(key).ok_or_else(|| {
        AgentError::TelemetryUnavailable(format!("gpu {} does not report {}", device, key))
    })?;

    raw.trim().parse().map_err(|_| {
        AgentError::TelemetryUnavailable(format!(
            "gpu {} reports unparsable {}: {:?}",
            device, key, raw
        ))
    })
}
