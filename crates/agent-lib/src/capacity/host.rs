//! CPU and memory telemetry from sysinfo and sysfs
//!
//! Utilization, current clock and free memory come from sysinfo. The maximum
//! clock is read from `cpufreq/cpuinfo_max_freq`, which sysinfo does not expose.

use super::{HostSample, HostTelemetry};
use crate::error::{AgentError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tokio::fs;
use tracing::{debug, warn};

/// Host probe backed by sysinfo
pub struct SysinfoHostProbe {
    sysfs_root: PathBuf,
}

impl Default for SysinfoHostProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoHostProbe {
    pub fn new() -> Self {
        Self {
            sysfs_root: PathBuf::from("/sys"),
        }
    }

    /// Create probe with custom sysfs root (for testing)
    pub fn with_sysfs_root(sysfs_root: impl Into<PathBuf>) -> Self {
        Self {
            sysfs_root: sysfs_root.into(),
        }
    }

    fn max_freq_path(&self) -> PathBuf {
        self.sysfs_root
            .join("devices/system/cpu/cpu0/cpufreq/cpuinfo_max_freq")
    }

    /// Maximum clock in Hz, or 0 when the platform does not report one
    pub async fn read_max_clock_hz(&self) -> f64 {
        let path = self.max_freq_path();
        match fs::read_to_string(&path).await {
            Ok(content) => match parse_max_freq_khz(&content) {
                Some(khz) => khz as f64 * 1_000.0,
                None => {
                    warn!(path = %path.display(), "Unparsable cpuinfo_max_freq");
                    0.0
                }
            },
            Err(e) => {
                debug!(path = %path.display(), error = %e, "cpuinfo_max_freq not available");
                0.0
            }
        }
    }
}

/// Parse `cpuinfo_max_freq` contents (kHz)
pub fn parse_max_freq_khz(content: &str) -> Option<u64> {
    content.trim().parse().ok()
}

#[async_trait]
impl HostTelemetry for SysinfoHostProbe {
    async fn sample(&self, window: Duration) -> Result<HostSample> {
        let mut sys = System::new_with_specifics(
            RefreshKind::new()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );

        // Usage is the delta between two refreshes
        sys.refresh_cpu_usage();
        tokio::time::sleep(window.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL)).await;
        sys.refresh_cpu_all();
        sys.refresh_memory();

        let cpus = sys.cpus();
        if cpus.is_empty() {
            return Err(AgentError::TelemetryUnavailable(
                "no CPUs reported by the OS".to_string(),
            ));
        }

        let load_percent =
            cpus.iter().map(|c| c.cpu_usage() as f64).sum::<f64>() / cpus.len() as f64;
        let current_clock_hz =
            cpus.iter().map(|c| c.frequency() as f64).sum::<f64>() / cpus.len() as f64 * 1_000_000.0;

        let physical_cores = match sys.physical_core_count() {
            Some(count) if count > 0 => count,
            _ => {
                warn!(
                    logical_cpus = cpus.len(),
                    "Physical core count unavailable, using logical CPU count"
                );
                cpus.len()
            }
        };

        Ok(HostSample {
            load_percent,
            physical_cores,
            current_clock_hz,
            max_clock_hz: self.read_max_clock_hz().await,
            available_ram_bytes: sys.available_memory(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn write_max_freq(temp_dir: &TempDir, content: &str) {
        let dir = temp_dir.path().join("devices/system/cpu/cpu0/cpufreq");
        fs::create_dir_all(&dir).await.unwrap();
        fs::write(dir.join("cpuinfo_max_freq"), content).await.unwrap();
    }

    #[test]
    fn test_parse_max_freq_khz() {
        assert_eq!(parse_max_freq_khz("3000000\n"), Some(3_000_000));
        assert_eq!(parse_max_freq_khz("  2400000  "), Some(2_400_000));
        assert_eq!(parse_max_freq_khz(""), None);
        assert_eq!(parse_max_freq_khz("fast"), None);
    }

    #[tokio::test]
    async fn test_read_max_clock_converts_khz_to_hz() {
        let temp_dir = TempDir::new().unwrap();
        write_max_freq(&temp_dir, "3000000\n").await;

        let probe = SysinfoHostProbe::with_sysfs_root(temp_dir.path());
        assert_eq!(probe.read_max_clock_hz().await, 3.0e9);
    }

    #[tokio::test]
    async fn test_read_max_clock_missing_file_is_zero() {
        let temp_dir = TempDir::new().unwrap();

        let probe = SysinfoHostProbe::with_sysfs_root(temp_dir.path());
        assert_eq!(probe.read_max_clock_hz().await, 0.0);
    }

    #[tokio::test]
    async fn test_read_max_clock_garbage_is_zero() {
        let temp_dir = TempDir::new().unwrap();
        write_max_freq(&temp_dir, "n/a\n").await;

        let probe = SysinfoHostProbe::with_sysfs_root(temp_dir.path());
        assert_eq!(probe.read_max_clock_hz().await, 0.0);
    }

    #[tokio::test]
    async fn test_sample_reports_sane_values() {
        let probe = SysinfoHostProbe::new();
        let sample = probe.sample(Duration::from_millis(250)).await.unwrap();

        assert!(sample.physical_cores > 0);
        assert!(sample.load_percent >= 0.0);
        assert!(sample.current_clock_hz >= 0.0);
    }
}
