//! Agent configuration

use agent_lib::capacity::CLINFO_TIMEOUT;
use agent_lib::facade::DEFAULT_LOAD_GENERATOR_IMAGE;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Environment variable naming an optional configuration file
pub const CONFIG_FILE_ENV: &str = "AGENT_CONFIG_FILE";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Node name reported in logs
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// Port of the HTTP API
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Docker CLI binary
    #[serde(default = "default_docker_bin")]
    pub docker_bin: String,

    /// Image launched by `PUT /server/load`
    #[serde(default = "default_load_generator_image")]
    pub load_generator_image: String,

    #[serde(default = "default_gpu_probe_enabled")]
    pub gpu_probe_enabled: bool,

    #[serde(default = "default_clinfo_bin")]
    pub clinfo_bin: String,

    /// How long `clinfo` may run before the host is treated as GPU-less
    #[serde(default = "default_clinfo_timeout")]
    pub clinfo_timeout_ms: u64,

    /// Root of the sysfs tree holding cpufreq
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: String,

    /// Grace period before `docker stop` kills a container
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_docker_bin() -> String {
    "docker".to_string()
}

fn default_load_generator_image() -> String {
    DEFAULT_LOAD_GENERATOR_IMAGE.to_string()
}

fn default_gpu_probe_enabled() -> bool {
    true
}

fn default_clinfo_bin() -> String {
    "clinfo".to_string()
}

fn default_clinfo_timeout() -> u64 {
    CLINFO_TIMEOUT.as_millis() as u64
}

fn default_sysfs_root() -> String {
    "/sys".to_string()
}

fn default_stop_timeout() -> u64 {
    10
}

impl AgentConfig {
    /// Load configuration from environment and an optional config file.
    ///
    /// Environment wins over the file. Malformed values fail startup rather
    /// than falling back to defaults.
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            builder = builder.add_source(config::File::with_name(&path));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("AGENT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read agent configuration")?;

        config
            .try_deserialize()
            .context("Invalid agent configuration")
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub fn clinfo_timeout(&self) -> Duration {
        Duration::from_millis(self.clinfo_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_keys() {
        let config: AgentConfig = config::Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.api_port, 8080);
        assert_eq!(config.docker_bin, "docker");
        assert_eq!(config.load_generator_image, DEFAULT_LOAD_GENERATOR_IMAGE);
        assert!(config.gpu_probe_enabled);
        assert_eq!(config.sysfs_root, "/sys");
        assert_eq!(config.stop_timeout(), Duration::from_secs(10));
        assert_eq!(config.clinfo_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_explicit_values_override_defaults() {
        let config: AgentConfig = config::Config::builder()
            .set_override("api_port", 9191)
            .unwrap()
            .set_override("gpu_probe_enabled", false)
            .unwrap()
            .set_override("load_generator_image", "stress:2")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.api_port, 9191);
        assert!(!config.gpu_probe_enabled);
        assert_eq!(config.load_generator_image, "stress:2");
    }

    #[test]
    fn test_invalid_value_is_an_error() {
        let result: std::result::Result<AgentConfig, _> = config::Config::builder()
            .set_override("api_port", "not-a-port")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize();

        assert!(result.is_err());
    }
}
