//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Agent URL used when neither flag, environment nor config file names one
pub const DEFAULT_AGENT_URL: &str = "http://localhost:8080";

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Agent endpoint URL
    pub agent_url: Option<String>,
}

impl Config {
    /// Load configuration from the default location; a missing file is empty config
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).context("Failed to read config file")?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// Pick the agent URL: explicit value first, then config file, then default
    pub fn resolve_agent_url(&self, explicit: Option<String>) -> String {
        explicit
            .or_else(|| self.agent_url.clone())
            .unwrap_or_else(|| DEFAULT_AGENT_URL.to_string())
    }

    /// Get the configuration file path
    fn config_path() -> Option<PathBuf> {
        let home = dirs_next::home_dir()?;
        Some(home.join(".config").join("gridctl").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_default() {
        let config = Config::load_from(Path::new("/nonexistent/gridctl/config.json")).unwrap();
        assert!(config.agent_url.is_none());
    }

    #[test]
    fn test_agent_url_precedence() {
        let config: Config =
            serde_json::from_str(r#"{"agent_url": "http://worker-3:8080"}"#).unwrap();

        assert_eq!(
            config.resolve_agent_url(Some("http://other:9000".to_string())),
            "http://other:9000"
        );
        assert_eq!(config.resolve_agent_url(None), "http://worker-3:8080");
        assert_eq!(Config::default().resolve_agent_url(None), DEFAULT_AGENT_URL);
    }
}
