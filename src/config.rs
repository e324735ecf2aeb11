//! Configuration management for expose.
//!
//! Handles loading and saving configuration from the platform config
//! directory (`~/.config/expose/config.toml` on Linux).

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_APP_NAME: &str = "TaskPool";
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub tunnel: TunnelConfig,
}

/// How to reach the ngrok agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent binary; looked up on `PATH` when unset
    pub path: Option<PathBuf>,
    pub authtoken: Option<String>,
    /// Passed to the agent as `--config`
    pub config_path: Option<PathBuf>,
    /// Attach to an already running agent instead of spawning one
    pub api_url: Option<String>,
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_app_name")]
    pub app_name: String,
    /// Refuse to open a tunnel when nothing listens on the local port
    #[serde(default)]
    pub check_upstream: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_app_name() -> String {
    DEFAULT_APP_NAME.to_string()
}

fn default_startup_timeout_secs() -> u64 {
    DEFAULT_STARTUP_TIMEOUT_SECS
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            path: None,
            authtoken: None,
            config_path: None,
            api_url: None,
            startup_timeout_secs: DEFAULT_STARTUP_TIMEOUT_SECS,
        }
    }
}

impl AgentConfig {
    pub fn binary(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| PathBuf::from("ngrok"))
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            app_name: default_app_name(),
            check_upstream: false,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    /// Store `token` in the file at `path`, keeping its other settings.
    /// A file that fails to parse is left untouched.
    pub fn save_authtoken(path: &Path, token: &str) -> Result<()> {
        let mut config = Self::load_from(path)?;
        config.agent.authtoken = Some(token.to_string());
        config.save_to(path)
    }

    pub fn config_path() -> Result<PathBuf> {
        let proj_dirs =
            ProjectDirs::from("", "", "expose").context("Could not determine config directory")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();

        assert_eq!(config.tunnel.port, 8000);
        assert_eq!(config.tunnel.app_name, "TaskPool");
        assert!(!config.tunnel.check_upstream);
        assert_eq!(config.agent.startup_timeout_secs, 15);
        assert_eq!(config.agent.binary(), PathBuf::from("ngrok"));
    }

    #[test]
    fn test_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.agent.authtoken = Some("2abcDEF_token".to_string());
        config.tunnel.port = 3000;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.agent.authtoken.as_deref(), Some("2abcDEF_token"));
        assert_eq!(loaded.tunnel.port, 3000);
    }

    #[test]
    fn test_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[agent]\napi_url = \"http://127.0.0.1:4040\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.agent.api_url.as_deref(), Some("http://127.0.0.1:4040"));
        assert_eq!(config.agent.startup_timeout_secs, 15);
        assert_eq!(config.tunnel.port, 8000);
    }

    #[test]
    fn test_save_authtoken_keeps_settings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[tunnel]\nport = 3000\napp_name = \"Demo\"\n").unwrap();

        Config::save_authtoken(&path, "2abcDEF_token").unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.agent.authtoken.as_deref(), Some("2abcDEF_token"));
        assert_eq!(loaded.tunnel.port, 3000);
        assert_eq!(loaded.tunnel.app_name, "Demo");
    }

    #[test]
    fn test_save_authtoken_refuses_broken_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let original = "[tunnel]\nport = \"eighty\"\n";
        fs::write(&path, original).unwrap();

        assert!(Config::save_authtoken(&path, "2abcDEF_token").is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn test_invalid_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[tunnel]\nport = \"eighty\"\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
