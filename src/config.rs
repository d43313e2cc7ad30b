use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::error::{Result, DeskError};

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_autosave_interval_secs() -> u64 {
    3
}

fn default_poll_interval_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub editor: EditorConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the task server, without trailing slash
    pub url: String,
    /// Per-request timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Account used to log in before each command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorConfig {
    /// Period of the autosave timer
    #[serde(default = "default_autosave_interval_secs")]
    pub autosave_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Period between task state fetches
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for the daily rolling log file
    pub dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:5000".to_string(),
            request_timeout_secs: default_request_timeout_secs(),
            username: None,
            password: None,
        }
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            autosave_interval_secs: default_autosave_interval_secs(),
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".subdub/log"),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Credentials, if both halves are configured
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }
}

impl EditorConfig {
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs.max(1))
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DeskError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| DeskError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DeskError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| DeskError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.server.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(DeskError::Config(format!(
                "Server url must start with http:// or https://, got '{}'",
                self.server.url
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.url, "http://localhost:5000");
        assert_eq!(config.editor.autosave_interval(), Duration::from_secs(3));
        assert_eq!(config.poller.interval(), Duration::from_secs(10));
        assert!(config.server.credentials().is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = dir.child("subdub.toml");
        file.write_str("[server]\nurl = \"https://tasks.example.org\"\nusername = \"anna\"\npassword = \"pw\"\n")
            .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.url, "https://tasks.example.org");
        assert_eq!(config.server.request_timeout_secs, 30);
        assert_eq!(config.server.credentials(), Some(("anna", "pw")));
        assert_eq!(config.editor.autosave_interval_secs, 3);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = dir.child("out.toml");
        let mut config = Config::default();
        config.poller.interval_secs = 5;
        config.save_to_file(file.path()).unwrap();

        let reloaded = Config::from_file(file.path()).unwrap();
        assert_eq!(reloaded.poller.interval_secs, 5);
    }

    #[test]
    fn test_rejects_bad_url() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = dir.child("bad.toml");
        file.write_str("[server]\nurl = \"localhost:5000\"\n").unwrap();
        assert!(matches!(Config::from_file(file.path()), Err(DeskError::Config(_))));
    }
}
