//! Daemon configuration.
//!
//! Read once at startup from an optional JSON file, overridden by CLI flags,
//! then validated and shared read-only with every component.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use mirror_core::{DEFAULT_DEBOUNCE_WINDOW_SECS, LISTENER_ECHO_WINDOW_SECS};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

/// Main configuration for one mirroring node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory tree being mirrored
    pub sync_dir: PathBuf,

    /// Watch subdirectories too
    #[serde(default = "default_true")]
    pub watch_recursive: bool,

    /// Create `sync_dir` at startup if it is missing
    #[serde(default)]
    pub auto_create_sync_dir: bool,

    /// Address the listener binds to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Port the listener binds to
    #[serde(default = "default_port")]
    pub listen_port: u16,

    /// Peer machine address
    #[serde(default)]
    pub peer_ip: String,

    /// Peer listener port
    #[serde(default = "default_port")]
    pub peer_port: u16,

    /// Extra headers sent with every push and fetch (e.g. Authorization)
    #[serde(default)]
    pub auth_headers: HashMap<String, String>,

    /// Reply with an `ack` timestamp (true) or echo the envelope back (false)
    #[serde(default = "default_true")]
    pub send_ack: bool,

    /// How long an applied peer change suppresses the local echo
    #[serde(default = "default_echo_window")]
    pub echo_window_secs: u64,

    /// Debounce window for raw watcher notifications
    #[serde(default = "default_debounce_window")]
    pub debounce_window_secs: u64,

    /// Capacity of the listener -> watcher echo channel
    #[serde(default = "default_echo_capacity")]
    pub echo_channel_capacity: usize,
}

fn default_true() -> bool {
    true
}

fn default_listen_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_echo_window() -> u64 {
    LISTENER_ECHO_WINDOW_SECS
}

fn default_debounce_window() -> u64 {
    DEFAULT_DEBOUNCE_WINDOW_SECS
}

fn default_echo_capacity() -> usize {
    1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync_dir: PathBuf::from("/tmp/sstest"),
            watch_recursive: true,
            auto_create_sync_dir: false,
            listen_addr: default_listen_addr(),
            listen_port: default_port(),
            peer_ip: String::new(),
            peer_port: default_port(),
            auth_headers: HashMap::new(),
            send_ack: true,
            echo_window_secs: default_echo_window(),
            debounce_window_secs: default_debounce_window(),
            echo_channel_capacity: default_echo_capacity(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, or defaults when no file is given.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let Some(config_file) = config_file else {
            tracing::info!("No config file given, using defaults");
            return Ok(Config::default());
        };

        let content = std::fs::read_to_string(config_file)
            .with_context(|| format!("Failed to read config file: {:?}", config_file))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {:?}", config_file))?;
        tracing::info!("Loaded configuration from {:?}", config_file);
        Ok(config)
    }

    /// Check the configuration and prepare the sync directory.
    ///
    /// Resolves `sync_dir` to its canonical path so watcher events (which
    /// report real paths) can be made relative to it.
    pub fn prepare(&mut self) -> Result<()> {
        if self.peer_ip.trim().is_empty() {
            bail!("peer_ip is not set");
        }

        if !self.sync_dir.exists() {
            if self.auto_create_sync_dir {
                std::fs::create_dir_all(&self.sync_dir).with_context(|| {
                    format!("Failed to create sync directory: {:?}", self.sync_dir)
                })?;
                tracing::info!("Created sync directory {:?}", self.sync_dir);
            } else {
                bail!("sync directory does not exist: {:?}", self.sync_dir);
            }
        }

        if !self.sync_dir.is_dir() {
            bail!("sync path is not a directory: {:?}", self.sync_dir);
        }

        self.sync_dir = self
            .sync_dir
            .canonicalize()
            .with_context(|| format!("Failed to resolve {:?}", self.sync_dir))?;

        // Fail at startup rather than on the first push.
        self.header_map()?;
        Ok(())
    }

    /// Base URL of the peer's listener, without trailing slash.
    pub fn peer_url(&self) -> String {
        format!("http://{}:{}", self.peer_ip, self.peer_port)
    }

    /// Socket address string the listener binds to.
    pub fn listen_socket(&self) -> String {
        format!("{}:{}", self.listen_addr, self.listen_port)
    }

    /// `auth_headers` as a reqwest header map.
    pub fn header_map(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.auth_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("Invalid header name: {}", name))?;
            let value = HeaderValue::from_str(value)
                .with_context(|| format!("Invalid value for header {}", name))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_gets_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("mirror.json");
        std::fs::write(&file, r#"{"sync_dir": "/srv/share", "peer_ip": "10.0.0.2"}"#).unwrap();

        let config = Config::load(Some(&file)).unwrap();
        assert_eq!(config.sync_dir, PathBuf::from("/srv/share"));
        assert_eq!(config.peer_url(), "http://10.0.0.2:8000");
        assert!(config.watch_recursive);
        assert!(config.send_ack);
        assert_eq!(config.echo_window_secs, 10);
        assert_eq!(config.debounce_window_secs, 5);
    }

    #[test]
    fn test_prepare_requires_peer() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config {
            sync_dir: temp_dir.path().to_path_buf(),
            ..Default::default()
        };
        assert!(config.prepare().is_err());
    }

    #[test]
    fn test_prepare_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("share");

        let mut config = Config {
            sync_dir: missing.clone(),
            peer_ip: "127.0.0.1".into(),
            ..Default::default()
        };
        assert!(config.prepare().is_err());

        config.auto_create_sync_dir = true;
        config.prepare().unwrap();
        assert!(missing.is_dir());
        assert!(config.sync_dir.is_absolute());
    }

    #[test]
    fn test_header_map() {
        let mut config = Config::default();
        config
            .auth_headers
            .insert("Authorization".into(), "Bearer abc".into());
        let headers = config.header_map().unwrap();
        assert_eq!(headers.get("authorization").unwrap(), "Bearer abc");

        config.auth_headers.insert("bad header".into(), "x".into());
        assert!(config.header_map().is_err());
    }
}
