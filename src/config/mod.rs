//! Configuration management for the audio monitor
//!
//! Handles loading, defaulting and validation of the YAML configuration
//! file. Every key is optional; a missing file means "all defaults".

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use tracing::warn;

pub use watcher::LogWatcher;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub mqtt: MqttConfig,
    pub monitor: MonitorConfig,
    pub cache: CacheConfig,
    pub evidence: EvidenceConfig,
}

/// MQTT broker and topic configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_source_topic")]
    pub source_topic: String,
    #[serde(default = "default_details_topic")]
    pub details_topic: String,
    #[serde(default = "default_true")]
    pub retain: bool,
}

/// Polling and debounce timing
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MonitorConfig {
    /// Minimum time between two resolutions
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Pause before re-resolving a tentative change
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Pause after a failed cycle
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
}

/// Read cache configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl_ms")]
    pub ttl_ms: u64,
}

/// Where evidence is read from and how much of it
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EvidenceConfig {
    #[serde(default = "default_asound_root")]
    pub asound_root: String,
    #[serde(default = "default_proc_root")]
    pub proc_root: String,
    #[serde(default = "default_spotify_log")]
    pub spotify_log: String,
    #[serde(default = "default_spotify_tail_lines")]
    pub spotify_tail_lines: usize,
    #[serde(default = "default_airplay_log")]
    pub airplay_log: String,
    #[serde(default = "default_airplay_tail_lines")]
    pub airplay_tail_lines: usize,
    #[serde(default = "default_mpc_command")]
    pub mpc_command: String,
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            client_id: default_client_id(),
            username: None,
            password: None,
            keep_alive_secs: default_keep_alive_secs(),
            source_topic: default_source_topic(),
            details_topic: default_details_topic(),
            retain: default_true(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            error_backoff_ms: default_error_backoff_ms(),
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_cache_ttl_ms(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            asound_root: default_asound_root(),
            proc_root: default_proc_root(),
            spotify_log: default_spotify_log(),
            spotify_tail_lines: default_spotify_tail_lines(),
            airplay_log: default_airplay_log(),
            airplay_tail_lines: default_airplay_tail_lines(),
            mpc_command: default_mpc_command(),
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

impl EvidenceConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Log files whose modification invalidates the read cache
    pub fn watched_logs(&self) -> Vec<PathBuf> {
        vec![
            PathBuf::from(&self.spotify_log),
            PathBuf::from(&self.airplay_log),
        ]
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config = Self::from_yaml(&contents)
            .with_context(|| format!("Invalid config file: {}", path))?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is absent
    pub async fn load_or_default(path: &str) -> Result<Self> {
        match fs::metadata(path).await {
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Config file not found at {}, using default settings", path);
                Ok(Self::default())
            }
            _ => Self::load(path).await,
        }
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self> {
        // An empty document deserializes to unit, not to an empty map
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: AppConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.mqtt.host.trim().is_empty() {
            anyhow::bail!("mqtt.host cannot be empty");
        }
        if self.mqtt.port == 0 {
            anyhow::bail!("mqtt.port cannot be 0");
        }
        if self.mqtt.source_topic.trim().is_empty() {
            anyhow::bail!("mqtt.source_topic cannot be empty");
        }
        if self.mqtt.details_topic.trim().is_empty() {
            anyhow::bail!("mqtt.details_topic cannot be empty");
        }
        if self.mqtt.source_topic == self.mqtt.details_topic {
            anyhow::bail!(
                "mqtt.source_topic and mqtt.details_topic must differ (both '{}')",
                self.mqtt.source_topic
            );
        }

        if self.monitor.poll_interval_ms == 0 {
            anyhow::bail!("monitor.poll_interval_ms must be greater than 0");
        }
        if self.monitor.settle_delay_ms >= self.monitor.poll_interval_ms {
            anyhow::bail!(
                "monitor.settle_delay_ms ({}) must be shorter than monitor.poll_interval_ms ({})",
                self.monitor.settle_delay_ms,
                self.monitor.poll_interval_ms
            );
        }

        if self.cache.ttl_ms == 0 {
            anyhow::bail!("cache.ttl_ms must be greater than 0");
        }

        if self.evidence.spotify_tail_lines == 0 {
            anyhow::bail!("evidence.spotify_tail_lines must be greater than 0");
        }
        if self.evidence.airplay_tail_lines == 0 {
            anyhow::bail!("evidence.airplay_tail_lines must be greater than 0");
        }
        if self.evidence.command_timeout_ms == 0 {
            anyhow::bail!("evidence.command_timeout_ms must be greater than 0");
        }
        if self.evidence.mpc_command.trim().is_empty() {
            anyhow::bail!("evidence.mpc_command cannot be empty");
        }

        Ok(())
    }
}

// Default value functions
fn default_mqtt_host() -> String { "localhost".to_string() }
fn default_mqtt_port() -> u16 { 1883 }
fn default_client_id() -> String { "moode-audio-monitor".to_string() }
fn default_keep_alive_secs() -> u64 { 30 }
fn default_source_topic() -> String { "moode/audio/source".to_string() }
fn default_details_topic() -> String { "moode/audio/details".to_string() }
fn default_true() -> bool { true }
fn default_poll_interval_ms() -> u64 { 2000 }
fn default_settle_delay_ms() -> u64 { 500 }
fn default_error_backoff_ms() -> u64 { 1000 }
fn default_cache_ttl_ms() -> u64 { 5000 }
fn default_asound_root() -> String { "/proc/asound".to_string() }
fn default_proc_root() -> String { "/proc".to_string() }
fn default_spotify_log() -> String { "/var/log/moode_librespot.log".to_string() }
fn default_spotify_tail_lines() -> usize { 100 }
fn default_airplay_log() -> String { "/var/log/moode_shairport-sync.log".to_string() }
fn default_airplay_tail_lines() -> usize { 30 }
fn default_mpc_command() -> String { "mpc".to_string() }
fn default_command_timeout_ms() -> u64 { 10_000 }
