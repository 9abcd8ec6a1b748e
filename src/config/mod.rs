//! # Configuration Management Module
//!
//! Application-level configuration for pinwatch: where board settings live, how
//! often pins are polled, serial link parameters and logging.
//!
//! This is separate from the board settings file (see [`crate::settings`]),
//! which the interactive shell edits and the debounced saver writes. The
//! configuration here is read once at startup and never written back except by
//! `pinwatch init`.
//!
//! ## Configuration File Format
//!
//! ```toml
//! [settings]
//! file = "pinwatch_settings.json"
//! save_debounce_ms = 500
//!
//! [poll]
//! refresh_interval_secs = 3
//! tick_ms = 100
//! read_timeout_ms = 3000
//! max_concurrent_reads = 8
//! placeholder_value = "100oC"
//!
//! [serial]
//! timeout_ms = 500
//! default_baud = 9600
//!
//! [logging]
//! level = "info"
//! data_log = "pinwatch_data.log"
//! ```
//!
//! Every section is optional; missing values take the defaults shown above.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// Board settings file (JSON key/value map)
    #[serde(default = "default_settings_file")]
    pub file: String,
    /// Coalescing window for dirty notifications before a save is written (ms)
    #[serde(default = "default_save_debounce_ms")]
    pub save_debounce_ms: u64,
}

fn default_settings_file() -> String {
    "pinwatch_settings.json".to_string()
}

fn default_save_debounce_ms() -> u64 {
    500
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            file: default_settings_file(),
            save_debounce_ms: default_save_debounce_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Seconds between refresh cycles while the data view is open
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// UI tick; the view waits at most this long for a close event per tick (ms)
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Upper bound on a single pin read (ms)
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Size of the read worker pool
    #[serde(default = "default_max_concurrent_reads")]
    pub max_concurrent_reads: usize,
    /// Value returned by the placeholder transaction
    #[serde(default = "default_placeholder_value")]
    pub placeholder_value: String,
}

fn default_refresh_interval_secs() -> u64 {
    3
}

fn default_tick_ms() -> u64 {
    100
}

fn default_read_timeout_ms() -> u64 {
    3000
}

fn default_max_concurrent_reads() -> usize {
    8
}

fn default_placeholder_value() -> String {
    "100oC".to_string()
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
            tick_ms: default_tick_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            max_concurrent_reads: default_max_concurrent_reads(),
            placeholder_value: default_placeholder_value(),
        }
    }
}

impl PollConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Read timeout applied to an opened port (ms)
    #[serde(default = "default_serial_timeout_ms")]
    pub timeout_ms: u64,
    /// Baud rate suggested during first-run setup
    #[serde(default = "default_baud")]
    pub default_baud: u32,
}

fn default_serial_timeout_ms() -> u64 {
    500
}

fn default_baud() -> u32 {
    9600
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_serial_timeout_ms(),
            default_baud: default_baud(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<String>,
    /// Destination for "read and log" data lines
    #[serde(default = "default_data_log")]
    pub data_log: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_log() -> String {
    "pinwatch_data.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
            data_log: default_data_log(),
        }
    }
}

impl LoggingConfig {
    /// Parse the configured level, falling back to Info.
    pub fn level_filter(&self) -> log::LevelFilter {
        match self.level.to_ascii_lowercase().as_str() {
            "off" => log::LevelFilter::Off,
            "error" => log::LevelFilter::Error,
            "warn" | "warning" => log::LevelFilter::Warn,
            "debug" => log::LevelFilter::Debug,
            "trace" => log::LevelFilter::Trace,
            _ => log::LevelFilter::Info,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let mut config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;
        config.validate();

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Clamp values that would stall or spin the poll loop.
    pub fn validate(&mut self) {
        if self.poll.refresh_interval_secs == 0 {
            log::warn!("poll.refresh_interval_secs must be >= 1; using 1");
            self.poll.refresh_interval_secs = 1;
        }
        if self.poll.tick_ms < 10 {
            log::warn!("poll.tick_ms {} too small; using 10", self.poll.tick_ms);
            self.poll.tick_ms = 10;
        }
        if self.poll.read_timeout_ms == 0 {
            self.poll.read_timeout_ms = default_read_timeout_ms();
        }
        if self.poll.max_concurrent_reads == 0 {
            log::warn!("poll.max_concurrent_reads must be >= 1; using 1");
            self.poll.max_concurrent_reads = 1;
        }
        if self.settings.file.trim().is_empty() {
            self.settings.file = default_settings_file();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.settings.file, "pinwatch_settings.json");
        assert_eq!(cfg.poll.refresh_interval(), Duration::from_secs(3));
        assert_eq!(cfg.poll.tick(), Duration::from_millis(100));
        assert_eq!(cfg.poll.placeholder_value, "100oC");
        assert_eq!(cfg.serial.default_baud, 9600);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: Config = toml::from_str("[poll]\nrefresh_interval_secs = 5\n").unwrap();
        assert_eq!(cfg.poll.refresh_interval_secs, 5);
        assert_eq!(cfg.poll.tick_ms, 100);
        assert_eq!(cfg.settings.save_debounce_ms, 500);
    }

    #[test]
    fn validate_clamps_zero_values() {
        let mut cfg = Config::default();
        cfg.poll.refresh_interval_secs = 0;
        cfg.poll.tick_ms = 0;
        cfg.poll.max_concurrent_reads = 0;
        cfg.settings.file = "  ".into();
        cfg.validate();
        assert_eq!(cfg.poll.refresh_interval_secs, 1);
        assert_eq!(cfg.poll.tick_ms, 10);
        assert_eq!(cfg.poll.max_concurrent_reads, 1);
        assert_eq!(cfg.settings.file, "pinwatch_settings.json");
    }

    #[test]
    fn level_filter_parsing() {
        let mut logging = LoggingConfig::default();
        assert_eq!(logging.level_filter(), log::LevelFilter::Info);
        logging.level = "DEBUG".into();
        assert_eq!(logging.level_filter(), log::LevelFilter::Debug);
        logging.level = "nonsense".into();
        assert_eq!(logging.level_filter(), log::LevelFilter::Info);
    }

    #[tokio::test]
    async fn create_default_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let path = path.to_str().unwrap();
        Config::create_default(path).await.unwrap();
        let cfg = Config::load(path).await.unwrap();
        assert_eq!(cfg.poll.read_timeout_ms, 3000);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let result = tokio_test::block_on(Config::load(path.to_str().unwrap()));
        assert!(result.is_err());
    }
}
