//! Configuration management for the marquee router.
//!
//! Loads configuration from TOML files and provides runtime defaults.

use crate::types::{DeviceMode, EmulatorKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub publish: PublishConfig,

    #[serde(default)]
    pub windows: WindowsConfig,

    #[serde(default)]
    pub device: DeviceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// When false only errors are logged
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level (trace, debug, info, warning, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
        }
    }
}

impl LoggingConfig {
    /// Filter directive for `tracing_subscriber::EnvFilter`
    pub fn filter_directive(&self) -> &'static str {
        if !self.enabled {
            return "error";
        }
        match self.level.trim().to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "warn" | "warning" => "warn",
            "error" | "critical" => "error",
            _ => "info",
        }
    }
}

/// Where payloads are delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishTarget {
    /// Atomic replace of a file on this machine
    #[default]
    Local,
    /// Atomic replace of a file on the marquee host over SFTP
    Sftp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default)]
    pub target: PublishTarget,

    /// Channel file read by the marquee display
    #[serde(default = "default_channel_path")]
    pub path: PathBuf,

    #[serde(default)]
    pub sftp: SftpConfig,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            target: PublishTarget::default(),
            path: default_channel_path(),
            sftp: SftpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SftpConfig {
    /// Marquee host name or address
    #[serde(default)]
    pub host: String,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    #[serde(default)]
    pub username: String,

    /// Password authentication; used when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Private key authentication (defaults to ~/.ssh/id_rsa without a password)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<PathBuf>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

impl Default for SftpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_ssh_port(),
            username: String::new(),
            password: None,
            key_path: None,
            connect_timeout_seconds: default_connect_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowsConfig {
    /// Window polling interval in milliseconds
    #[serde(default = "default_window_interval")]
    pub poll_interval_ms: u64,

    /// Process executable name to emulator kind
    #[serde(default = "default_process_kinds")]
    pub process_kinds: BTreeMap<String, EmulatorKind>,
}

impl Default for WindowsConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_window_interval(),
            process_kinds: default_process_kinds(),
        }
    }
}

impl WindowsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Emulator kind for a process name (case-insensitive)
    pub fn kind_for_process(&self, process_name: &str) -> Option<EmulatorKind> {
        self.process_kinds
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(process_name))
            .map(|(_, kind)| *kind)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device polling interval in seconds
    #[serde(default = "default_device_interval")]
    pub poll_interval_seconds: u64,

    /// Per-request HTTP timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,

    /// MemCard Pro 2 address (PS1/PS2, reports its own mode)
    #[serde(default)]
    pub mcp2_host: String,

    /// MemCard Pro GC address (always GameCube mode)
    #[serde(default)]
    pub mcp_gc_host: String,

    /// CSV table mapping game ids to titles
    #[serde(default = "default_game_db_path")]
    pub game_db_path: PathBuf,

    #[serde(default)]
    pub default_cards: DefaultCards,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_device_interval(),
            http_timeout_seconds: default_http_timeout(),
            mcp2_host: String::new(),
            mcp_gc_host: String::new(),
            game_db_path: default_game_db_path(),
            default_cards: DefaultCards::default(),
        }
    }
}

impl DeviceConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds.max(1))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds.max(1))
    }
}

/// Memory card ids that mean "no game, the console menu is showing"
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultCards {
    #[serde(default)]
    pub ps1: String,

    #[serde(default = "default_ps2_card")]
    pub ps2: String,

    #[serde(default)]
    pub gc: String,
}

impl Default for DefaultCards {
    fn default() -> Self {
        Self {
            ps1: String::new(),
            ps2: default_ps2_card(),
            gc: String::new(),
        }
    }
}

impl DefaultCards {
    /// Normalized default-card token for a mode, if one is configured
    pub fn token_for(&self, mode: Option<&DeviceMode>) -> Option<String> {
        let raw = match mode? {
            DeviceMode::Ps1 => &self.ps1,
            DeviceMode::Ps2 => &self.ps2,
            DeviceMode::Gc => &self.gc,
            DeviceMode::Unrecognized(_) => return None,
        };
        let token = raw.trim().to_uppercase();
        (!token.is_empty()).then_some(token)
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_channel_path() -> PathBuf {
    PathBuf::from("/dev/shm/tty2rpi.socket")
}

fn default_ssh_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_window_interval() -> u64 {
    500
}

fn default_device_interval() -> u64 {
    5
}

fn default_http_timeout() -> u64 {
    3
}

fn default_game_db_path() -> PathBuf {
    PathBuf::from("Game_DB.csv")
}

fn default_ps2_card() -> String {
    "MemoryCard1".to_string()
}

fn default_process_kinds() -> BTreeMap<String, EmulatorKind> {
    [
        ("mame.exe", EmulatorKind::Mame),
        ("flycast.exe", EmulatorKind::Flycast),
        ("duckstation-qt-x64-releaseltcg.exe", EmulatorKind::DuckStation),
        ("teknoparrotui.exe", EmulatorKind::TeknoParrot),
        ("pcsx2.exe", EmulatorKind::Pcsx2),
        ("pcsx2-qt.exe", EmulatorKind::Pcsx2),
        ("pcsx2-qtx64-avx2.exe", EmulatorKind::Pcsx2),
        ("dolphin.exe", EmulatorKind::Dolphin),
        ("dolphinqt.exe", EmulatorKind::Dolphin),
        ("dolphinqt2.exe", EmulatorKind::Dolphin),
    ]
    .into_iter()
    .map(|(name, kind)| (name.to_string(), kind))
    .collect()
}

impl Config {
    /// Load configuration from a specific path.
    ///
    /// A missing file yields the defaults; an unreadable or malformed one is an error.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("marquee-router")
            .join("config.toml")
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(io_err)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Check the settings the publisher needs
    pub fn validate_publish(&self) -> Result<(), ConfigError> {
        if self.publish.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("publish.path is empty".to_string()));
        }
        if self.publish.target == PublishTarget::Sftp {
            let sftp = &self.publish.sftp;
            if sftp.host.trim().is_empty() || sftp.username.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "publish.sftp.host and publish.sftp.username are required for the sftp target"
                        .to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Check the settings the device watcher needs
    pub fn validate_device(&self) -> Result<(), ConfigError> {
        if self.device.mcp2_host.trim().is_empty() && self.device.mcp_gc_host.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "device.mcp2_host or device.mcp_gc_host must be set".to_string(),
            ));
        }
        Ok(())
    }

    /// Check the settings the window watcher needs
    pub fn validate_windows(&self) -> Result<(), ConfigError> {
        if self.windows.process_kinds.is_empty() {
            return Err(ConfigError::Invalid(
                "windows.process_kinds must name at least one process".to_string(),
            ));
        }
        Ok(())
    }
}
