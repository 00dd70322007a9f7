//! YAML configuration loading
//!
//! All durations in the file are integer seconds.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default config location used by `init` and by `scan` when `--config` is
/// not given.
pub const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scan: ScanConfig,
    pub network: NetworkConfig,
    pub rtsp: RtspConfig,
    pub log: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scan: ScanConfig::default(),
            network: NetworkConfig::default(),
            rtsp: RtspConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// Scan settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Subnet in CIDR notation; empty means auto-detect
    pub subnet: String,
    /// Per-port TCP connect timeout, seconds
    pub port_timeout: u64,
    /// Multicast discovery listen window, seconds
    pub discovery_timeout: u64,
    /// Global bound on concurrent host scans
    pub max_concurrency: usize,
    /// Ports probed on every host
    pub ports: Vec<u16>,
    pub enable_onvif: bool,
    pub enable_upnp: bool,
    /// Enumerate RTSP streams on hosts that speak RTSP
    pub check_rtsp: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            subnet: String::new(),
            port_timeout: 2,
            discovery_timeout: 10,
            max_concurrency: 50,
            ports: vec![554, 1935, 80, 8080, 8554],
            enable_onvif: true,
            enable_upnp: true,
            check_rtsp: false,
        }
    }
}

impl ScanConfig {
    pub fn port_timeout(&self) -> Duration {
        Duration::from_secs(self.port_timeout.max(1))
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout.max(1))
    }
}

/// Network settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub auto_detect_subnet: bool,
    /// Interface name to prefer for auto-detection; empty means first active
    pub interface: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            auto_detect_subnet: true,
            interface: String::new(),
        }
    }
}

/// RTSP client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RtspConfig {
    /// Per-request I/O timeout, seconds
    pub timeout: u64,
    /// Fall back to ffprobe when the built-in client fails
    pub use_ffmpeg: bool,
    /// Path to ffmpeg/ffprobe; empty means resolve from PATH
    pub ffmpeg_path: String,
    /// Stream paths tried during discovery
    pub default_paths: Vec<String>,
}

impl Default for RtspConfig {
    fn default() -> Self {
        Self {
            timeout: 5,
            use_ffmpeg: true,
            ffmpeg_path: String::new(),
            default_paths: vec![
                "/Streaming/Channels/101".to_string(),
                "/Streaming/Channels/1".to_string(),
                "/live/main_stream".to_string(),
                "/live".to_string(),
                "/cam/realmonitor".to_string(),
            ],
        }
    }
}

impl RtspConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.max(1))
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// debug | info | warn | error
    pub level: String,
    /// text | json
    pub format: String,
    /// Log file path; empty means stdout
    pub file: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            file: String::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`. An empty path falls back to
    /// [`DEFAULT_CONFIG_PATH`] when that file exists, otherwise defaults.
    pub fn load(path: &str) -> Result<Self> {
        let path = if path.is_empty() {
            if Path::new(DEFAULT_CONFIG_PATH).exists() {
                DEFAULT_CONFIG_PATH
            } else {
                return Ok(Self::default());
            }
        } else {
            path
        };

        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {path}: {e}")))?;
        let config: AppConfig = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.scan.max_concurrency == 0 {
            return Err(Error::Config("scan.max_concurrency must be positive".into()));
        }
        if self.scan.ports.is_empty() {
            return Err(Error::Config("scan.ports must not be empty".into()));
        }
        match self.log.level.as_str() {
            "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(Error::Config(format!("unknown log.level: {other}")));
            }
        }
        match self.log.format.as_str() {
            "text" | "json" => {}
            other => {
                return Err(Error::Config(format!("unknown log.format: {other}")));
            }
        }
        Ok(())
    }

    /// Write the default configuration to `path`, creating parent
    /// directories as needed.
    pub fn write_default_file(path: &str) -> Result<()> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let yaml = serde_yaml::to_string(&AppConfig::default())?;
        std::fs::write(path, yaml)?;
        Ok(())
    }
}
