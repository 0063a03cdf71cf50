use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub service: ServiceConfig,
    pub camera: CameraConfig,
    pub capture: CaptureConfig,
    pub output: OutputConfig,
}

/// Detection service endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceConfig {
    /// HTTP origin of the detection service. The streaming endpoint is the
    /// same origin with a ws:// (or wss://) scheme.
    #[serde(default = "default_origin")]
    pub origin: String,
}

/// Camera source configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CameraConfig {
    /// "pattern" for the synthetic source, "gstreamer" for a real device
    /// (requires the `camera-gstreamer` feature).
    #[serde(default = "default_source")]
    pub source: String,

    #[serde(default = "default_device")]
    pub device: String,

    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    #[serde(default = "default_fps")]
    pub fps: u32,
}

/// Capture loop configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CaptureConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

/// Where annotated frames go
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path the latest annotated frame is written to. When unset, inbound
    /// frames are decoded and counted but not persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_path: Option<PathBuf>,
}

// Default value functions
fn default_origin() -> String {
    "http://127.0.0.1:5000".to_string()
}
fn default_source() -> String {
    "pattern".to_string()
}
fn default_device() -> String {
    "/dev/video0".to_string()
}
fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    480
}
fn default_fps() -> u32 {
    30
}
fn default_interval_ms() -> u64 {
    100
}
fn default_jpeg_quality() -> u8 {
    80
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            origin: default_origin(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        CameraConfig {
            source: default_source(),
            device: default_device(),
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            interval_ms: default_interval_ms(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            service: ServiceConfig::default(),
            camera: CameraConfig::default(),
            capture: CaptureConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {:?}", path.as_ref()))?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        config.origin_url()?;
        Ok(config)
    }

    /// Load from a file if it exists, fall back to defaults otherwise
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            Ok(Config::default())
        }
    }

    /// Parsed HTTP origin of the detection service
    pub fn origin_url(&self) -> Result<Url> {
        Url::parse(&self.service.origin)
            .with_context(|| format!("Invalid service origin '{}'", self.service.origin))
    }

    /// WebSocket endpoint derived from the service origin
    pub fn ws_endpoint(&self) -> Result<Url> {
        let mut url = self.origin_url()?;
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| anyhow::anyhow!("Cannot derive ws endpoint from '{}'", self.service.origin))?;
        Ok(url)
    }
}
