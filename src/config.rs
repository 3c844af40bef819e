//! Configuration management for MJPEG-RTP streaming

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete MJPEG-RTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, rename = "mjpeg-rtp")]
    pub mjpeg_rtp: MjpegRtpConfig,
}

/// MJPEG-RTP streaming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MjpegRtpConfig {
    /// Enable MJPEG-RTP mode
    #[serde(default)]
    pub enabled: bool,

    /// Camera 1 configuration
    #[serde(default)]
    pub camera1: CameraConfig,

    /// Camera 2 configuration
    #[serde(default)]
    pub camera2: CameraConfig,

    /// Maximum transmission unit (bytes)
    #[serde(default = "default_mtu")]
    pub mtu: usize,

    /// DSCP value for QoS (0-63)
    #[serde(default)]
    pub dscp: u8,

    /// Statistics reporting interval (seconds)
    #[serde(default = "default_stats_interval")]
    pub stats_interval_seconds: u64,
}

impl Default for MjpegRtpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            camera1: CameraConfig::default_camera1(),
            camera2: CameraConfig::default_camera2(),
            mtu: default_mtu(),
            dscp: 0,
            stats_interval_seconds: default_stats_interval(),
        }
    }
}

/// Per-camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Enable this camera
    #[serde(default)]
    pub enabled: bool,

    /// Camera device path, passed through to the encoder command (e.g. a
    /// V4L2 device node such as "/dev/video0").
    pub device: String,

    /// Frame width in pixels
    #[serde(default = "default_width")]
    pub width: u32,

    /// Frame height in pixels
    #[serde(default = "default_height")]
    pub height: u32,

    /// Frames per second
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// JPEG quality (1-100)
    #[serde(default = "default_quality")]
    pub quality: u32,

    /// Flip method (optional): "horizontal", "vertical", "rotate-180"
    #[serde(default)]
    pub flip_method: Option<String>,

    /// RTP destination host
    #[serde(default = "default_dest_host")]
    pub dest_host: String,

    /// RTP destination port
    pub dest_port: u16,

    /// Local port (0 = auto-assign)
    #[serde(default)]
    pub local_port: u16,

    /// RTP SSRC identifier
    pub ssrc: u32,

    /// Executable spawned as the JPEG encoder for this camera.
    #[serde(default = "default_encoder_command")]
    pub encoder_command: String,

    /// Full argument list for the encoder. When empty, a default argument
    /// list is synthesized from device/width/height/fps/quality/flip_method.
    #[serde(default)]
    pub encoder_args: Vec<String>,
}

impl CameraConfig {
    fn default_camera1() -> Self {
        Self {
            enabled: false,
            device: "/dev/video0".to_string(),
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            quality: default_quality(),
            flip_method: None,
            dest_host: default_dest_host(),
            dest_port: 5000,
            local_port: 0,
            ssrc: 0x12345678,
            encoder_command: default_encoder_command(),
            encoder_args: Vec::new(),
        }
    }

    fn default_camera2() -> Self {
        Self {
            enabled: false,
            device: "/dev/video1".to_string(),
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            quality: default_quality(),
            flip_method: None,
            dest_host: default_dest_host(),
            dest_port: 5002,
            local_port: 0,
            ssrc: 0x12345679,
            encoder_command: default_encoder_command(),
            encoder_args: Vec::new(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self::default_camera1()
    }
}

// Default value functions
fn default_mtu() -> usize {
    1400
}
fn default_stats_interval() -> u64 {
    10
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
fn default_quality() -> u32 {
    85
}
fn default_dest_host() -> String {
    "127.0.0.1".to_string()
}
fn default_encoder_command() -> String {
    "ffmpeg".to_string()
}

impl Config {
    /// Loads configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Creates default configuration
    pub fn default() -> Self {
        Self {
            mjpeg_rtp: MjpegRtpConfig::default(),
        }
    }

    /// Validates configuration
    fn validate(&self) -> Result<(), ConfigError> {
        let cfg = &self.mjpeg_rtp;

        // RTP/UDP over Ethernet needs headroom below the 1500-byte default
        // Ethernet MTU; below 576 there isn't enough room for one fragment.
        if cfg.mtu < 576 || cfg.mtu > 1500 {
            return Err(ConfigError::Invalid(format!(
                "MTU must be between 576 and 1500, got {}",
                cfg.mtu
            )));
        }

        if cfg.dscp > 63 {
            return Err(ConfigError::Invalid(format!(
                "DSCP must be between 0 and 63, got {}",
                cfg.dscp
            )));
        }

        if cfg.camera1.enabled {
            self.validate_camera(&cfg.camera1, "camera1")?;
        }
        if cfg.camera2.enabled {
            self.validate_camera(&cfg.camera2, "camera2")?;
        }

        if cfg.camera1.enabled && cfg.camera2.enabled {
            if cfg.camera1.ssrc == cfg.camera2.ssrc {
                return Err(ConfigError::Invalid(format!(
                    "camera1 and camera2 must not share an SSRC (both 0x{:08X})",
                    cfg.camera1.ssrc
                )));
            }

            let dest1 = (cfg.camera1.dest_host.as_str(), cfg.camera1.dest_port);
            let dest2 = (cfg.camera2.dest_host.as_str(), cfg.camera2.dest_port);
            if dest1 == dest2 {
                return Err(ConfigError::Invalid(format!(
                    "camera1 and camera2 must not share a destination (both {}:{})",
                    dest1.0, dest1.1
                )));
            }
        }

        Ok(())
    }

    fn validate_camera(&self, cam: &CameraConfig, name: &str) -> Result<(), ConfigError> {
        if cam.width == 0 || cam.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "{name}: width and height must be > 0"
            )));
        }

        if cam.width % 8 != 0 || cam.height % 8 != 0 {
            return Err(ConfigError::Invalid(format!(
                "{name}: width and height must be multiples of 8"
            )));
        }

        if cam.fps == 0 || cam.fps > 120 {
            return Err(ConfigError::Invalid(format!(
                "{name}: FPS must be between 1 and 120, got {}",
                cam.fps
            )));
        }

        if cam.quality == 0 || cam.quality > 100 {
            return Err(ConfigError::Invalid(format!(
                "{name}: quality must be between 1 and 100, got {}",
                cam.quality
            )));
        }

        if cam.dest_host.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "{name}: dest_host must not be empty"
            )));
        }

        if cam.dest_port == 0 {
            return Err(ConfigError::Invalid(format!(
                "{name}: dest_port must be > 0"
            )));
        }

        if cam.encoder_command.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "{name}: encoder_command must not be empty"
            )));
        }

        Ok(())
    }

    /// Saves configuration to TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
