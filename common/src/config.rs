use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub camera: CameraConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    /// MJPEG stream endpoint (or single-frame endpoint in polling mode).
    pub url: String,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_fps")]
    pub fps: f64,
    #[serde(default = "default_quality")]
    pub quality: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    /// Pixel intensity deltas >= this (0-255) count as movement.
    #[serde(default = "default_motion_threshold")]
    pub motion_threshold: u8,
    /// Odd Gaussian kernel size for denoising; 0 or 1 disables the blur.
    #[serde(default = "default_blur_kernel_size")]
    pub blur_kernel_size: u32,
    #[serde(default = "default_dilation_iterations")]
    pub dilation_iterations: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// How long to keep recording after the last detected motion.
    #[serde(default = "default_patience_secs")]
    pub patience_secs: u64,
    /// Consecutive motion frames required before a clip is started.
    /// 1 starts recording on the very first motion frame.
    #[serde(default = "default_confirmation_frames")]
    pub confirmation_frames: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordingConfig {
    #[serde(default = "default_recording_dir")]
    pub dir: String,
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default = "default_crf")]
    pub crf: u32,
    #[serde(default = "default_preset")]
    pub preset: String,
    #[serde(default = "default_fps")]
    pub fps: f64,
    /// Also record the raw frame-difference stream (delta.mp4).
    #[serde(default = "default_true")]
    pub write_delta: bool,
    /// Also record the thresholded motion-mask stream (mask.mp4).
    #[serde(default = "default_true")]
    pub write_mask: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    /// Draw a bounding rectangle around detected motion on the recorded feed.
    #[serde(default)]
    pub annotate: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            motion_threshold: default_motion_threshold(),
            blur_kernel_size: default_blur_kernel_size(),
            dilation_iterations: default_dilation_iterations(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            patience_secs: default_patience_secs(),
            confirmation_frames: default_confirmation_frames(),
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            dir: default_recording_dir(),
            codec: default_codec(),
            crf: default_crf(),
            preset: default_preset(),
            fps: default_fps(),
            write_delta: true,
            write_mask: true,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { annotate: false }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
}

// Default value functions
fn default_mode() -> String {
    "mjpeg".into()
}
fn default_fps() -> f64 {
    15.0
}
fn default_quality() -> u32 {
    80
}
fn default_motion_threshold() -> u8 {
    8
}
fn default_blur_kernel_size() -> u32 {
    21
}
fn default_dilation_iterations() -> u32 {
    3
}
fn default_patience_secs() -> u64 {
    30
}
fn default_confirmation_frames() -> u32 {
    10
}
fn default_recording_dir() -> String {
    "videos".into()
}
fn default_codec() -> String {
    "h264".into()
}
fn default_crf() -> u32 {
    23
}
fn default_preset() -> String {
    "veryfast".into()
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".into()
}
