use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::common::error::{EnrollError, Result};
use crate::common::paths;

pub const DEFAULT_CONFIG_PATH: &str = "configs/face-enroll.toml";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub camera: CameraConfig,
    pub models: ModelConfig,
    pub detector: DetectorConfig,
    #[serde(default)]
    pub enrollment: EnrollmentConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CameraConfig {
    pub device_index: u32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default)]
    pub warmup_frames: u32,
    #[serde(default = "default_warmup_delay")]
    pub warmup_delay_ms: u64,
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_ms: u64,
}

fn default_width() -> u32 { 640 }
fn default_height() -> u32 { 480 }
fn default_warmup_delay() -> u64 { 50 }
fn default_ready_timeout() -> u64 { 3000 }

/// One place a detector/landmark model pair can be loaded from.
///
/// Each location is either a filesystem path (relative paths resolve against
/// the system models directory) or an `http(s)://` URL that is downloaded into
/// the model cache.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ModelSource {
    pub name: String,
    pub detector: String,
    pub landmarks: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default)]
    pub sources: Vec<ModelSource>,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl ModelConfig {
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(paths::model_cache_dir)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DetectorConfig {
    pub input_width: u32,
    pub input_height: u32,
    pub detection_confidence: f32,
    #[serde(default = "default_landmark_input")]
    pub landmark_input_size: u32,
    #[serde(default = "default_optimization_level")]
    pub optimization_level: u32,
}

fn default_landmark_input() -> u32 { 112 }
fn default_optimization_level() -> u32 { 3 }

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EnrollmentConfig {
    #[serde(default = "default_model_poll")]
    pub model_poll_interval_ms: u64,
    #[serde(default = "default_basic_poll")]
    pub basic_poll_interval_ms: u64,
}

fn default_model_poll() -> u64 { 200 }
fn default_basic_poll() -> u64 { 500 }

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            model_poll_interval_ms: default_model_poll(),
            basic_poll_interval_ms: default_basic_poll(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_field_name")]
    pub field_name: String,
}

fn default_field_name() -> String { "face_photos".to_string() }

impl Default for OutputConfig {
    fn default() -> Self {
        Self { field_name: default_field_name() }
    }
}

impl Config {
    /// Load from the local config, falling back to the system-wide file.
    pub fn load() -> Result<Self> {
        let local = PathBuf::from(DEFAULT_CONFIG_PATH);
        if local.exists() {
            return Self::load_from_path(&local);
        }
        Self::load_from_path(&paths::system_config_file())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(EnrollError::Config(format!(
                "Config file not found: {}. Please create it from the example.",
                path.display()
            )));
        }

        tracing::info!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| EnrollError::Config(format!("Config parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.width > 4096 {
            return Err(EnrollError::Config(format!(
                "Camera width must be between 1 and 4096, got {}", self.camera.width
            )));
        }
        if self.camera.height == 0 || self.camera.height > 4096 {
            return Err(EnrollError::Config(format!(
                "Camera height must be between 1 and 4096, got {}", self.camera.height
            )));
        }
        if self.camera.ready_timeout_ms == 0 {
            return Err(EnrollError::Config(
                "Camera ready timeout must be at least 1 ms".into()
            ));
        }

        if self.detector.detection_confidence < 0.0 || self.detector.detection_confidence > 1.0 {
            return Err(EnrollError::Config(format!(
                "Detection confidence must be between 0.0 and 1.0, got {}",
                self.detector.detection_confidence
            )));
        }
        if self.detector.input_width == 0 || self.detector.input_width > 4096 {
            return Err(EnrollError::Config(format!(
                "Detector input width must be between 1 and 4096, got {}",
                self.detector.input_width
            )));
        }
        if self.detector.input_height == 0 || self.detector.input_height > 4096 {
            return Err(EnrollError::Config(format!(
                "Detector input height must be between 1 and 4096, got {}",
                self.detector.input_height
            )));
        }
        if self.detector.landmark_input_size == 0 || self.detector.landmark_input_size > 1024 {
            return Err(EnrollError::Config(format!(
                "Landmark input size must be between 1 and 1024, got {}",
                self.detector.landmark_input_size
            )));
        }

        let enrollment = &self.enrollment;
        if enrollment.model_poll_interval_ms == 0 || enrollment.basic_poll_interval_ms == 0 {
            return Err(EnrollError::Config("Poll intervals must be non-zero".into()));
        }

        if self.output.field_name.trim().is_empty() {
            return Err(EnrollError::Config("Output field name must not be empty".into()));
        }

        for source in &self.models.sources {
            if source.detector.trim().is_empty() || source.landmarks.trim().is_empty() {
                return Err(EnrollError::Config(format!(
                    "Model source '{}' must name both a detector and a landmark model",
                    source.name
                )));
            }
        }

        Ok(())
    }
}
