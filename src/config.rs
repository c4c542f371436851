use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub detector: DetectorConfig,

    #[serde(default)]
    pub sensor: SensorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Flat directory holding every stored photo
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,

    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    /// Copy the normalized capture to `<root>/raw/` before overlays are drawn
    #[serde(default)]
    pub keep_raw_capture: bool,
}

fn default_storage_root() -> PathBuf {
    data_dir().join("files").join("photos")
}

fn default_allowed_extensions() -> Vec<String> {
    vec!["png".to_string(), "jpeg".to_string(), "jpg".to_string()]
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            allowed_extensions: default_allowed_extensions(),
            keep_raw_capture: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// ONNX export of a YOLOv8-style detector trained on COCO
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Downloaded to `model_path` when the file is missing
    #[serde(default)]
    pub model_url: Option<String>,

    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    #[serde(default = "default_nms_threshold")]
    pub nms_threshold: f32,

    #[serde(default = "default_input_size")]
    pub input_size: u32,

    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,

    /// Draw bounding boxes into the stored file after detection
    #[serde(default = "default_draw_overlays")]
    pub draw_overlays: bool,

    #[serde(default = "default_max_detections")]
    pub max_detections: usize,
}

fn default_model_path() -> PathBuf {
    data_dir().join("models").join("yolov8n.onnx")
}

fn default_confidence_threshold() -> f32 {
    0.25
}

fn default_nms_threshold() -> f32 {
    0.45
}

fn default_input_size() -> u32 {
    640
}

fn default_intra_threads() -> usize {
    4
}

fn default_draw_overlays() -> bool {
    true
}

fn default_max_detections() -> usize {
    20
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            model_url: None,
            confidence_threshold: default_confidence_threshold(),
            nms_threshold: default_nms_threshold(),
            input_size: default_input_size(),
            intra_threads: default_intra_threads(),
            draw_overlays: default_draw_overlays(),
            max_detections: default_max_detections(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Type tag stored on every reading created at ingestion time
    #[serde(default = "default_reading_type")]
    pub reading_type: String,
}

fn default_reading_type() -> String {
    "accelerometer".to_string()
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            reading_type: default_reading_type(),
        }
    }
}

fn default_db_path() -> PathBuf {
    data_dir().join("main.db")
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sensor-gallery")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            storage: StorageConfig::default(),
            detector: DetectorConfig::default(),
            sensor: SensorConfig::default(),
        }
    }
}

impl Config {
    /// Load from `SENSOR_GALLERY_CONFIG` or the default location, writing
    /// defaults out if no file exists yet.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var_os("SENSOR_GALLERY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(Self::config_path);
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config {}", config_path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Invalid config {}", config_path.display()))?;
            config
                .validate()
                .with_context(|| format!("Invalid config {}", config_path.display()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(config_path)?;
            Ok(config)
        }
    }

    /// Reject detector settings inference cannot run with
    pub fn validate(&self) -> Result<()> {
        let detector = &self.detector;
        if detector.input_size == 0 {
            bail!("detector.input_size must be greater than 0");
        }
        if !(0.0..=1.0).contains(&detector.confidence_threshold) {
            bail!(
                "detector.confidence_threshold must be within 0..1, got {}",
                detector.confidence_threshold
            );
        }
        if !(0.0..=1.0).contains(&detector.nms_threshold) {
            bail!(
                "detector.nms_threshold must be within 0..1, got {}",
                detector.nms_threshold
            );
        }
        Ok(())
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;

        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sensor-gallery")
    }

    fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            db_path = "/tmp/gallery.db"

            [storage]
            root = "/tmp/photos"
            "#,
        )
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/tmp/gallery.db"));
        assert_eq!(config.storage.root, PathBuf::from("/tmp/photos"));
        assert_eq!(config.storage.allowed_extensions, vec!["png", "jpeg", "jpg"]);
        assert_eq!(config.sensor.reading_type, "accelerometer");
        assert!(config.detector.draw_overlays);
        assert_eq!(config.detector.input_size, 640);
    }

    #[test]
    fn test_load_writes_defaults_when_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.db_path, config.db_path);
        assert_eq!(reloaded.detector.max_detections, 20);
    }

    #[test]
    fn test_load_rejects_unusable_detector_settings() {
        let dir = tempdir().unwrap();
        for (name, detector) in [
            ("size.toml", "input_size = 0"),
            ("conf.toml", "confidence_threshold = 1.5"),
            ("nms.toml", "nms_threshold = -0.1"),
            ("nan.toml", "nms_threshold = nan"),
        ] {
            let path = dir.path().join(name);
            std::fs::write(&path, format!("[detector]\n{detector}\n")).unwrap();
            assert!(Config::load_from(&path).is_err(), "{detector} should be rejected");
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        Config::default().validate().unwrap();
    }
}
