#![allow(dead_code)]

use base64::Engine;
use image::{ImageBuffer, ImageFormat, Rgb};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use sensor_gallery::config::StorageConfig;
use sensor_gallery::{Config, Detection, Gallery, GalleryError, ObjectDetector, Result};

/// Returns the same detections for every image
pub struct FixedDetector(pub Vec<Detection>);

impl ObjectDetector for FixedDetector {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn detect(&self, _image_path: &Path) -> Result<Vec<Detection>> {
        Ok(self.0.clone())
    }
}

pub struct FailingDetector;

impl ObjectDetector for FailingDetector {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn detect(&self, _image_path: &Path) -> Result<Vec<Detection>> {
        Err(GalleryError::Inference("model could not be loaded".to_string()))
    }
}

pub fn test_config(dir: &Path) -> Config {
    Config {
        db_path: dir.join("main.db"),
        storage: StorageConfig {
            root: dir.join("photos"),
            ..StorageConfig::default()
        },
        ..Config::default()
    }
}

pub fn gallery_with(detector: impl ObjectDetector + 'static) -> (TempDir, Gallery) {
    let dir = tempfile::tempdir().unwrap();
    let gallery = Gallery::with_detector(test_config(dir.path()), Arc::new(detector)).unwrap();
    (dir, gallery)
}

/// A solid-color image encoded in `format`
pub fn solid_image(width: u32, height: u32, color: [u8; 3], format: ImageFormat) -> Vec<u8> {
    let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(width, height, Rgb(color));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).unwrap();
    out.into_inner()
}

pub fn solid_png_base64() -> String {
    base64::engine::general_purpose::STANDARD.encode(solid_image(8, 4, [200, 30, 30], ImageFormat::Png))
}

pub fn stored_files(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(root)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .filter(|e| e.path().is_file())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
