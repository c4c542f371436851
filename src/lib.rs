//! Photo ingestion and annotation pipeline for sensor-tagged captures.
//!
//! An upload is decoded, rotated upright, run through an object detector,
//! described from the detections and stored together with the sensor
//! reading that came with it.

pub mod config;
pub mod db;
pub mod describe;
pub mod detect;
pub mod error;
pub mod gallery;
pub mod ingest;
pub mod logging;
pub mod normalize;
pub mod storage;

pub use config::Config;
pub use db::{Database, Photo, SensorReading};
pub use detect::{Detection, ObjectDetector, OnnxDetector};
pub use error::{GalleryError, Result};
pub use gallery::{ExportFormat, Gallery, PhotoSummary, SensorReadingSummary};
pub use ingest::{IngestError, IngestStage, UploadRequest};
