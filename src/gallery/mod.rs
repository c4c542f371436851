//! Query and export surface over the record store, plus the boundary
//! operations a request-handling layer drives.

pub mod export;
pub mod redescribe;

use serde::Serialize;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::db::{Database, Photo, SensorReading};
use crate::detect::{ObjectDetector, OnnxDetector};
use crate::error::{GalleryError, Result};
use crate::ingest::{decode_base64, IngestError, IngestStage, Ingestor, Upload};
use crate::storage::PhotoStore;

pub use export::{export_gallery, ExportFormat};
pub use redescribe::{RedescribeReport, RedescribeStatus};

/// Listing entry for one photo
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhotoSummary {
    pub id: i64,
    pub description: String,
    pub filename: String,
    pub storage_path: String,
    pub created_at: String,
    pub map_data: Option<String>,
}

impl From<Photo> for PhotoSummary {
    fn from(photo: Photo) -> Self {
        Self {
            id: photo.id,
            description: photo.description,
            filename: photo.filename,
            storage_path: photo.storage_path,
            created_at: photo.created_at,
            map_data: photo.map_data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorReadingSummary {
    pub id: i64,
    #[serde(rename = "type")]
    pub reading_type: String,
    pub photo_id: i64,
    pub data: String,
}

impl From<SensorReading> for SensorReadingSummary {
    fn from(reading: SensorReading) -> Self {
        Self {
            id: reading.id,
            reading_type: reading.reading_type,
            photo_id: reading.photo_id,
            data: reading.data,
        }
    }
}

pub struct Gallery {
    config: Config,
    db: Database,
    store: PhotoStore,
    detector: Arc<dyn ObjectDetector>,
}

impl Gallery {
    /// Open the database and photo root named in `config`, detecting with ONNX.
    pub fn open(config: Config) -> Result<Self> {
        let detector = Arc::new(OnnxDetector::new(config.detector.clone()));
        Self::with_detector(config, detector)
    }

    pub fn with_detector(config: Config, detector: Arc<dyn ObjectDetector>) -> Result<Self> {
        let db = Database::open(&config.db_path)?;
        db.initialize()?;
        let store = PhotoStore::new(&config.storage);
        info!(
            db = ?config.db_path,
            root = ?store.root(),
            detector = detector.name(),
            "Gallery opened"
        );
        Ok(Self {
            config,
            db,
            store,
            detector,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn store(&self) -> &PhotoStore {
        &self.store
    }

    fn ingestor(&self) -> Ingestor<'_> {
        Ingestor::new(
            &self.db,
            &self.store,
            self.detector.as_ref(),
            &self.config.sensor.reading_type,
        )
    }

    /// Ingest a base64-encoded upload.
    pub fn ingest(
        &self,
        raw_base64: &str,
        filename: &str,
        sensor: &str,
        map_data: Option<&str>,
    ) -> std::result::Result<Photo, IngestError> {
        let raw = decode_base64(raw_base64).map_err(|source| IngestError {
            stage: IngestStage::Received,
            source,
        })?;
        self.ingest_bytes(&raw, filename, sensor, map_data)
    }

    pub fn ingest_bytes(
        &self,
        raw: &[u8],
        filename: &str,
        sensor: &str,
        map_data: Option<&str>,
    ) -> std::result::Result<Photo, IngestError> {
        self.ingestor().run(&Upload {
            raw,
            filename,
            sensor,
            map_data,
        })
    }

    /// Run an ingestion on tokio's blocking pool.
    pub async fn ingest_offloaded(
        self: Arc<Self>,
        raw_base64: String,
        filename: String,
        sensor: String,
        map_data: Option<String>,
    ) -> anyhow::Result<Photo> {
        let photo = tokio::task::spawn_blocking(move || {
            self.ingest(&raw_base64, &filename, &sensor, map_data.as_deref())
        })
        .await??;
        Ok(photo)
    }

    pub fn list_gallery(&self) -> Result<Vec<PhotoSummary>> {
        Ok(self
            .db
            .list_photos()?
            .into_iter()
            .map(PhotoSummary::from)
            .collect())
    }

    /// The (first) sensor reading captured with a photo.
    pub fn get_sensor_reading(&self, photo_id: i64) -> Result<SensorReadingSummary> {
        self.db
            .get_readings_for_photo(photo_id)?
            .into_iter()
            .next()
            .map(SensorReadingSummary::from)
            .ok_or_else(|| GalleryError::not_found(format!("sensor reading for photo {photo_id}")))
    }

    /// Delete a photo, its readings and its files.
    ///
    /// Returns `false` when no photo has this id. Any failure to remove rows
    /// or files is returned as an error.
    pub fn delete_photo(&self, photo_id: i64) -> Result<bool> {
        let deleted = self.db.delete_photo_cascade(photo_id, |photo| {
            let mut files = vec![PathBuf::from(&photo.storage_path)];
            files.extend(photo.raw_path.as_ref().map(PathBuf::from));
            self.store.stage_deletion(&files)
        })?;

        match deleted {
            Some((_, pending)) => {
                pending.finish()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Open a stored photo for download.
    ///
    /// Only files backing a committed photo are served; uploads still in
    /// flight and anything outside the root are not found.
    pub fn fetch_file(&self, filename: &str) -> Result<File> {
        if self.db.get_photo_by_filename(filename)?.is_none() {
            return Err(GalleryError::not_found(format!("file {:?}", filename)));
        }
        self.store.open(filename)
    }

    pub fn redescribe_all(
        &self,
        status: Option<std::sync::mpsc::Sender<RedescribeStatus>>,
    ) -> Result<RedescribeReport> {
        redescribe::redescribe_all(&self.db, self.detector.as_ref(), status)
    }

    pub fn export(&self, output_path: &std::path::Path, format: ExportFormat) -> Result<usize> {
        export_gallery(&self.db, output_path, format)
    }
}
