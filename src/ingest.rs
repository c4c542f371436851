//! Ingestion orchestrator.
//!
//! One upload walks `Received -> Normalized -> Detected -> Described ->
//! Persisted`. A failure at any step stops the walk, removes whatever was
//! written to disk and reports the step that failed. Nothing is retried.

use base64::Engine;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::db::{Database, NewPhoto, NewReading, Photo};
use crate::describe;
use crate::detect::ObjectDetector;
use crate::error::GalleryError;
use crate::normalize;
use crate::storage::PhotoStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IngestStage {
    Received,
    Normalized,
    Detected,
    Described,
    Persisted,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IngestStage::Received => "received",
            IngestStage::Normalized => "normalized",
            IngestStage::Detected => "detected",
            IngestStage::Described => "described",
            IngestStage::Persisted => "persisted",
        };
        f.write_str(name)
    }
}

/// An upload that did not make it to `Persisted`.
///
/// `stage` is the state the pipeline was trying to reach when it failed.
#[derive(Debug, Error)]
#[error("ingestion failed before reaching {stage}: {source}")]
pub struct IngestError {
    pub stage: IngestStage,
    #[source]
    pub source: GalleryError,
}

impl IngestError {
    fn at(stage: IngestStage) -> impl FnOnce(GalleryError) -> IngestError {
        move |source| IngestError { stage, source }
    }

    /// Kind of the originating error (`decode`, `inference`, ...)
    pub fn kind(&self) -> &'static str {
        self.source.kind()
    }
}

/// Upload form as posted by the capture app
#[derive(Debug, Clone, Deserialize)]
pub struct UploadRequest {
    /// Base64-encoded image bytes
    pub raw: String,
    pub filename: String,
    /// Sensor payload, stored verbatim
    pub sensor: String,
    #[serde(default)]
    pub map: Option<String>,
}

impl UploadRequest {
    pub fn decode_raw(&self) -> Result<Vec<u8>, GalleryError> {
        decode_base64(&self.raw)
    }
}

/// Decode a base64 body, tolerating line breaks and other whitespace.
pub fn decode_base64(encoded: &str) -> Result<Vec<u8>, GalleryError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| GalleryError::Decode(format!("invalid base64 payload: {e}")))
}

/// One upload's worth of input, already base64-decoded
#[derive(Debug, Clone, Copy)]
pub struct Upload<'a> {
    pub raw: &'a [u8],
    pub filename: &'a str,
    pub sensor: &'a str,
    pub map_data: Option<&'a str>,
}

/// Runs the pipeline against a shared record store and photo root.
///
/// Holds no state between uploads; any number of ingestors may run at once.
pub struct Ingestor<'a> {
    db: &'a Database,
    store: &'a PhotoStore,
    detector: &'a dyn ObjectDetector,
    reading_type: &'a str,
}

impl<'a> Ingestor<'a> {
    pub fn new(
        db: &'a Database,
        store: &'a PhotoStore,
        detector: &'a dyn ObjectDetector,
        reading_type: &'a str,
    ) -> Self {
        Self {
            db,
            store,
            detector,
            reading_type,
        }
    }

    pub fn run(&self, upload: &Upload<'_>) -> Result<Photo, IngestError> {
        let result = self.advance(upload);
        match &result {
            Ok(photo) => info!(
                photo_id = photo.id,
                filename = %photo.filename,
                description = %photo.description,
                "Upload ingested"
            ),
            Err(e) => warn!(
                stage = %e.stage,
                kind = e.kind(),
                filename = upload.filename,
                error = %e.source,
                "Upload rejected"
            ),
        }
        result
    }

    fn advance(&self, upload: &Upload<'_>) -> Result<Photo, IngestError> {
        // Received: claim a storage name; the guard removes it on any early return
        let mut staged = self
            .store
            .reserve(upload.filename, |name| self.db.filename_in_use(name))
            .map_err(IngestError::at(IngestStage::Received))?;
        debug!(filename = staged.filename(), "Upload received");

        let normalized = normalize::normalize(upload.raw, staged.path())
            .map_err(IngestError::at(IngestStage::Normalized))?;

        let raw_path = if self.store.keeps_raw_capture() {
            let path = self
                .store
                .preserve_raw(&mut staged)
                .map_err(IngestError::at(IngestStage::Normalized))?;
            Some(path.to_string_lossy().into_owned())
        } else {
            None
        };

        // The detector may draw overlays into the stored file
        let detections = self
            .detector
            .detect(staged.path())
            .map_err(IngestError::at(IngestStage::Detected))?;
        debug!(
            detector = self.detector.name(),
            count = detections.len(),
            "Detection finished"
        );

        let description = describe::synthesize(&detections);

        let photo = NewPhoto {
            filename: staged.filename().to_string(),
            original_filename: upload.filename.to_string(),
            description,
            storage_path: staged.path().to_string_lossy().into_owned(),
            map_data: upload.map_data.map(str::to_string),
            width: Some(normalized.width),
            height: Some(normalized.height),
            sha256_hash: Some(normalized.sha256),
            raw_path,
        };
        let reading = NewReading {
            reading_type: self.reading_type.to_string(),
            data: upload.sensor.to_string(),
        };

        let created = self
            .db
            .create_photo_with_reading(&photo, &reading)
            .map_err(IngestError::at(IngestStage::Persisted))?;

        staged.commit();
        Ok(created)
    }
}
