use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use crate::db::Database;
use crate::error::{GalleryError, Result};

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = GalleryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(GalleryError::Validation(format!(
                "unknown export format {other:?} (expected csv or json)"
            ))),
        }
    }
}

/// One exported gallery row
#[derive(Debug, Serialize)]
pub struct ExportedPhoto {
    pub id: i64,
    pub filename: String,
    pub original_filename: String,
    pub description: String,
    pub storage_path: String,
    pub created_at: String,
    pub map_data: Option<String>,
    pub gps_latitude: Option<f64>,
    pub gps_longitude: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub sha256: Option<String>,
    pub reading_type: Option<String>,
    /// Every reading payload for the photo, joined with `|`
    pub sensor_data: String,
}

/// Export the gallery to a file; returns the number of photos written
pub fn export_gallery(db: &Database, output_path: &Path, format: ExportFormat) -> Result<usize> {
    let photos = photos_for_export(db)?;
    let count = photos.len();

    match format {
        ExportFormat::Json => export_json(&photos, output_path)?,
        ExportFormat::Csv => export_csv(&photos, output_path)?,
    }

    tracing::info!(count, path = ?output_path, format = format.extension(), "Gallery exported");
    Ok(count)
}

fn photos_for_export(db: &Database) -> Result<Vec<ExportedPhoto>> {
    db.list_photos()?
        .into_iter()
        .map(|photo| {
            let readings = db.get_readings_for_photo(photo.id)?;
            Ok(ExportedPhoto {
                id: photo.id,
                reading_type: readings.first().map(|r| r.reading_type.clone()),
                sensor_data: readings
                    .iter()
                    .map(|r| r.data.as_str())
                    .collect::<Vec<_>>()
                    .join("|"),
                filename: photo.filename,
                original_filename: photo.original_filename,
                description: photo.description,
                storage_path: photo.storage_path,
                created_at: photo.created_at,
                map_data: photo.map_data,
                gps_latitude: photo.gps_latitude,
                gps_longitude: photo.gps_longitude,
                width: photo.width,
                height: photo.height,
                sha256: photo.sha256_hash,
            })
        })
        .collect()
}

fn export_json(photos: &[ExportedPhoto], output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(photos)
        .map_err(|e| GalleryError::io(output_path, std::io::Error::other(e)))?;
    let mut file = File::create(output_path).map_err(|e| GalleryError::io(output_path, e))?;
    file.write_all(json.as_bytes())
        .map_err(|e| GalleryError::io(output_path, e))?;
    Ok(())
}

fn export_csv(photos: &[ExportedPhoto], output_path: &Path) -> Result<()> {
    let csv_err = |e: csv::Error| GalleryError::io(output_path, std::io::Error::other(e));
    let mut wtr = csv::Writer::from_path(output_path).map_err(csv_err)?;

    wtr.write_record([
        "id",
        "filename",
        "original_filename",
        "description",
        "storage_path",
        "created_at",
        "map_data",
        "gps_latitude",
        "gps_longitude",
        "width",
        "height",
        "sha256",
        "reading_type",
        "sensor_data",
    ])
    .map_err(csv_err)?;

    for photo in photos {
        wtr.write_record([
            &photo.id.to_string(),
            &photo.filename,
            &photo.original_filename,
            &photo.description,
            &photo.storage_path,
            &photo.created_at,
            photo.map_data.as_deref().unwrap_or(""),
            &photo.gps_latitude.map(|v| v.to_string()).unwrap_or_default(),
            &photo.gps_longitude.map(|v| v.to_string()).unwrap_or_default(),
            &photo.width.map(|v| v.to_string()).unwrap_or_default(),
            &photo.height.map(|v| v.to_string()).unwrap_or_default(),
            photo.sha256.as_deref().unwrap_or(""),
            photo.reading_type.as_deref().unwrap_or(""),
            &photo.sensor_data,
        ])
        .map_err(csv_err)?;
    }

    wtr.flush().map_err(|e| GalleryError::io(output_path, e))?;
    Ok(())
}
