use rusqlite::Row;
use serde::Serialize;

use super::Database;
use crate::error::{GalleryError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorReading {
    pub id: i64,
    pub photo_id: i64,
    pub reading_type: String,
    /// Opaque payload as sent by the client, never parsed
    pub data: String,
}

impl SensorReading {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            photo_id: row.get(1)?,
            reading_type: row.get(2)?,
            data: row.get(3)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewReading {
    pub reading_type: String,
    pub data: String,
}

impl Database {
    /// Readings attached to one photo, oldest first.
    ///
    /// An unknown photo id is an error; a known photo with no readings is not.
    pub fn get_readings_for_photo(&self, photo_id: i64) -> Result<Vec<SensorReading>> {
        let conn = self.conn();

        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM photos WHERE id = ?)",
            [photo_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(GalleryError::not_found(format!("photo {photo_id}")));
        }

        let mut stmt = conn.prepare(
            "SELECT id, photo_id, reading_type, data FROM sensor_readings WHERE photo_id = ? ORDER BY id",
        )?;
        let readings = stmt
            .query_map([photo_id], SensorReading::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(readings)
    }

    pub fn reading_count(&self) -> Result<i64> {
        let conn = self.conn();
        let count = conn.query_row("SELECT COUNT(*) FROM sensor_readings", [], |row| row.get(0))?;
        Ok(count)
    }
}
