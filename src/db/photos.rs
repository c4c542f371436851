use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Row, TransactionBehavior};
use serde::Serialize;
use tracing::{debug, info};

use super::readings::NewReading;
use super::{Database, GeoTag};
use crate::error::{GalleryError, Result};
use crate::storage::PendingDeletion;

const PHOTO_COLUMNS: &str = "id, filename, original_filename, description, storage_path, created_at, \
    map_data, gps_latitude, gps_longitude, width, height, sha256_hash, raw_path, described_at";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Photo {
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
    pub sha256_hash: Option<String>,
    pub raw_path: Option<String>,
    pub described_at: Option<String>,
}

impl Photo {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            filename: row.get(1)?,
            original_filename: row.get(2)?,
            description: row.get(3)?,
            storage_path: row.get(4)?,
            created_at: row.get(5)?,
            map_data: row.get(6)?,
            gps_latitude: row.get(7)?,
            gps_longitude: row.get(8)?,
            width: row.get(9)?,
            height: row.get(10)?,
            sha256_hash: row.get(11)?,
            raw_path: row.get(12)?,
            described_at: row.get(13)?,
        })
    }
}

/// Attributes for a photo row about to be inserted
#[derive(Debug, Clone, Default)]
pub struct NewPhoto {
    pub filename: String,
    pub original_filename: String,
    pub description: String,
    pub storage_path: String,
    pub map_data: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub sha256_hash: Option<String>,
    pub raw_path: Option<String>,
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Database {
    /// Insert a photo and its sensor reading as one unit.
    ///
    /// Either both rows become visible or neither does.
    pub fn create_photo_with_reading(&self, photo: &NewPhoto, reading: &NewReading) -> Result<Photo> {
        let geo = photo.map_data.as_deref().and_then(GeoTag::parse);
        let created_at = now();

        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            r#"
            INSERT INTO photos (
                filename, original_filename, description, storage_path, created_at,
                map_data, gps_latitude, gps_longitude, width, height, sha256_hash,
                raw_path, described_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?5)
            "#,
            params![
                photo.filename,
                photo.original_filename,
                photo.description,
                photo.storage_path,
                created_at,
                photo.map_data,
                geo.map(|g| g.latitude),
                geo.map(|g| g.longitude),
                photo.width,
                photo.height,
                photo.sha256_hash,
                photo.raw_path,
            ],
        )?;
        let photo_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO sensor_readings (photo_id, reading_type, data) VALUES (?1, ?2, ?3)",
            params![photo_id, reading.reading_type, reading.data],
        )?;
        let reading_id = tx.last_insert_rowid();

        let created = tx.query_row(
            &format!("SELECT {PHOTO_COLUMNS} FROM photos WHERE id = ?"),
            [photo_id],
            Photo::from_row,
        )?;
        tx.commit()?;

        debug!(photo_id, reading_id, filename = %created.filename, "Photo record created");
        Ok(created)
    }

    pub fn get_photo(&self, photo_id: i64) -> Result<Option<Photo>> {
        let conn = self.conn();
        let result = conn.query_row(
            &format!("SELECT {PHOTO_COLUMNS} FROM photos WHERE id = ?"),
            [photo_id],
            Photo::from_row,
        );
        match result {
            Ok(photo) => Ok(Some(photo)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_photo_by_filename(&self, filename: &str) -> Result<Option<Photo>> {
        let conn = self.conn();
        let result = conn.query_row(
            &format!("SELECT {PHOTO_COLUMNS} FROM photos WHERE filename = ?"),
            [filename],
            Photo::from_row,
        );
        match result {
            Ok(photo) => Ok(Some(photo)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// True when a photo row already holds `filename`.
    pub fn filename_in_use(&self, filename: &str) -> Result<bool> {
        let conn = self.conn();
        let exists = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM photos WHERE filename = ?)",
            [filename],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// All photos in insertion order.
    pub fn list_photos(&self) -> Result<Vec<Photo>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("SELECT {PHOTO_COLUMNS} FROM photos ORDER BY id"))?;
        let photos = stmt
            .query_map([], Photo::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(photos)
    }

    pub fn photo_count(&self) -> Result<i64> {
        let conn = self.conn();
        let count = conn.query_row("SELECT COUNT(*) FROM photos", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn update_description(&self, photo_id: i64, description: &str) -> Result<()> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE photos SET description = ?1, described_at = ?2 WHERE id = ?3",
            params![description, now(), photo_id],
        )?;
        if changed == 0 {
            return Err(GalleryError::not_found(format!("photo {photo_id}")));
        }
        Ok(())
    }

    /// Run `f` on the current row of `photo_id` while the store is locked.
    ///
    /// A delete cannot commit while `f` runs. Returns `None` when the photo
    /// no longer exists, without calling `f`.
    pub fn with_photo<T, F>(&self, photo_id: i64, f: F) -> Result<Option<T>>
    where
        F: FnOnce(&Photo) -> Result<T>,
    {
        let conn = self.conn();
        let photo = match conn.query_row(
            &format!("SELECT {PHOTO_COLUMNS} FROM photos WHERE id = ?"),
            [photo_id],
            Photo::from_row,
        ) {
            Ok(photo) => photo,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        f(&photo).map(Some)
    }

    /// Delete a photo and all its sensor readings in one transaction.
    ///
    /// `stage_files` runs inside the transaction after the rows are gone and
    /// moves the photo's files aside. If it fails nothing is committed; if the
    /// commit fails the files are put back. On success the caller finishes the
    /// returned deletion. Returns `None` when no photo has this id.
    pub fn delete_photo_cascade<F>(
        &self,
        photo_id: i64,
        stage_files: F,
    ) -> Result<Option<(Photo, PendingDeletion)>>
    where
        F: FnOnce(&Photo) -> Result<PendingDeletion>,
    {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let photo = match tx.query_row(
            &format!("SELECT {PHOTO_COLUMNS} FROM photos WHERE id = ?"),
            [photo_id],
            Photo::from_row,
        ) {
            Ok(photo) => photo,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let readings = tx.execute("DELETE FROM sensor_readings WHERE photo_id = ?", [photo_id])?;
        tx.execute("DELETE FROM photos WHERE id = ?", [photo_id])?;

        let mut pending = stage_files(&photo)?;

        if let Err(e) = tx.commit() {
            pending.restore();
            return Err(e.into());
        }

        info!(photo_id, readings, filename = %photo.filename, "Photo deleted");
        Ok(Some((photo, pending)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::readings::NewReading;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    fn new_photo(filename: &str) -> NewPhoto {
        NewPhoto {
            filename: filename.to_string(),
            original_filename: filename.to_string(),
            description: "dog : 87".to_string(),
            storage_path: format!("/photos/{filename}"),
            ..Default::default()
        }
    }

    fn reading(data: &str) -> NewReading {
        NewReading {
            reading_type: "accelerometer".to_string(),
            data: data.to_string(),
        }
    }

    #[test]
    fn test_create_and_get() {
        let db = setup();
        let mut attrs = new_photo("a.jpg");
        attrs.map_data = Some("latitude:37.5,longitude:-122.1".to_string());

        let photo = db.create_photo_with_reading(&attrs, &reading("ax:0.1")).unwrap();
        assert_eq!(photo.filename, "a.jpg");
        assert_eq!(photo.description, "dog : 87");
        assert_eq!(photo.map_data.as_deref(), Some("latitude:37.5,longitude:-122.1"));
        assert_eq!(photo.gps_latitude, Some(37.5));
        assert_eq!(photo.gps_longitude, Some(-122.1));
        assert!(photo.described_at.is_some());

        let fetched = db.get_photo(photo.id).unwrap().unwrap();
        assert_eq!(fetched, photo);
        assert_eq!(db.get_photo_by_filename("a.jpg").unwrap().unwrap().id, photo.id);
        assert!(db.filename_in_use("a.jpg").unwrap());
        assert!(!db.filename_in_use("b.jpg").unwrap());
    }

    #[test]
    fn test_unparseable_map_data_kept_verbatim() {
        let db = setup();
        let mut attrs = new_photo("a.jpg");
        attrs.map_data = Some("somewhere nice".to_string());
        let photo = db.create_photo_with_reading(&attrs, &reading("x")).unwrap();
        assert_eq!(photo.map_data.as_deref(), Some("somewhere nice"));
        assert_eq!(photo.gps_latitude, None);
    }

    #[test]
    fn test_duplicate_filename_rolls_back_reading() {
        let db = setup();
        db.create_photo_with_reading(&new_photo("a.jpg"), &reading("first")).unwrap();
        let result = db.create_photo_with_reading(&new_photo("a.jpg"), &reading("second"));
        assert!(matches!(result, Err(GalleryError::Storage(_))));

        assert_eq!(db.photo_count().unwrap(), 1);
        assert_eq!(db.reading_count().unwrap(), 1);
    }

    #[test]
    fn test_list_in_insertion_order() {
        let db = setup();
        for name in ["c.jpg", "a.jpg", "b.jpg"] {
            db.create_photo_with_reading(&new_photo(name), &reading(name)).unwrap();
        }
        let names: Vec<_> = db.list_photos().unwrap().into_iter().map(|p| p.filename).collect();
        assert_eq!(names, vec!["c.jpg", "a.jpg", "b.jpg"]);
    }

    #[test]
    fn test_update_description() {
        let db = setup();
        let photo = db.create_photo_with_reading(&new_photo("a.jpg"), &reading("x")).unwrap();
        db.update_description(photo.id, "").unwrap();
        assert!(db.get_photo(photo.id).unwrap().unwrap().description.is_empty());

        let missing = db.update_description(photo.id + 100, "cat : 1");
        assert!(matches!(missing, Err(GalleryError::NotFound(_))));
    }

    #[test]
    fn test_delete_cascade_removes_readings() {
        let db = setup();
        let photo = db.create_photo_with_reading(&new_photo("a.jpg"), &reading("x")).unwrap();
        let other = db.create_photo_with_reading(&new_photo("b.jpg"), &reading("y")).unwrap();
        let trash = tempdir().unwrap();

        let deleted = db
            .delete_photo_cascade(photo.id, |_| PendingDeletion::stage(trash.path(), &[]))
            .unwrap();
        let (removed, pending) = deleted.unwrap();
        pending.finish().unwrap();
        assert_eq!(removed.id, photo.id);

        assert!(db.get_photo(photo.id).unwrap().is_none());
        assert!(db.get_readings_for_photo(photo.id).is_err());
        assert_eq!(db.get_readings_for_photo(other.id).unwrap().len(), 1);
        assert_eq!(db.reading_count().unwrap(), 1);
    }

    #[test]
    fn test_delete_missing_is_none() {
        let db = setup();
        let trash = tempdir().unwrap();
        let deleted = db
            .delete_photo_cascade(42, |_| PendingDeletion::stage(trash.path(), &[]))
            .unwrap();
        assert!(deleted.is_none());
    }

    #[test]
    fn test_delete_rolls_back_when_staging_fails() {
        let db = setup();
        let photo = db.create_photo_with_reading(&new_photo("a.jpg"), &reading("x")).unwrap();

        let result = db.delete_photo_cascade(photo.id, |p| {
            Err(GalleryError::io(
                PathBuf::from(&p.storage_path),
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked"),
            ))
        });
        assert!(matches!(result, Err(GalleryError::Io { .. })));

        assert!(db.get_photo(photo.id).unwrap().is_some());
        assert_eq!(db.get_readings_for_photo(photo.id).unwrap().len(), 1);
    }
}
