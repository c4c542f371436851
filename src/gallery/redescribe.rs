use rayon::prelude::*;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use tracing::{info, warn};

use crate::db::{Database, Photo};
use crate::describe;
use crate::detect::ObjectDetector;
use crate::error::{GalleryError, Result};

/// Progress updates while re-describing the gallery
#[derive(Debug, Clone)]
pub enum RedescribeStatus {
    Starting { total_photos: usize },
    Processing {
        current: usize,
        total: usize,
        filename: String,
    },
    Described {
        photo_id: i64,
        description: String,
    },
    Error { photo_id: i64, message: String },
    Completed { updated: usize, failed: usize },
}

#[derive(Debug, Default)]
pub struct RedescribeReport {
    pub updated: usize,
    /// Photos whose detection or update failed, with the error
    pub failures: Vec<(i64, GalleryError)>,
}

/// Run detection again on every stored photo and overwrite its description.
///
/// Photos are processed in parallel, each with its own detector session.
/// A failing photo is reported and skipped; the batch always runs to the end.
pub fn redescribe_all(
    db: &Database,
    detector: &dyn ObjectDetector,
    status: Option<mpsc::Sender<RedescribeStatus>>,
) -> Result<RedescribeReport> {
    let photos = db.list_photos()?;
    let total = photos.len();

    if let Some(ref tx) = status {
        let _ = tx.send(RedescribeStatus::Starting { total_photos: total });
    }

    let counter = AtomicUsize::new(0);
    let outcomes: Vec<(i64, Result<String>)> = photos
        .par_iter()
        .map_with(status.clone(), |tx, photo| {
            let current = counter.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(tx) = tx {
                let _ = tx.send(RedescribeStatus::Processing {
                    current,
                    total,
                    filename: photo.filename.clone(),
                });
            }

            let outcome = redescribe_one(db, detector, photo);

            if let Some(tx) = tx {
                let _ = tx.send(match &outcome {
                    Ok(description) => RedescribeStatus::Described {
                        photo_id: photo.id,
                        description: description.clone(),
                    },
                    Err(e) => RedescribeStatus::Error {
                        photo_id: photo.id,
                        message: e.to_string(),
                    },
                });
            }
            (photo.id, outcome)
        })
        .collect();

    let mut report = RedescribeReport::default();
    for (photo_id, outcome) in outcomes {
        match outcome {
            Ok(_) => report.updated += 1,
            Err(e) => {
                warn!(photo_id, error = %e, "Re-describe failed");
                report.failures.push((photo_id, e));
            }
        }
    }

    if let Some(ref tx) = status {
        let _ = tx.send(RedescribeStatus::Completed {
            updated: report.updated,
            failed: report.failures.len(),
        });
    }
    info!(updated = report.updated, failed = report.failures.len(), "Re-describe finished");

    Ok(report)
}

fn redescribe_one(db: &Database, detector: &dyn ObjectDetector, photo: &Photo) -> Result<String> {
    let storage_path = Path::new(&photo.storage_path);

    // Start from the untouched capture so overlays are not drawn twice. The
    // copy runs under the store lock so it cannot resurrect a deleted file.
    if let Some(raw) = photo.raw_path.as_deref().map(Path::new) {
        db.with_photo(photo.id, |_| {
            if raw.is_file() {
                fs::copy(raw, storage_path).map_err(|e| GalleryError::io(storage_path, e))?;
            }
            Ok(())
        })?
        .ok_or_else(|| GalleryError::not_found(format!("photo {}", photo.id)))?;
    }

    let detections = detector.detect(storage_path)?;
    let description = describe::synthesize(&detections);
    db.update_description(photo.id, &description)?;
    Ok(description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewPhoto, NewReading};
    use crate::detect::Detection;
    use crate::storage::PendingDeletion;
    use tempfile::tempdir;

    struct ByName;

    impl ObjectDetector for ByName {
        fn name(&self) -> &'static str {
            "by-name"
        }

        fn detect(&self, image_path: &Path) -> Result<Vec<Detection>> {
            match image_path.file_name().and_then(|n| n.to_str()) {
                Some("cat.jpg") => Ok(vec![Detection::new("cat", 64.2)]),
                Some("empty.jpg") => Ok(vec![]),
                _ => Err(GalleryError::Inference("unreadable".to_string())),
            }
        }
    }

    fn insert(db: &Database, name: &str) -> i64 {
        let photo = NewPhoto {
            filename: name.to_string(),
            original_filename: name.to_string(),
            description: "stale : 1".to_string(),
            storage_path: format!("/nowhere/{name}"),
            ..Default::default()
        };
        let reading = NewReading {
            reading_type: "accelerometer".to_string(),
            data: "x".to_string(),
        };
        db.create_photo_with_reading(&photo, &reading).unwrap().id
    }

    #[test]
    fn test_redescribe_reports_failures_and_continues() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        let cat = insert(&db, "cat.jpg");
        let empty = insert(&db, "empty.jpg");
        let bad = insert(&db, "bad.jpg");

        let (tx, rx) = mpsc::channel();
        let report = redescribe_all(&db, &ByName, Some(tx)).unwrap();

        assert_eq!(report.updated, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, bad);

        assert_eq!(db.get_photo(cat).unwrap().unwrap().description, "cat : 64");
        assert_eq!(db.get_photo(empty).unwrap().unwrap().description, "");
        assert_eq!(db.get_photo(bad).unwrap().unwrap().description, "stale : 1");

        let statuses: Vec<_> = rx.iter().collect();
        assert!(matches!(statuses.first(), Some(RedescribeStatus::Starting { total_photos: 3 })));
        assert!(matches!(
            statuses.last(),
            Some(RedescribeStatus::Completed { updated: 2, failed: 1 })
        ));
    }

    #[test]
    fn test_deleted_photo_is_not_restored_from_raw() {
        let dir = tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();

        let raw = dir.path().join("raw-cat.jpg");
        let stored = dir.path().join("cat.jpg");
        fs::write(&raw, b"capture").unwrap();
        fs::write(&stored, b"annotated").unwrap();
        let photo = db
            .create_photo_with_reading(
                &NewPhoto {
                    filename: "cat.jpg".to_string(),
                    original_filename: "cat.jpg".to_string(),
                    storage_path: stored.to_string_lossy().into_owned(),
                    raw_path: Some(raw.to_string_lossy().into_owned()),
                    ..Default::default()
                },
                &NewReading {
                    reading_type: "accelerometer".to_string(),
                    data: "x".to_string(),
                },
            )
            .unwrap();

        let trash = dir.path().join("trash");
        let (_, pending) = db
            .delete_photo_cascade(photo.id, |_| {
                PendingDeletion::stage(&trash, &[stored.clone()])
            })
            .unwrap()
            .unwrap();
        pending.finish().unwrap();

        // the batch still holds the row it listed before the delete
        let result = redescribe_one(&db, &ByName, &photo);
        assert!(matches!(result, Err(GalleryError::NotFound(_))));
        assert!(!stored.exists());
    }

    #[test]
    fn test_raw_capture_is_restored_before_detection() {
        let dir = tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();

        let raw = dir.path().join("raw-cat.jpg");
        let stored = dir.path().join("cat.jpg");
        fs::write(&raw, b"capture").unwrap();
        fs::write(&stored, b"annotated").unwrap();
        let photo = db
            .create_photo_with_reading(
                &NewPhoto {
                    filename: "cat.jpg".to_string(),
                    original_filename: "cat.jpg".to_string(),
                    storage_path: stored.to_string_lossy().into_owned(),
                    raw_path: Some(raw.to_string_lossy().into_owned()),
                    ..Default::default()
                },
                &NewReading {
                    reading_type: "accelerometer".to_string(),
                    data: "x".to_string(),
                },
            )
            .unwrap();

        assert_eq!(redescribe_one(&db, &ByName, &photo).unwrap(), "cat : 64");
        assert_eq!(fs::read(&stored).unwrap(), b"capture");
    }
}
