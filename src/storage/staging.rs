//! Guards that keep the storage root consistent with the record store.

use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{GalleryError, Result};

/// A freshly reserved storage file.
///
/// Until [`StagedFile::commit`] is called the file (and any extra artifacts
/// registered with it) is removed when the guard is dropped, so a failed
/// ingestion never leaves a retrievable file behind.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    filename: String,
    extras: Vec<PathBuf>,
    committed: bool,
}

impl StagedFile {
    pub(crate) fn new(path: PathBuf, filename: String) -> Self {
        Self {
            path,
            filename,
            extras: Vec::new(),
            committed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Final storage name (sanitized, collision-free)
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Tie another file's lifetime to this reservation
    pub fn track(&mut self, extra: PathBuf) {
        self.extras.push(extra);
    }

    /// Keep the file(s) for good
    pub fn commit(mut self) -> PathBuf {
        self.committed = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for path in std::iter::once(&self.path).chain(self.extras.iter()) {
            match fs::remove_file(path) {
                Ok(()) => tracing::debug!(path = ?path, "Removed staged file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = ?path, error = %e, "Failed to remove staged file"),
            }
        }
    }
}

/// Files moved out of the storage root while a cascade delete is in flight.
///
/// The move is a rename into `<root>/.trash`, so it can be undone with
/// [`PendingDeletion::restore`] if the database transaction does not commit.
#[derive(Debug, Default)]
pub struct PendingDeletion {
    moved: Vec<(PathBuf, PathBuf)>,
}

impl PendingDeletion {
    pub(crate) fn stage(trash_dir: &Path, paths: &[PathBuf]) -> Result<Self> {
        let mut pending = PendingDeletion::default();

        for path in paths {
            if !path.exists() {
                tracing::warn!(path = ?path, "Backing file already missing");
                continue;
            }

            if !trash_dir.exists() {
                fs::create_dir_all(trash_dir).map_err(|e| GalleryError::io(trash_dir, e))?;
            }

            let staged = trash_name(trash_dir, path);
            if let Err(e) = fs::rename(path, &staged) {
                // put back whatever was already moved before reporting
                pending.restore();
                return Err(GalleryError::io(path, e));
            }
            pending.moved.push((path.clone(), staged));
        }

        Ok(pending)
    }

    /// Move every staged file back to where it was
    pub fn restore(&mut self) {
        for (original, staged) in self.moved.drain(..) {
            if let Err(e) = fs::rename(&staged, &original) {
                tracing::error!(path = ?original, staged = ?staged, error = %e, "Failed to restore file");
            }
        }
    }

    /// Permanently delete the staged files
    pub fn finish(mut self) -> Result<()> {
        let mut first_error = None;
        for (_, staged) in self.moved.drain(..) {
            if let Err(e) = fs::remove_file(&staged) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = ?staged, error = %e, "Failed to remove trashed file");
                    first_error.get_or_insert(GalleryError::io(staged, e));
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Unique name inside the trash directory; the counter keeps concurrent
/// deletes within the same second apart.
fn trash_name(trash_dir: &Path, original: &Path) -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let timestamp = Utc::now().timestamp();
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let name = original
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    trash_dir.join(format!("{}_{}_{}", timestamp, seq, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_uncommitted_file_is_removed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        let extra = dir.path().join("raw-a.jpg");
        fs::write(&path, b"x").unwrap();
        fs::write(&extra, b"y").unwrap();

        let mut staged = StagedFile::new(path.clone(), "a.jpg".into());
        staged.track(extra.clone());
        drop(staged);

        assert!(!path.exists());
        assert!(!extra.exists());
    }

    #[test]
    fn test_committed_file_is_kept() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        fs::write(&path, b"x").unwrap();

        let kept = StagedFile::new(path.clone(), "a.jpg".into()).commit();
        assert_eq!(kept, path);
        assert!(path.exists());
    }

    #[test]
    fn test_pending_deletion_restore_and_finish() {
        let dir = tempdir().unwrap();
        let trash = dir.path().join(".trash");
        let path = dir.path().join("a.jpg");
        fs::write(&path, b"x").unwrap();

        let mut pending = PendingDeletion::stage(&trash, &[path.clone()]).unwrap();
        assert!(!path.exists());
        pending.restore();
        assert!(path.exists());

        let pending = PendingDeletion::stage(&trash, &[path.clone()]).unwrap();
        pending.finish().unwrap();
        assert!(!path.exists());
        assert_eq!(fs::read_dir(&trash).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let dir = tempdir().unwrap();
        let pending =
            PendingDeletion::stage(&dir.path().join(".trash"), &[dir.path().join("gone.jpg")]).unwrap();
        assert!(pending.finish().is_ok());
    }
}
