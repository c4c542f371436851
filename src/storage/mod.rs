//! Flat on-disk photo store.
//!
//! Every photo lives directly under one root directory, named by its
//! sanitized upload filename. Name collisions are resolved by reserving the
//! first free `stem-N.ext` variant with create-new semantics, so two
//! concurrent uploads can never claim the same file.

pub mod filename;
pub mod staging;

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::StorageConfig;
use crate::error::{GalleryError, Result};

pub use filename::{extension_of, sanitize_filename, validate_extension};
pub use staging::{PendingDeletion, StagedFile};

const MAX_NAME_ATTEMPTS: usize = 10_000;
const RAW_DIR: &str = "raw";
const TRASH_DIR: &str = ".trash";

#[derive(Debug, Clone)]
pub struct PhotoStore {
    root: PathBuf,
    allowed_extensions: Vec<String>,
    keep_raw_capture: bool,
}

impl PhotoStore {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            root: config.root.clone(),
            allowed_extensions: config.allowed_extensions.clone(),
            keep_raw_capture: config.keep_raw_capture,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn keeps_raw_capture(&self) -> bool {
        self.keep_raw_capture
    }

    fn ensure_root(&self) -> Result<()> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root).map_err(|e| GalleryError::io(&self.root, e))?;
        }
        Ok(())
    }

    /// Sanitize and validate `client_name`, then reserve a free file for it.
    ///
    /// A candidate is free when no file holds it and `is_taken` (the record
    /// store's view) does not claim it either.
    pub fn reserve<F>(&self, client_name: &str, is_taken: F) -> Result<StagedFile>
    where
        F: Fn(&str) -> Result<bool>,
    {
        let sanitized = sanitize_filename(client_name)?;
        validate_extension(&sanitized, &self.allowed_extensions)?;
        self.ensure_root()?;

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let candidate = filename::numbered(&sanitized, attempt);
            if is_taken(&candidate)? {
                continue;
            }
            let path = self.root.join(&candidate);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => {
                    tracing::debug!(path = ?path, "Reserved storage file");
                    return Ok(StagedFile::new(path, candidate));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(GalleryError::io(path, e)),
            }
        }

        Err(GalleryError::Validation(format!(
            "no free storage name left for {:?}",
            sanitized
        )))
    }

    /// Where the untouched capture of `filename` is kept when raw copies are enabled
    pub fn raw_path(&self, filename: &str) -> PathBuf {
        self.root.join(RAW_DIR).join(filename)
    }

    /// Copy the normalized capture aside before the detector mutates it
    pub fn preserve_raw(&self, staged: &mut StagedFile) -> Result<PathBuf> {
        let raw_path = self.raw_path(staged.filename());
        if let Some(parent) = raw_path.parent() {
            fs::create_dir_all(parent).map_err(|e| GalleryError::io(parent, e))?;
        }
        fs::copy(staged.path(), &raw_path).map_err(|e| GalleryError::io(&raw_path, e))?;
        staged.track(raw_path.clone());
        Ok(raw_path)
    }

    /// Resolve a download name to a file directly inside the root.
    ///
    /// Anything that escapes the root, names a nested path or does not
    /// exist is reported as not found.
    pub fn resolve(&self, filename: &str) -> Result<PathBuf> {
        let missing = || GalleryError::not_found(format!("file {:?}", filename));

        if filename.is_empty() || filename.contains(&['/', '\\'][..]) || filename == "." || filename == ".." {
            return Err(missing());
        }

        let root = self.root.canonicalize().map_err(|_| missing())?;
        let candidate = root.join(filename).canonicalize().map_err(|_| missing())?;

        if candidate.parent() != Some(root.as_path()) || !candidate.is_file() {
            return Err(missing());
        }
        Ok(candidate)
    }

    pub fn open(&self, filename: &str) -> Result<File> {
        let path = self.resolve(filename)?;
        File::open(&path).map_err(|e| GalleryError::io(path, e))
    }

    /// Move the given files out of the served root, ready for deletion
    pub fn stage_deletion(&self, paths: &[PathBuf]) -> Result<PendingDeletion> {
        PendingDeletion::stage(&self.root.join(TRASH_DIR), paths)
    }
}
