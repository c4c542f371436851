//! Error taxonomy shared by the ingestion pipeline and the gallery surface.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GalleryError>;

#[derive(Debug, Error)]
pub enum GalleryError {
    /// Upload bytes are not a decodable image (or not valid base64)
    #[error("could not decode image: {0}")]
    Decode(String),

    /// Writing, rotating, moving or removing a stored file failed
    #[error("storage I/O failed for {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The detection model could not be loaded or inference failed
    #[error("object detection failed: {0}")]
    Inference(String),

    /// The record store rejected a read or write
    #[error("database error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("{0} not found")]
    NotFound(String),

    /// Disallowed extension or unsafe filename
    #[error("invalid upload: {0}")]
    Validation(String),
}

impl GalleryError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GalleryError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        GalleryError::NotFound(what.into())
    }

    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            GalleryError::Decode(_) => "decode",
            GalleryError::Io { .. } => "io",
            GalleryError::Inference(_) => "inference",
            GalleryError::Storage(_) => "storage",
            GalleryError::NotFound(_) => "not_found",
            GalleryError::Validation(_) => "validation",
        }
    }
}
