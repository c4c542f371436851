//! Image normalization: decode the upload, store it, fix its orientation.
//!
//! The capture app delivers frames rotated a quarter turn counter-clockwise,
//! so every stored photo is turned 90 degrees clockwise. The angle is fixed
//! and never inferred from content or EXIF.

use image::{DynamicImage, ImageFormat};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{GalleryError, Result};

/// Result of a successful normalization
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub path: PathBuf,
    /// Dimensions after rotation
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    /// SHA-256 of the uploaded bytes, before any rewrite
    pub sha256: String,
}

/// Decode `raw`, write it to `destination`, then overwrite it rotated 90° clockwise.
///
/// Nothing is written when `raw` does not decode. On I/O failure the caller
/// owns cleanup of `destination`.
pub fn normalize(raw: &[u8], destination: &Path) -> Result<NormalizedImage> {
    let source_format =
        image::guess_format(raw).map_err(|e| GalleryError::Decode(e.to_string()))?;
    let decoded = image::load_from_memory_with_format(raw, source_format)
        .map_err(|e| GalleryError::Decode(e.to_string()))?;

    fs::write(destination, raw).map_err(|e| GalleryError::io(destination, e))?;

    // keep the client's extension authoritative for the stored encoding
    let format = ImageFormat::from_path(destination).unwrap_or(source_format);
    let rotated = decoded.rotate90();
    let rotated = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(rotated.to_rgb8()),
        _ => rotated,
    };

    rotated
        .save_with_format(destination, format)
        .map_err(|e| match e {
            image::ImageError::IoError(io) => GalleryError::io(destination, io),
            other => GalleryError::io(destination, std::io::Error::other(other.to_string())),
        })?;

    tracing::debug!(
        path = ?destination,
        width = rotated.width(),
        height = rotated.height(),
        "Normalized upload"
    );

    Ok(NormalizedImage {
        path: destination.to_path_buf(),
        width: rotated.width(),
        height: rotated.height(),
        format,
        sha256: format!("{:x}", Sha256::digest(raw)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;
    use tempfile::tempdir;

    fn png_bytes(img: RgbImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_rotates_clockwise() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("strip.png");

        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([0, 0, 255]));

        let normalized = normalize(&png_bytes(img), &dest).unwrap();
        assert_eq!((normalized.width, normalized.height), (1, 2));

        let stored = image::open(&dest).unwrap().to_rgb8();
        assert_eq!(stored.dimensions(), (1, 2));
        assert_eq!(*stored.get_pixel(0, 0), Rgb([255, 0, 0]));
        assert_eq!(*stored.get_pixel(0, 1), Rgb([0, 0, 255]));
    }

    #[test]
    fn test_rotation_is_deterministic() {
        let dir = tempdir().unwrap();
        let bytes = png_bytes(RgbImage::from_fn(8, 5, |x, y| Rgb([x as u8 * 20, y as u8 * 40, 7])));

        let a = dir.path().join("a.jpg");
        let b = dir.path().join("b.jpg");
        let first = normalize(&bytes, &a).unwrap();
        let second = normalize(&bytes, &b).unwrap();

        assert_eq!(first.format, ImageFormat::Jpeg);
        assert_eq!(first.sha256, second.sha256);
        assert_eq!(fs::read(&a).unwrap(), fs::read(&b).unwrap());
    }

    #[test]
    fn test_rejects_non_image_bytes() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("bad.jpg");

        let err = normalize(b"definitely not an image", &dest).unwrap_err();
        assert!(matches!(err, GalleryError::Decode(_)));
        assert!(!dest.exists());
    }

    #[test]
    fn test_unwritable_destination_is_io_error() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("missing-dir").join("a.png");
        let bytes = png_bytes(RgbImage::from_pixel(2, 2, Rgb([1, 2, 3])));

        let err = normalize(&bytes, &dest).unwrap_err();
        assert!(matches!(err, GalleryError::Io { .. }));
    }
}
