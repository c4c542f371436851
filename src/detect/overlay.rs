//! Bounding-box overlays drawn straight into the stored photo.

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::path::Path;

use super::{BoundingBox, Detection};
use crate::error::{GalleryError, Result};

const PALETTE: [[u8; 3]; 6] = [
    [230, 25, 75],
    [60, 180, 75],
    [255, 225, 25],
    [0, 130, 200],
    [245, 130, 48],
    [145, 30, 180],
];

const STROKE: i32 = 2;

/// Rewrite `path` with an outline around every boxed detection.
///
/// Returns the number of boxes drawn. The file is left untouched when no
/// detection carries a box.
pub fn draw_detections(path: &Path, detections: &[Detection]) -> Result<usize> {
    let boxes: Vec<BoundingBox> = detections.iter().filter_map(|d| d.bbox).collect();
    if boxes.is_empty() {
        return Ok(0);
    }

    let img = image::open(path).map_err(|e| GalleryError::Decode(e.to_string()))?;
    let mut canvas = img.to_rgb8();

    for (idx, bbox) in boxes.iter().enumerate() {
        draw_rect(&mut canvas, bbox, Rgb(PALETTE[idx % PALETTE.len()]));
    }

    let format = ImageFormat::from_path(path).unwrap_or(ImageFormat::Png);
    DynamicImage::ImageRgb8(canvas)
        .save_with_format(path, format)
        .map_err(|e| match e {
            image::ImageError::IoError(io) => GalleryError::io(path, io),
            other => GalleryError::io(path, std::io::Error::other(other.to_string())),
        })?;

    Ok(boxes.len())
}

/// Hollow rectangle, clipped to the canvas
fn draw_rect(canvas: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
    let (w, h) = (canvas.width() as i32, canvas.height() as i32);
    if w == 0 || h == 0 {
        return;
    }
    let x0 = bbox.x.clamp(0, w - 1);
    let y0 = bbox.y.clamp(0, h - 1);
    let x1 = bbox.x.saturating_add(bbox.width).saturating_sub(1).clamp(0, w - 1);
    let y1 = bbox.y.saturating_add(bbox.height).saturating_sub(1).clamp(0, h - 1);

    for y in y0..=y1 {
        for x in x0..=x1 {
            let on_edge = x - x0 < STROKE || x1 - x < STROKE || y - y0 < STROKE || y1 - y < STROKE;
            if on_edge {
                canvas.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}
