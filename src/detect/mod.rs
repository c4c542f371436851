//! Object detection: turns a stored photo into ranked (label, confidence) pairs.

pub mod labels;
pub mod onnx;
pub mod overlay;

use serde::Serialize;
use std::path::Path;

use crate::error::Result;

pub use onnx::OnnxDetector;

/// Pixel-space box, top-left origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub label: String,
    /// Percentage in 0..=100
    pub confidence: f32,
    pub bbox: Option<BoundingBox>,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox: None,
        }
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }
}

/// A detector over image files.
///
/// Implementations return detections in descending confidence order; an
/// empty vector is a normal outcome. They may rewrite the image in place
/// (overlay drawing), so callers must not assume the file is unchanged.
pub trait ObjectDetector: Send + Sync {
    fn name(&self) -> &'static str;

    fn detect(&self, image_path: &Path) -> Result<Vec<Detection>>;
}

/// Sort highest confidence first; ties keep their original order.
pub fn rank(detections: &mut [Detection]) {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Intersection over Union between two boxes
pub fn compute_iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = a.x.saturating_add(a.width).min(b.x.saturating_add(b.width));
    let y2 = a.y.saturating_add(a.height).min(b.y.saturating_add(b.height));

    // widen before multiplying; model coordinates can sit at the i32 limits
    let overlap = |lo: i32, hi: i32| (i64::from(hi) - i64::from(lo)).max(0) as f32;
    let intersection = overlap(x1, x2) * overlap(y1, y2);
    let area_a = a.width.max(0) as f32 * a.height.max(0) as f32;
    let area_b = b.width.max(0) as f32 * b.height.max(0) as f32;
    let union = area_a + area_b - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}
