//! YOLO-family detector running on ONNX Runtime.
//!
//! Every call to [`OnnxDetector::detect`] acquires its own [`ModelSession`]
//! and drops it before returning, on success and on every error path. No
//! model state is shared between calls or threads.

use anyhow::{anyhow, Context};
use image::{DynamicImage, GenericImageView};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::{Path, PathBuf};

use super::{compute_iou, labels, overlay, rank, BoundingBox, Detection, ObjectDetector};
use crate::config::DetectorConfig;
use crate::error::{GalleryError, Result};

const INPUT_NAME: &str = "images";
/// x, y, w, h ahead of the class scores in each prediction
const BOX_CHANNELS: usize = 4;

/// An inference session that lives for exactly one detection call
pub struct ModelSession {
    session: Session,
    model_path: PathBuf,
}

impl ModelSession {
    pub fn acquire(model_path: &Path, intra_threads: usize) -> anyhow::Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load model {}", model_path.display()))?;

        tracing::debug!(model = ?model_path, "Acquired detection session");
        Ok(Self {
            session,
            model_path: model_path.to_path_buf(),
        })
    }
}

impl Drop for ModelSession {
    fn drop(&mut self) {
        tracing::debug!(model = ?self.model_path, "Released detection session");
    }
}

pub struct OnnxDetector {
    config: DetectorConfig,
}

impl OnnxDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Make sure the model file is on disk, downloading it if a URL is configured
    pub fn ensure_model(&self) -> Result<PathBuf> {
        ensure_model(&self.config.model_path, self.config.model_url.as_deref())
            .map_err(|e| GalleryError::Inference(format!("{:#}", e)))
    }

    fn infer(&self, img: &DynamicImage) -> anyhow::Result<Vec<Detection>> {
        let model_path = ensure_model(&self.config.model_path, self.config.model_url.as_deref())?;
        let mut session = ModelSession::acquire(&model_path, self.config.intra_threads)?;

        let size = self.config.input_size;
        let (orig_width, orig_height) = img.dimensions();
        let input_tensor = Tensor::from_array((
            [1usize, 3, size as usize, size as usize],
            to_nchw(img, size).into_boxed_slice(),
        ))?;

        let outputs = session.session.run(ort::inputs![INPUT_NAME => input_tensor])?;
        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| anyhow!("Model produced no output"))?;
        let (shape, data) = output.try_extract_tensor::<f32>()?;

        let candidates = decode_predictions(
            &shape[..],
            data,
            orig_width as f32 / size as f32,
            orig_height as f32 / size as f32,
            self.config.confidence_threshold,
        )?;

        let mut detections: Vec<Detection> = nms(candidates, self.config.nms_threshold)
            .into_iter()
            .map(|c| Detection::new(labels::label_for(c.class_idx), c.score * 100.0).with_bbox(c.bbox))
            .collect();
        rank(&mut detections);
        detections.truncate(self.config.max_detections);

        Ok(detections)
    }
}

impl ObjectDetector for OnnxDetector {
    fn name(&self) -> &'static str {
        "onnx-yolo"
    }

    /// Detect objects in `image_path`.
    ///
    /// With `draw_overlays` enabled the file at `image_path` is rewritten
    /// with a box around each detection.
    fn detect(&self, image_path: &Path) -> Result<Vec<Detection>> {
        let img = image::open(image_path).map_err(|e| GalleryError::Decode(e.to_string()))?;

        let detections = self
            .infer(&img)
            .map_err(|e| GalleryError::Inference(format!("{:#}", e)))?;

        tracing::info!(path = ?image_path, count = detections.len(), "Detection finished");

        if self.config.draw_overlays {
            overlay::draw_detections(image_path, &detections)?;
        }

        Ok(detections)
    }
}

/// Download a model file if it doesn't exist
fn ensure_model(model_path: &Path, url: Option<&str>) -> anyhow::Result<PathBuf> {
    if model_path.exists() {
        return Ok(model_path.to_path_buf());
    }

    let url = url.ok_or_else(|| {
        anyhow!("Model {} not found and no model_url configured", model_path.display())
    })?;

    if let Some(parent) = model_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(model = ?model_path, url = %url, "Downloading detection model...");
    let response = ureq::get(url)
        .call()
        .map_err(|e| anyhow!("Failed to download model: {}", e))?;

    let partial = model_path.with_extension("part");
    let mut file = std::fs::File::create(&partial)?;
    std::io::copy(&mut response.into_reader(), &mut file)?;
    std::fs::rename(&partial, model_path)?;
    tracing::info!(model = ?model_path, "Model downloaded");

    Ok(model_path.to_path_buf())
}

/// Resize to the square model input and lay out as normalized NCHW floats
fn to_nchw(img: &DynamicImage, size: u32) -> Vec<f32> {
    let resized = img.resize_exact(size, size, image::imageops::FilterType::Triangle);
    let rgb = resized.to_rgb8();
    let plane = (size * size) as usize;

    let mut input_data = vec![0.0f32; 3 * plane];
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let idx = y as usize * size as usize + x as usize;
        input_data[idx] = pixel[0] as f32 / 255.0;
        input_data[plane + idx] = pixel[1] as f32 / 255.0;
        input_data[2 * plane + idx] = pixel[2] as f32 / 255.0;
    }
    input_data
}

#[derive(Debug, Clone)]
struct Candidate {
    bbox: BoundingBox,
    class_idx: usize,
    score: f32,
}

/// Decode raw YOLO output into scored boxes in original-image pixels.
///
/// Accepts both `[1, 4 + classes, anchors]` (YOLOv8 default export) and the
/// transposed `[1, anchors, 4 + classes]` layout.
fn decode_predictions(
    shape: &[i64],
    data: &[f32],
    scale_x: f32,
    scale_y: f32,
    threshold: f32,
) -> anyhow::Result<Vec<Candidate>> {
    if shape.len() != 3 || shape[0] != 1 {
        return Err(anyhow!("Unexpected output shape {:?}", shape));
    }
    let (a, b) = (shape[1] as usize, shape[2] as usize);
    let channels_first = a < b;
    let (channels, anchors) = if channels_first { (a, b) } else { (b, a) };
    if channels <= BOX_CHANNELS || data.len() < channels * anchors {
        return Err(anyhow!("Unexpected output shape {:?}", shape));
    }

    let at = |anchor: usize, channel: usize| {
        if channels_first {
            data[channel * anchors + anchor]
        } else {
            data[anchor * channels + channel]
        }
    };

    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let (class_idx, score) = (BOX_CHANNELS..channels)
            .map(|c| (c - BOX_CHANNELS, at(anchor, c)))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

        if score < threshold {
            continue;
        }

        let (cx, cy, w, h) = (at(anchor, 0), at(anchor, 1), at(anchor, 2), at(anchor, 3));
        let x1 = ((cx - w / 2.0) * scale_x) as i32;
        let y1 = ((cy - h / 2.0) * scale_y) as i32;

        candidates.push(Candidate {
            bbox: BoundingBox {
                x: x1.max(0),
                y: y1.max(0),
                width: ((w * scale_x) as i32).max(1),
                height: ((h * scale_y) as i32).max(1),
            },
            class_idx,
            score,
        });
    }

    Ok(candidates)
}

/// Per-class non-maximum suppression
fn nms(mut candidates: Vec<Candidate>, threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut keep: Vec<Candidate> = Vec::new();
    let mut suppressed = vec![false; candidates.len()];

    for i in 0..candidates.len() {
        if suppressed[i] {
            continue;
        }

        keep.push(candidates[i].clone());

        for j in (i + 1)..candidates.len() {
            if suppressed[j] || candidates[j].class_idx != candidates[i].class_idx {
                continue;
            }
            if compute_iou(&candidates[i].bbox, &candidates[j].bbox) > threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}
