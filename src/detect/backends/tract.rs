#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawDetection;

/// Tract-based backend running a YOLO-style ONNX detector.
///
/// The model is loaded once from a local file; inference is synchronous on
/// the calling thread. Output layout is the usual `[1, 4 + classes, boxes]`
/// tensor of center-format boxes with per-class scores.
pub struct TractBackend {
    model: TypedSimplePlan<TypedModel>,
    input_width: u32,
    input_height: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_width: u32, input_height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, input_height as usize, input_width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_width,
            input_height,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Override the default IoU threshold used for suppression.
    pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
        self.iou_threshold = threshold;
        self
    }

    /// Resample the frame to the model input size (nearest neighbor) and
    /// lay it out as NCHW float.
    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<Tensor> {
        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected_len,
                pixels.len()
            ));
        }

        let in_w = self.input_width as usize;
        let in_h = self.input_height as usize;
        let input =
            tract_ndarray::Array4::from_shape_fn((1, 3, in_h, in_w), |(_, channel, y, x)| {
                let src_x = (x * width as usize) / in_w;
                let src_y = (y * height as usize) / in_h;
                let idx = (src_y * width as usize + src_x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            });

        Ok(input.into_tensor())
    }

    fn decode_output(
        &self,
        outputs: TVec<TValue>,
        frame_width: u32,
        frame_height: u32,
    ) -> Result<Vec<RawDetection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape();
        if shape.len() != 3 || shape[1] < 5 {
            return Err(anyhow!("unexpected model output shape {:?}", shape));
        }
        let num_classes = shape[1] - 4;
        let num_boxes = shape[2];

        let scale_x = frame_width as f32 / self.input_width as f32;
        let scale_y = frame_height as f32 / self.input_height as f32;

        let mut detections = Vec::new();
        for i in 0..num_boxes {
            let mut best_score = 0.0f32;
            let mut best_class = 0u32;
            for class_idx in 0..num_classes {
                let score = view[[0, 4 + class_idx, i]];
                if score > best_score {
                    best_score = score;
                    best_class = class_idx as u32;
                }
            }
            if best_score < self.confidence_threshold {
                continue;
            }

            let x_center = view[[0, 0, i]];
            let y_center = view[[0, 1, i]];
            let w = view[[0, 2, i]];
            let h = view[[0, 3, i]];
            detections.push(RawDetection {
                x1: (x_center - w / 2.0) * scale_x,
                y1: (y_center - h / 2.0) * scale_y,
                x2: (x_center + w / 2.0) * scale_x,
                y2: (y_center + h / 2.0) * scale_y,
                confidence: best_score,
                class_id: best_class,
            });
        }

        Ok(suppress_overlaps(detections, self.iou_threshold))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<RawDetection>> {
        let input = self.build_input(pixels, width, height)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode_output(outputs, width, height)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = vec![0u8; (self.input_width * self.input_height * 3) as usize];
        self.detect(&blank, self.input_width, self.input_height)?;
        Ok(())
    }
}

/// Greedy per-class non-maximum suppression.
fn suppress_overlaps(mut detections: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<RawDetection> = Vec::new();
    for det in detections {
        let overlaps = keep
            .iter()
            .any(|kept| kept.class_id == det.class_id && iou(kept, &det) > iou_threshold);
        if !overlaps {
            keep.push(det);
        }
    }
    keep
}

fn iou(a: &RawDetection, b: &RawDetection) -> f32 {
    let ix1 = a.x1.max(b.x1);
    let iy1 = a.y1.max(b.y1);
    let ix2 = a.x2.min(b.x2);
    let iy2 = a.y2.min(b.y2);
    let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
    let area_a = (a.x2 - a.x1).max(0.0) * (a.y2 - a.y1).max(0.0);
    let area_b = (b.x2 - b.x1).max(0.0) * (b.y2 - b.y1).max(0.0);
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}
