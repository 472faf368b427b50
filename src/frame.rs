//! Decoded frame container.
//!
//! Frames are plain RGB24 buffers handed from an ingest source (or a live
//! single-frame submission) to a detector backend. They live only for the
//! duration of one request and are never persisted.

use anyhow::{Context, Result};

/// One decoded RGB24 frame.
#[derive(Clone, Debug)]
pub struct RgbFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl RgbFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
        }
    }
}

/// Decode a single submitted image (JPEG or PNG bytes) into an RGB24 frame.
pub fn decode_image_bytes(bytes: &[u8]) -> Result<RgbFrame> {
    let image = image::load_from_memory(bytes).context("unable to decode image bytes")?;
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    Ok(RgbFrame::new(rgb.into_raw(), width, height))
}
