//! Detection recording.
//!
//! Maps one raw detection plus its frame position into the normalized
//! record shape shared by the batch verdict. Pure; detector output is
//! trusted, so malformed boxes and unknown class ids pass through.

use serde::Serialize;

use crate::detect::RawDetection;

/// One detected object instance in one frame of a processed video.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionRecord {
    /// Frame ordinal within the processed window.
    #[serde(rename = "frame")]
    pub frame_index: u32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: u32,
    /// Seconds from video start, rounded to 3 decimals.
    pub timestamp: f64,
}

/// Map a raw detection into a [`DetectionRecord`].
///
/// `timestamp = round3(frame_index / frame_rate)`.
pub fn record_detection(
    detection: &RawDetection,
    frame_index: u32,
    frame_rate: f64,
) -> DetectionRecord {
    DetectionRecord {
        frame_index,
        x1: detection.x1,
        y1: detection.y1,
        x2: detection.x2,
        y2: detection.y2,
        confidence: detection.confidence,
        class_id: detection.class_id,
        timestamp: round3(frame_index as f64 / frame_rate),
    }
}

/// Round to 3 decimal places.
pub(crate) fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Round to 4 decimal places.
pub(crate) fn round4(value: f64) -> f64 {
    (value * 10000.0).round() / 10000.0
}
