use serde::Serialize;

/// One object instance found by the detector in a single frame.
///
/// Coordinates are pixel-space corners. `x1 <= x2` / `y1 <= y2` is not
/// enforced upstream; consumers must tolerate degenerate boxes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct RawDetection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f32,
    /// Detector taxonomy index.
    pub class_id: u32,
}
