use anyhow::Result;

use crate::detect::RawDetection;

/// Detector backend trait.
///
/// A backend wraps one opaque object-detection model: given a decoded RGB24
/// frame it returns zero or more detections. Detector output is trusted;
/// malformed boxes or unknown class ids pass through unchecked and are
/// handled (or ignored) downstream.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on one frame.
    ///
    /// Implementations must treat the pixel slice as read-only and
    /// ephemeral; nothing may be retained across calls.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
