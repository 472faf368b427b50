//! Frame ingestion sources.
//!
//! This module yields sequential decoded frames from a video:
//! - Local video files via FFmpeg (feature: ingest-file-ffmpeg)
//! - Synthetic `stub://` source (testing)
//!
//! All sources produce `RgbFrame` instances in strict frame order starting
//! at index 0, and report a nominal frame rate plus a total frame count
//! when the container knows it. Exhaustion is `Ok(None)`, never an error.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;

pub use file::{FileConfig, FileSource};
