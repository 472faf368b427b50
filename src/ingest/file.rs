//! Local file frame source.
//!
//! `FileSource` decodes frames from a local video file, in order, entirely
//! in memory. A `stub://` path selects a deterministic synthetic source so
//! the batch pipeline can be exercised without FFmpeg.

use anyhow::{anyhow, Result};

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use crate::frame::RgbFrame;

/// Configuration for a local file source.
#[derive(Clone, Debug, Default)]
pub struct FileConfig {
    /// Local file path, or a `stub://` URI for the synthetic source.
    pub path: String,
}

/// Local file frame source.
pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticFileSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn open(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes)"
            ));
        }
        if config.path.starts_with("stub://") {
            Ok(Self {
                backend: FileBackend::Synthetic(SyntheticFileSource::new(&config.path)?),
            })
        } else {
            #[cfg(feature = "ingest-file-ffmpeg")]
            {
                Ok(Self {
                    backend: FileBackend::Ffmpeg(FfmpegFileSource::new(config)?),
                })
            }
            #[cfg(not(feature = "ingest-file-ffmpeg"))]
            {
                Err(anyhow!(
                    "file ingestion requires the ingest-file-ffmpeg feature"
                ))
            }
        }
    }

    /// Decode the next frame, or `None` when the file is exhausted.
    pub fn next_frame(&mut self) -> Result<Option<RgbFrame>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    /// Nominal frame rate from container metadata; 0.0 when unknown.
    pub fn frame_rate(&self) -> f64 {
        match &self.backend {
            FileBackend::Synthetic(source) => source.frame_rate(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.frame_rate(),
        }
    }

    /// Total frame count from container metadata; 0 when unknown.
    pub fn total_frames(&self) -> u64 {
        match &self.backend {
            FileBackend::Synthetic(source) => source.total_frames(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.total_frames(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

const SYNTHETIC_WIDTH: u32 = 64;
const SYNTHETIC_HEIGHT: u32 = 48;

/// Synthetic frame source selected by `stub://` paths.
///
/// Query parameters: `frames` (frame count, default 25) and `fps`
/// (reported frame rate, default 25; `fps=0` simulates missing metadata).
struct SyntheticFileSource {
    frames: u64,
    fps: f64,
    emitted: u64,
}

impl SyntheticFileSource {
    fn new(path: &str) -> Result<Self> {
        let mut frames: u64 = 25;
        let mut fps: f64 = 25.0;
        if let Some(query) = path.split_once('?').map(|(_, query)| query) {
            for pair in query.split('&') {
                let Some((key, value)) = pair.split_once('=') else {
                    continue;
                };
                match key {
                    "frames" => {
                        frames = value
                            .parse()
                            .map_err(|_| anyhow!("stub frames must be an integer"))?;
                    }
                    "fps" => {
                        fps = value
                            .parse()
                            .map_err(|_| anyhow!("stub fps must be a number"))?;
                    }
                    _ => return Err(anyhow!("unknown stub source parameter '{}'", key)),
                }
            }
        }
        log::info!("FileSource: opened {} (synthetic)", path);
        Ok(Self {
            frames,
            fps,
            emitted: 0,
        })
    }

    fn next_frame(&mut self) -> Result<Option<RgbFrame>> {
        if self.emitted >= self.frames {
            return Ok(None);
        }
        let pixel_count = (SYNTHETIC_WIDTH * SYNTHETIC_HEIGHT * 3) as usize;
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.emitted) % 256) as u8;
        }
        self.emitted += 1;
        Ok(Some(RgbFrame::new(
            pixels,
            SYNTHETIC_WIDTH,
            SYNTHETIC_HEIGHT,
        )))
    }

    fn frame_rate(&self) -> f64 {
        self.fps
    }

    fn total_frames(&self) -> u64 {
        self.frames
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_source_exhausts_after_configured_frames() {
        let mut source = FileSource::open(FileConfig {
            path: "stub://clip?frames=3".to_string(),
        })
        .unwrap();
        assert_eq!(source.total_frames(), 3);
        assert_eq!(source.frame_rate(), 25.0);
        for _ in 0..3 {
            assert!(source.next_frame().unwrap().is_some());
        }
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn synthetic_source_reports_configured_fps() {
        let source = FileSource::open(FileConfig {
            path: "stub://clip?frames=1&fps=0".to_string(),
        })
        .unwrap();
        assert_eq!(source.frame_rate(), 0.0);
    }

    #[test]
    fn rejects_remote_urls() {
        assert!(FileSource::open(FileConfig {
            path: "rtsp://camera/stream".to_string(),
        })
        .is_err());
    }

    #[test]
    fn rejects_unknown_stub_parameters() {
        assert!(FileSource::open(FileConfig {
            path: "stub://clip?stride=2".to_string(),
        })
        .is_err());
    }
}
