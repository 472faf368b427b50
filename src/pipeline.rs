//! Frame-budget controller.
//!
//! Drives the batch pipeline: frame source -> detector backend -> detection
//! recorder -> incident aggregator. Frames are processed strictly in order
//! from index 0 as a dense prefix (not a stride), stopping at the earlier
//! of source exhaustion or the configured frame budget. The budget is a
//! deliberate latency/cost cap; when it cuts a video short the verdict says
//! so via `truncated`.

use std::sync::Mutex;

use anyhow::{anyhow, Result};

use crate::classes::{ClassNameTable, IncidentPolicy};
use crate::detect::DetectorBackend;
use crate::ingest::FileSource;
use crate::record::record_detection;
use crate::verdict::{aggregate_records, IncidentVerdict};

/// Maximum leading frames processed per video request.
pub const DEFAULT_MAX_FRAMES: u32 = 120;

/// Frame rate assumed when container metadata is missing or implausible.
pub const FALLBACK_FPS: f64 = 25.0;

/// Per-request work bounds.
#[derive(Clone, Copy, Debug)]
pub struct AnalysisLimits {
    pub max_frames: u32,
}

impl Default for AnalysisLimits {
    fn default() -> Self {
        Self {
            max_frames: DEFAULT_MAX_FRAMES,
        }
    }
}

/// Run the batch pipeline over a frame source and produce the verdict.
///
/// The backend mutex is held for the whole request, so concurrent callers
/// serialize at the model boundary.
pub fn analyze_video(
    source: &mut FileSource,
    backend: &Mutex<dyn DetectorBackend>,
    limits: AnalysisLimits,
    policy: &IncidentPolicy,
    classes: &ClassNameTable,
) -> Result<IncidentVerdict> {
    let frame_rate = effective_frame_rate(source.frame_rate());
    let total_frames = source.total_frames();

    let mut backend = backend
        .lock()
        .map_err(|_| anyhow!("backend lock poisoned"))?;

    let mut records = Vec::new();
    let mut processed: u32 = 0;
    while processed < limits.max_frames {
        let Some(frame) = source.next_frame()? else {
            break;
        };
        let detections = backend.detect(&frame.data, frame.width, frame.height)?;
        for detection in &detections {
            records.push(record_detection(detection, processed, frame_rate));
        }
        processed += 1;
    }
    drop(backend);

    let truncated = is_truncated(processed, limits.max_frames, total_frames);
    if truncated {
        log::info!(
            "frame budget reached after {} frames (total {})",
            processed,
            total_frames
        );
    }

    Ok(aggregate_records(
        records,
        total_frames,
        frame_rate,
        truncated,
        policy,
        classes,
    ))
}

/// Container frame rates at or below 1.0 are treated as missing metadata.
pub fn effective_frame_rate(reported: f64) -> f64 {
    if reported <= 1.0 {
        FALLBACK_FPS
    } else {
        reported
    }
}

// When the container reports a total, truncation is exact. When it does
// not, hitting the budget is conservatively flagged rather than decoding
// past the ceiling to peek.
fn is_truncated(processed: u32, max_frames: u32, total_frames: u64) -> bool {
    if processed < max_frames {
        return false;
    }
    match total_frames {
        0 => true,
        total => total > u64::from(max_frames),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::detect::{RawDetection, StubBackend};
    use crate::ingest::FileConfig;
    use crate::verdict::Severity;

    fn source(path: &str) -> FileSource {
        FileSource::open(FileConfig {
            path: path.to_string(),
        })
        .unwrap()
    }

    fn detection(class_id: u32, confidence: f32) -> RawDetection {
        RawDetection {
            x1: 5.0,
            y1: 5.0,
            x2: 20.0,
            y2: 20.0,
            confidence,
            class_id,
        }
    }

    #[test]
    fn never_processes_more_than_the_frame_budget() {
        let mut source = source("stub://long?frames=10000");
        let backend = Arc::new(Mutex::new(StubBackend::new()));
        let verdict = analyze_video(
            &mut source,
            &*backend,
            AnalysisLimits { max_frames: 120 },
            &IncidentPolicy::default(),
            &ClassNameTable::default(),
        )
        .unwrap();

        assert_eq!(backend.lock().unwrap().calls(), 120);
        assert!(verdict.truncated);
    }

    #[test]
    fn short_video_is_not_truncated() {
        let mut source = source("stub://short?frames=5");
        let backend = Arc::new(Mutex::new(StubBackend::new()));
        let verdict = analyze_video(
            &mut source,
            &*backend,
            AnalysisLimits::default(),
            &IncidentPolicy::default(),
            &ClassNameTable::default(),
        )
        .unwrap();

        assert_eq!(backend.lock().unwrap().calls(), 5);
        assert!(!verdict.truncated);
    }

    #[test]
    fn single_detection_end_to_end() {
        let mut source = source("stub://clip?frames=1&fps=25");
        let backend = Arc::new(Mutex::new(StubBackend::with_script(vec![vec![detection(
            2, 0.9,
        )]])));
        let verdict = analyze_video(
            &mut source,
            &*backend,
            AnalysisLimits::default(),
            &IncidentPolicy::default(),
            &ClassNameTable::default(),
        )
        .unwrap();

        assert!(verdict.accident);
        assert_eq!(verdict.confidence, 0.9);
        assert_eq!(verdict.severity, Severity::High);
        assert_eq!(verdict.accident_time, Some(0.0));
        assert_eq!(verdict.timeline_markers, vec![0.0]);
        assert_eq!(verdict.objects_involved, vec!["Car".to_string()]);
        assert_eq!(verdict.video_duration, 0.04);
        assert!(!verdict.truncated);
    }

    #[test]
    fn empty_video_end_to_end() {
        let mut source = source("stub://empty?frames=0");
        let backend = Arc::new(Mutex::new(StubBackend::new()));
        let verdict = analyze_video(
            &mut source,
            &*backend,
            AnalysisLimits::default(),
            &IncidentPolicy::default(),
            &ClassNameTable::default(),
        )
        .unwrap();

        assert!(!verdict.accident);
        assert_eq!(verdict.confidence, 0.0);
        assert_eq!(verdict.severity, Severity::None);
        assert_eq!(verdict.accident_time, None);
        assert!(verdict.objects_involved.is_empty());
        assert!(verdict.timeline_markers.is_empty());
        assert_eq!(verdict.video_duration, 0.0);
    }

    #[test]
    fn missing_fps_metadata_falls_back() {
        // 50 frames at the 25 fps fallback puts frame 25 at t=1.0.
        let mut source = source("stub://clip?frames=50&fps=0");
        let script: Vec<Vec<RawDetection>> = (0..50)
            .map(|frame| {
                if frame == 25 {
                    vec![detection(2, 0.5)]
                } else {
                    vec![]
                }
            })
            .collect();
        let backend = Arc::new(Mutex::new(StubBackend::with_script(script)));
        let verdict = analyze_video(
            &mut source,
            &*backend,
            AnalysisLimits::default(),
            &IncidentPolicy::default(),
            &ClassNameTable::default(),
        )
        .unwrap();

        assert_eq!(verdict.accident_time, Some(1.0));
        assert_eq!(verdict.video_duration, 2.0);
    }

    #[test]
    fn exact_budget_with_known_total_is_not_truncated() {
        let mut source = source("stub://clip?frames=120");
        let backend = Arc::new(Mutex::new(StubBackend::new()));
        let verdict = analyze_video(
            &mut source,
            &*backend,
            AnalysisLimits { max_frames: 120 },
            &IncidentPolicy::default(),
            &ClassNameTable::default(),
        )
        .unwrap();
        assert!(!verdict.truncated);
    }
}
