//! Incident aggregation and single-frame classification.
//!
//! Both operations share the same relevance filter and max-confidence rule:
//! the verdict confidence is always the maximum over qualifying detections,
//! never an average, so a single high-confidence hit is not diluted by many
//! weak ones. The batch fold uses only associative reductions (max, min,
//! set union), so detection order within a request cannot change the
//! verdict.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::classes::{ClassNameTable, IncidentPolicy};
use crate::detect::RawDetection;
use crate::record::{round3, round4, DetectionRecord};

/// Severity tier derived solely from peak confidence among relevant
/// detections. Tiers close at their lower bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
}

impl Severity {
    /// Deterministic step function of peak confidence.
    pub fn from_confidence(confidence: f32, policy: &IncidentPolicy) -> Self {
        if confidence >= policy.high_threshold {
            Severity::High
        } else if confidence >= policy.medium_threshold {
            Severity::Medium
        } else if confidence > 0.0 {
            Severity::Low
        } else {
            Severity::None
        }
    }
}

/// Aggregate result for a full processed video.
#[derive(Clone, Debug, Serialize)]
pub struct IncidentVerdict {
    pub accident: bool,
    /// Peak confidence among incident-relevant detections, 4-decimal
    /// rounded. Exactly 0.0 when no incident was found.
    pub confidence: f64,
    /// Every detection record for the processed window, all classes.
    pub boxes: Vec<DetectionRecord>,
    /// Seconds, 3-decimal rounded; 0.0 when the frame count is unknown.
    pub video_duration: f64,
    /// Earliest relevant-detection timestamp. `null` when no incident;
    /// a 0.0 here is a legitimate first-frame hit.
    pub accident_time: Option<f64>,
    pub accident_type: String,
    /// Sorted distinct labels for ALL labeled detections.
    pub objects_involved: Vec<String>,
    pub severity: Severity,
    /// Sorted distinct timestamps of relevant detections only.
    pub timeline_markers: Vec<f64>,
    /// True when the frame budget cut analysis short of the full video.
    pub truncated: bool,
}

/// Reduced verdict for single-frame (stream) mode.
#[derive(Clone, Debug, Serialize)]
pub struct FrameVerdict {
    pub accident: bool,
    pub confidence: f64,
    pub boxes: Vec<RawDetection>,
}

/// Fold the ordered record list for a whole video into an incident verdict.
///
/// `total_frames == 0` means the container did not report a frame count.
/// An empty record list is a valid, common case and yields the
/// all-`None`/0.0 verdict.
pub fn aggregate_records(
    records: Vec<DetectionRecord>,
    total_frames: u64,
    frame_rate: f64,
    truncated: bool,
    policy: &IncidentPolicy,
    classes: &ClassNameTable,
) -> IncidentVerdict {
    let mut peak_confidence = 0.0f32;
    let mut first_time: Option<f64> = None;
    // Keyed by rounded milliseconds so float identity is exact.
    let mut marker_millis: BTreeSet<i64> = BTreeSet::new();
    let mut labels: BTreeSet<&str> = BTreeSet::new();
    let mut relevant_count = 0usize;

    for record in &records {
        if let Some(label) = classes.label(record.class_id) {
            labels.insert(label);
        }
        if !policy.is_relevant(record.class_id) {
            continue;
        }
        relevant_count += 1;
        peak_confidence = peak_confidence.max(record.confidence);
        first_time = Some(match first_time {
            Some(existing) => existing.min(record.timestamp),
            None => record.timestamp,
        });
        marker_millis.insert((record.timestamp * 1000.0).round() as i64);
    }

    let accident = relevant_count > 0;
    let confidence = if accident {
        round4(peak_confidence as f64)
    } else {
        0.0
    };
    let accident_type = if accident {
        policy.incident_label.clone()
    } else {
        "None".to_string()
    };
    let video_duration = if total_frames > 0 {
        round3(total_frames as f64 / frame_rate)
    } else {
        0.0
    };

    IncidentVerdict {
        accident,
        confidence,
        boxes: records,
        video_duration,
        accident_time: first_time.map(round3),
        accident_type,
        objects_involved: labels.into_iter().map(str::to_string).collect(),
        severity: Severity::from_confidence(if accident { peak_confidence } else { 0.0 }, policy),
        timeline_markers: marker_millis
            .into_iter()
            .map(|ms| ms as f64 / 1000.0)
            .collect(),
        truncated,
    }
}

/// Classify a single frame's detections without temporal aggregation.
pub fn classify_frame(detections: Vec<RawDetection>, policy: &IncidentPolicy) -> FrameVerdict {
    let peak_confidence = detections
        .iter()
        .filter(|det| policy.is_relevant(det.class_id))
        .map(|det| det.confidence)
        .fold(None, |acc: Option<f32>, conf| {
            Some(acc.map_or(conf, |best| best.max(conf)))
        });

    FrameVerdict {
        accident: peak_confidence.is_some(),
        confidence: peak_confidence.map_or(0.0, |conf| round4(conf as f64)),
        boxes: detections,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::record_detection;
    use crate::RawDetection;

    fn detection(class_id: u32, confidence: f32) -> RawDetection {
        RawDetection {
            x1: 0.0,
            y1: 0.0,
            x2: 10.0,
            y2: 10.0,
            confidence,
            class_id,
        }
    }

    fn records(rows: &[(u32, u32, f32)]) -> Vec<DetectionRecord> {
        rows
            .iter()
            .map(|&(frame, class_id, confidence)| {
                record_detection(&detection(class_id, confidence), frame, 25.0)
            })
            .collect()
    }

    fn aggregate(records: Vec<DetectionRecord>, total_frames: u64) -> IncidentVerdict {
        aggregate_records(
            records,
            total_frames,
            25.0,
            false,
            &IncidentPolicy::default(),
            &ClassNameTable::default(),
        )
    }

    #[test]
    fn empty_video_yields_null_verdict() {
        let verdict = aggregate(Vec::new(), 0);
        assert!(!verdict.accident);
        assert_eq!(verdict.confidence, 0.0);
        assert_eq!(verdict.severity, Severity::None);
        assert_eq!(verdict.accident_time, None);
        assert_eq!(verdict.accident_type, "None");
        assert!(verdict.objects_involved.is_empty());
        assert!(verdict.timeline_markers.is_empty());
        assert_eq!(verdict.video_duration, 0.0);
    }

    #[test]
    fn confidence_is_maximum_not_average() {
        let verdict = aggregate(records(&[(0, 2, 0.3), (1, 2, 0.9), (2, 2, 0.3)]), 3);
        assert_eq!(verdict.confidence, 0.9);
    }

    #[test]
    fn severity_boundaries() {
        let policy = IncidentPolicy::default();
        assert_eq!(Severity::from_confidence(0.85, &policy), Severity::High);
        assert_eq!(Severity::from_confidence(0.6, &policy), Severity::Medium);
        assert_eq!(Severity::from_confidence(0.599999, &policy), Severity::Low);
        assert_eq!(Severity::from_confidence(0.0, &policy), Severity::None);
    }

    #[test]
    fn accident_time_zero_is_a_first_frame_hit() {
        let verdict = aggregate(records(&[(0, 2, 0.9)]), 1);
        assert!(verdict.accident);
        assert_eq!(verdict.accident_time, Some(0.0));
        assert_eq!(verdict.severity, Severity::High);
        assert_eq!(verdict.timeline_markers, vec![0.0]);
        assert_eq!(verdict.objects_involved, vec!["Car".to_string()]);
    }

    #[test]
    fn timeline_markers_sorted_distinct_relevant_only() {
        // Two hits on frame 50, one on frame 0, and an irrelevant truck.
        let verdict = aggregate(
            records(&[(50, 2, 0.4), (50, 0, 0.5), (0, 2, 0.3), (10, 7, 0.9)]),
            100,
        );
        assert_eq!(verdict.timeline_markers, vec![0.0, 2.0]);
        // Truck confidence must not leak into the incident confidence.
        assert_eq!(verdict.confidence, 0.5);
        assert_eq!(verdict.accident_time, Some(0.0));
    }

    #[test]
    fn objects_involved_covers_all_labeled_detections() {
        let verdict = aggregate(records(&[(0, 2, 0.4), (1, 7, 0.8), (2, 42, 0.9)]), 3);
        // Truck is not incident-relevant but is labeled; class 42 is unlabeled.
        assert_eq!(
            verdict.objects_involved,
            vec!["Car".to_string(), "Truck".to_string()]
        );
        assert!(verdict.accident);
    }

    #[test]
    fn accident_requires_a_relevant_class() {
        let verdict = aggregate(records(&[(0, 7, 0.99), (1, 5, 0.8)]), 2);
        assert!(!verdict.accident);
        assert_eq!(verdict.confidence, 0.0);
        assert_eq!(verdict.severity, Severity::None);
        assert_eq!(verdict.accident_time, None);
        assert!(verdict.timeline_markers.is_empty());
        // The boxes list still carries every detection.
        assert_eq!(verdict.boxes.len(), 2);
    }

    #[test]
    fn video_duration_uses_total_frames() {
        let verdict = aggregate(Vec::new(), 50);
        assert_eq!(verdict.video_duration, 2.0);
    }

    #[test]
    fn verdict_serializes_null_accident_time() {
        let verdict = aggregate(Vec::new(), 0);
        let json = serde_json::to_value(&verdict).unwrap();
        assert!(json["accident_time"].is_null());
        assert_eq!(json["severity"], "None");
        assert_eq!(json["truncated"], false);
    }

    #[test]
    fn classify_frame_filters_relevance() {
        let verdict = classify_frame(
            vec![detection(7, 0.95), detection(2, 0.4), detection(0, 0.6)],
            &IncidentPolicy::default(),
        );
        assert!(verdict.accident);
        assert_eq!(verdict.confidence, 0.6);
        assert_eq!(verdict.boxes.len(), 3);
    }

    #[test]
    fn classify_frame_without_relevant_detections() {
        let verdict = classify_frame(vec![detection(7, 0.95)], &IncidentPolicy::default());
        assert!(!verdict.accident);
        assert_eq!(verdict.confidence, 0.0);
        let json = serde_json::to_value(&verdict).unwrap();
        assert!(json["boxes"][0].get("timestamp").is_none());
        assert!(json["boxes"][0].get("frame").is_none());
    }
}
