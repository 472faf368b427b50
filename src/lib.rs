//! crashwatch
//!
//! This crate turns a stream of per-frame object detections into a single
//! vehicular-incident verdict.
//!
//! # Architecture
//!
//! Two pipelines share one detection-to-record mapping rule:
//!
//! - **Batch**: frame source -> detector backend -> detection recorder ->
//!   incident aggregator. Produces an [`IncidentVerdict`] for a whole video.
//! - **Live**: one decoded frame -> detector backend -> single-frame
//!   classifier. Produces a [`FrameVerdict`] with no temporal context.
//!
//! The detector model and the video container format are external
//! collaborators: detection runs behind the [`DetectorBackend`] trait and
//! frame extraction behind [`FileSource`].
//!
//! # Module Structure
//!
//! - `detect`: detector backends (stub, tract) and the shared registry
//! - `ingest`: frame sources (local files, synthetic stub source)
//! - `record`: per-detection record mapping
//! - `verdict`: incident aggregation and single-frame classification
//! - `pipeline`: frame-budget controller driving the batch pipeline
//! - `api`: HTTP surface (health, upload-video, stream-detect)
//! - `config`: service configuration (file, env, validation)

pub mod api;
pub mod classes;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod record;
pub mod verdict;

pub use classes::{ClassNameTable, IncidentPolicy};
pub use detect::{BackendRegistry, DetectorBackend, RawDetection, SharedBackend, StubBackend};
pub use frame::{decode_image_bytes, RgbFrame};
pub use ingest::{FileConfig, FileSource};
pub use pipeline::{analyze_video, AnalysisLimits, DEFAULT_MAX_FRAMES};
pub use record::{record_detection, DetectionRecord};
pub use verdict::{aggregate_records, classify_frame, FrameVerdict, IncidentVerdict, Severity};
