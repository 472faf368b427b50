//! analyze - offline batch analysis of a local video file
//!
//! Runs the same pipeline as `/upload-video` without the HTTP surface and
//! prints the incident verdict as JSON on stdout.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Parser;

use crashwatch::config::ServiceConfig;
use crashwatch::{
    analyze_video, AnalysisLimits, BackendRegistry, ClassNameTable, FileConfig, FileSource,
    IncidentPolicy, DEFAULT_MAX_FRAMES,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to a local video file (or a stub:// URI).
    video: String,
    /// Detector backend to run ("stub" or "tract").
    #[arg(long, default_value = "stub", env = "CRASHWATCH_BACKEND")]
    backend: String,
    /// Path to the detector model artifact (tract backend only).
    #[arg(long, default_value = "models/yolov8n.onnx", env = "CRASHWATCH_MODEL_PATH")]
    model_path: PathBuf,
    /// Maximum leading frames to process.
    #[arg(long, default_value_t = DEFAULT_MAX_FRAMES)]
    max_frames: u32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let config = ServiceConfig {
        backend: args.backend,
        model_path: args.model_path,
        max_frames: args.max_frames,
        ..ServiceConfig::load()?
    };
    let registry = BackendRegistry::from_config(&config)?;
    let backend = registry
        .default_backend()
        .ok_or_else(|| anyhow!("no detector backend registered"))?;

    let mut source = FileSource::open(FileConfig { path: args.video })?;
    let verdict = analyze_video(
        &mut source,
        &backend,
        AnalysisLimits {
            max_frames: config.max_frames,
        },
        &IncidentPolicy::default(),
        &ClassNameTable::default(),
    )?;

    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}
