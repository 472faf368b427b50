use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use serde::Deserialize;

const DEFAULT_API_ADDR: &str = "127.0.0.1:5000";
const DEFAULT_BACKEND: &str = "stub";
const DEFAULT_MODEL_PATH: &str = "models/yolov8n.onnx";
const DEFAULT_MODEL_WIDTH: u32 = 640;
const DEFAULT_MODEL_HEIGHT: u32 = 640;

#[derive(Debug, Deserialize, Default)]
struct ServiceConfigFile {
    api_addr: Option<String>,
    backend: Option<String>,
    model: Option<ModelConfigFile>,
    max_frames: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
}

/// Service configuration, layered: optional JSON file named by
/// `CRASHWATCH_CONFIG`, then environment overrides, then validation.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub api_addr: String,
    /// Detector backend name ("stub" or "tract").
    pub backend: String,
    pub model_path: PathBuf,
    pub model_input_width: u32,
    pub model_input_height: u32,
    pub max_frames: u32,
}

impl ServiceConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CRASHWATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => read_config_file(Path::new(path))?,
            None => ServiceConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ServiceConfigFile) -> Self {
        Self {
            api_addr: file.api_addr.unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
            backend: file.backend.unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            model_path: file
                .model
                .as_ref()
                .and_then(|model| model.path.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            model_input_width: file
                .model
                .as_ref()
                .and_then(|model| model.input_width)
                .unwrap_or(DEFAULT_MODEL_WIDTH),
            model_input_height: file
                .model
                .and_then(|model| model.input_height)
                .unwrap_or(DEFAULT_MODEL_HEIGHT),
            max_frames: file.max_frames.unwrap_or(crate::DEFAULT_MAX_FRAMES),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("CRASHWATCH_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr;
            }
        }
        if let Ok(backend) = std::env::var("CRASHWATCH_BACKEND") {
            if !backend.trim().is_empty() {
                self.backend = backend;
            }
        }
        if let Ok(path) = std::env::var("CRASHWATCH_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.model_path = PathBuf::from(path);
            }
        }
        if let Ok(max_frames) = std::env::var("CRASHWATCH_MAX_FRAMES") {
            self.max_frames = max_frames
                .parse()
                .map_err(|_| anyhow!("CRASHWATCH_MAX_FRAMES must be an integer"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.max_frames == 0 {
            return Err(anyhow!("max_frames must be greater than zero"));
        }
        if self.backend != "stub" && self.backend != "tract" {
            return Err(anyhow!(
                "unknown backend '{}' (expected 'stub' or 'tract')",
                self.backend
            ));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ServiceConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied() {
        let cfg = ServiceConfig::from_file(ServiceConfigFile::default());
        assert_eq!(cfg.api_addr, DEFAULT_API_ADDR);
        assert_eq!(cfg.backend, "stub");
        assert_eq!(cfg.max_frames, crate::DEFAULT_MAX_FRAMES);
        cfg.validate().unwrap();
    }

    #[test]
    fn zero_max_frames_is_rejected() {
        let mut cfg = ServiceConfig::from_file(ServiceConfigFile::default());
        cfg.max_frames = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let mut cfg = ServiceConfig::from_file(ServiceConfigFile::default());
        cfg.backend = "onnxruntime".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn file_values_override_defaults() {
        let file: ServiceConfigFile = serde_json::from_str(
            r#"{"api_addr":"0.0.0.0:8080","max_frames":60,"model":{"path":"m.onnx"}}"#,
        )
        .unwrap();
        let cfg = ServiceConfig::from_file(file);
        assert_eq!(cfg.api_addr, "0.0.0.0:8080");
        assert_eq!(cfg.max_frames, 60);
        assert_eq!(cfg.model_path, PathBuf::from("m.onnx"));
        assert_eq!(cfg.model_input_width, DEFAULT_MODEL_WIDTH);
    }
}
