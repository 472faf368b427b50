use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use super::backend::DetectorBackend;
use super::backends::StubBackend;
use crate::config::ServiceConfig;

/// A backend shared across request handlers.
///
/// The reference model is a single instance serving all requests, so every
/// caller must serialize at this mutex before running inference.
pub type SharedBackend = Arc<Mutex<dyn DetectorBackend>>;

/// Thread-safe registry of detector backends.
///
/// Backends are wrapped in `Mutex` because `DetectorBackend::detect` takes
/// `&mut self`.
pub struct BackendRegistry {
    backends: HashMap<String, SharedBackend>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
    }

    /// Build the registry a binary needs for the configured backend.
    ///
    /// Fails fast when the tract backend is selected and its model artifact
    /// is missing, naming the expected path.
    pub fn from_config(cfg: &ServiceConfig) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(StubBackend::new());

        if cfg.backend == "tract" {
            if !cfg.model_path.exists() {
                return Err(anyhow!(
                    "detector model not found at '{}'; download the ONNX model and place it there, \
                     or set CRASHWATCH_MODEL_PATH",
                    cfg.model_path.display()
                ));
            }
            #[cfg(feature = "backend-tract")]
            {
                registry.register(super::backends::TractBackend::new(
                    &cfg.model_path,
                    cfg.model_input_width,
                    cfg.model_input_height,
                )?);
            }
            #[cfg(not(feature = "backend-tract"))]
            {
                return Err(anyhow!(
                    "backend 'tract' requires building with the backend-tract feature"
                ));
            }
        }

        registry.set_default(&cfg.backend)?;
        registry.warm_default()?;
        Ok(registry)
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: DetectorBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, Arc::new(Mutex::new(backend)));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    /// Get backend by name.
    pub fn get(&self, name: &str) -> Option<SharedBackend> {
        self.backends.get(name).cloned()
    }

    /// Get default backend.
    pub fn default_backend(&self) -> Option<SharedBackend> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    /// List registered backends.
    pub fn list(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }

    /// Run the default backend's warm-up hook so the first request does not
    /// pay model initialization latency.
    pub fn warm_default(&self) -> Result<()> {
        let backend = self
            .default_backend()
            .ok_or_else(|| anyhow!("no detector backend registered"))?;
        let mut guard = backend
            .lock()
            .map_err(|_| anyhow!("backend lock poisoned"))?;
        log::debug!("warming detector backend '{}'", guard.name());
        guard.warm_up()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
