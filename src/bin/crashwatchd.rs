//! crashwatchd - incident detection service
//!
//! This daemon:
//! 1. Loads the service configuration and class/policy tables
//! 2. Builds the detector backend (fail-fast on a missing model artifact)
//! 3. Serves the detection API until Ctrl-C

use std::sync::mpsc;

use anyhow::{anyhow, Result};

use crashwatch::api::{ApiConfig, ApiServer, ServerContext};
use crashwatch::config::ServiceConfig;
use crashwatch::{AnalysisLimits, BackendRegistry, ClassNameTable, IncidentPolicy};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServiceConfig::load()?;
    let registry = BackendRegistry::from_config(&config)?;
    let backend = registry
        .default_backend()
        .ok_or_else(|| anyhow!("no detector backend registered"))?;

    let ctx = ServerContext {
        backend,
        policy: IncidentPolicy::default(),
        classes: ClassNameTable::default(),
        limits: AnalysisLimits {
            max_frames: config.max_frames,
        },
    };

    let api_config = ApiConfig {
        addr: config.api_addr.clone(),
    };
    let api_handle = ApiServer::new(api_config, ctx).spawn()?;
    log::info!(
        "detection api listening on {} (backend: {})",
        api_handle.addr,
        config.backend
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("crashwatchd waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping API server...");
    api_handle.stop()?;

    Ok(())
}
