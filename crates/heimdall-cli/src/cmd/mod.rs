use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use heimdall_core::config::FleetConfig;
use remote_exec::SshExecutor;

pub mod backup;
pub mod check;
pub mod config;
pub mod instance;
pub mod rebinarize;
pub mod service;

/// Load the fleet config, letting the `--dry-run` flag override the file.
pub(crate) fn load_config(path: &Path, dry_run: bool) -> Result<FleetConfig> {
    let mut config = FleetConfig::load(path)
        .with_context(|| format!("failed to load fleet config {}", path.display()))?;
    if dry_run {
        config.dry_run = true;
    }
    Ok(config)
}

pub(crate) fn executor(config: &FleetConfig) -> Arc<SshExecutor> {
    Arc::new(SshExecutor::new(config.roles.clone()))
}

// Commands are sync entry points; each builds its own runtime and blocks on
// the core async calls.
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("failed to create async runtime")
}
