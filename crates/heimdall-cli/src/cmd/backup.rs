use std::path::Path;

use anyhow::Result;
use heimdall_core::instance::{ExclusionSet, InstanceRegistry};
use heimdall_core::tasks;

// ---------------------------------------------------------------------------
// Backup / rollback
// ---------------------------------------------------------------------------

pub fn backup(config_path: &Path, instance: &str, dry_run: bool) -> Result<()> {
    let config = super::load_config(config_path, dry_run)?;
    InstanceRegistry::from_config(&config).get(instance)?;

    let exec = super::executor(&config);
    // Auto-exclusions only matter within a rebinarization run; here the
    // warning in the log is the signal.
    let mut exclusions = ExclusionSet::default();
    super::runtime()?.block_on(tasks::backup_data(
        exec.as_ref(),
        &config,
        instance,
        &mut exclusions,
    ))?;
    Ok(())
}

pub fn rollback(config_path: &Path, instance: &str, dry_run: bool) -> Result<()> {
    let config = super::load_config(config_path, dry_run)?;
    InstanceRegistry::from_config(&config).get(instance)?;

    let exec = super::executor(&config);
    super::runtime()?.block_on(tasks::rollback_data(exec.as_ref(), &config, instance))?;
    Ok(())
}
