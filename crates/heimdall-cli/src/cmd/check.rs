use std::path::Path;

use anyhow::{bail, Result};
use heimdall_core::tasks::{self, DatasetStatus};

use crate::output;

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

#[derive(clap::Subcommand)]
pub enum CheckSubcommand {
    /// Verify every instance's last imported dataset still exists on disk
    Datasets,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(
    config_path: &Path,
    subcommand: CheckSubcommand,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let CheckSubcommand::Datasets = subcommand;
    let config = super::load_config(config_path, dry_run)?;
    let exec = super::executor(&config);

    let checks = super::runtime()?.block_on(tasks::check_datasets(exec.as_ref(), &config))?;

    if json {
        output::print_json(&checks)?;
    } else {
        let rows = checks
            .iter()
            .map(|c| {
                let (status, path) = match &c.status {
                    DatasetStatus::Ok { path } => ("ok", path.as_str()),
                    DatasetStatus::Missing { path } => ("missing", path.as_str()),
                    DatasetStatus::NoJob => ("no job", ""),
                    DatasetStatus::Excluded => ("excluded", ""),
                };
                vec![c.instance.clone(), status.to_string(), path.to_string()]
            })
            .collect();
        output::print_table(&["INSTANCE", "DATASET", "PATH"], rows);
    }

    let missing = checks
        .iter()
        .filter(|c| matches!(c.status, DatasetStatus::Missing { .. }))
        .count();
    if missing > 0 {
        bail!("{missing} instance(s) have a vanished dataset file");
    }
    Ok(())
}
