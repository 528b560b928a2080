use std::path::{Path, PathBuf};

use anyhow::Result;
use heimdall_core::instance::InstanceRegistry;
use heimdall_core::tasks;
use serde::Serialize;

use crate::output;

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

#[derive(clap::Subcommand)]
pub enum InstanceSubcommand {
    /// List the configured instances
    List,

    /// Remove an instance: config, data directories and a worker/scheduler
    /// bounce so nothing keeps serving it
    Remove {
        name: String,

        /// Also delete the instance's log file
        #[arg(long)]
        purge_logs: bool,
    },

    /// Carry the serving data file over to a renamed instance's directory
    Rename { current: String, new: String },

    /// Upload the default synonyms file (first deployment only)
    SeedSynonyms {
        name: String,

        /// Local synonyms file to upload
        #[arg(long, default_value = "default_synonyms.txt")]
        file: PathBuf,
    },
}

#[derive(Serialize)]
struct InstanceRow<'a> {
    name: &'a str,
    excluded: bool,
    first_deploy: bool,
    data_file: &'a str,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(
    config_path: &Path,
    subcommand: InstanceSubcommand,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let config = super::load_config(config_path, dry_run)?;

    match subcommand {
        InstanceSubcommand::List => {
            let registry = InstanceRegistry::from_config(&config);
            if json {
                let rows: Vec<InstanceRow> = registry
                    .iter()
                    .map(|i| InstanceRow {
                        name: i.name(),
                        excluded: i.excluded,
                        first_deploy: i.first_deploy,
                        data_file: &i.data_file,
                    })
                    .collect();
                output::print_json(&rows)?;
            } else {
                let rows = registry
                    .iter()
                    .map(|i| {
                        vec![
                            i.name().to_string(),
                            if i.excluded { "yes" } else { "" }.to_string(),
                            if i.first_deploy { "yes" } else { "" }.to_string(),
                            i.data_file.clone(),
                        ]
                    })
                    .collect();
                output::print_table(&["NAME", "EXCLUDED", "FIRST DEPLOY", "DATA FILE"], rows);
            }
            Ok(())
        }

        InstanceSubcommand::Remove { name, purge_logs } => {
            let registry = InstanceRegistry::from_config(&config);
            registry.get(&name)?;
            let exec = super::executor(&config);
            super::runtime()?.block_on(tasks::remove_instance(
                exec.as_ref(),
                &config,
                &name,
                purge_logs,
            ))?;
            Ok(())
        }

        InstanceSubcommand::Rename { current, new } => {
            let registry = InstanceRegistry::from_config(&config);
            registry.get(&current)?;
            let exec = super::executor(&config);
            super::runtime()?.block_on(tasks::rename_instance(
                exec.as_ref(),
                &config,
                &current,
                &new,
            ))?;
            Ok(())
        }

        InstanceSubcommand::SeedSynonyms { name, file } => {
            let registry = InstanceRegistry::from_config(&config);
            let exec = super::executor(&config);
            super::runtime()?.block_on(tasks::seed_default_synonyms(
                exec.as_ref(),
                &config,
                &registry,
                &name,
                &file,
            ))?;
            Ok(())
        }
    }
}
