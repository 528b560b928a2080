use std::path::Path;

use anyhow::Result;

use crate::output;

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

#[derive(clap::Subcommand)]
pub enum ConfigSubcommand {
    /// Parse and validate the fleet config, printing nothing on success
    Validate,
    /// Print the effective config with all defaults applied
    Show,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(config_path: &Path, subcommand: ConfigSubcommand, json: bool) -> Result<()> {
    let config = super::load_config(config_path, false)?;

    match subcommand {
        ConfigSubcommand::Validate => {
            println!(
                "{}: ok ({} instances, {} roles)",
                config_path.display(),
                config.instances.len(),
                config.roles.len()
            );
            Ok(())
        }
        ConfigSubcommand::Show => {
            if json {
                output::print_json(&config)?;
            } else {
                print!("{}", serde_yaml::to_string(&config)?);
            }
            Ok(())
        }
    }
}
