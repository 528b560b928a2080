use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};
use heimdall_core::orchestrator::BinarizationOrchestrator;
use heimdall_core::types::{InstanceOutcome, RunSummary};

use crate::output;

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(
    config_path: &Path,
    instance: Option<&str>,
    pool_size: Option<usize>,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let mut config = super::load_config(config_path, dry_run)?;
    if let Some(pool_size) = pool_size {
        if pool_size < 1 {
            bail!("--pool-size must be >= 1");
        }
        config.pool_size = pool_size;
    }

    let exec = super::executor(&config);
    let orchestrator = BinarizationOrchestrator::new(exec, Arc::new(config));
    let rt = super::runtime()?;

    match instance {
        Some(name) => {
            rt.block_on(orchestrator.rebinarize_instance(name))?;
            Ok(())
        }
        None => {
            let summary = rt.block_on(orchestrator.rebinarize_fleet())?;
            report(&summary, json)
        }
    }
}

/// Per-instance failures are isolated and already logged by the run; they
/// show up in the printed summary but do not fail the command. Only a stuck
/// or unresumable scheduler exits nonzero, and that propagates as an error
/// from the run itself.
fn report(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        output::print_json(summary)?;
    } else {
        let rows = summary
            .results
            .iter()
            .map(|(name, outcome)| {
                let (status, detail) = describe(outcome);
                vec![name.clone(), status.to_string(), detail]
            })
            .collect();
        output::print_table(&["INSTANCE", "STATUS", "DETAIL"], rows);
    }
    Ok(())
}

fn describe(outcome: &InstanceOutcome) -> (&'static str, String) {
    match outcome {
        InstanceOutcome::Binarized { elapsed } => {
            ("binarized", format!("{:.1}s", elapsed.as_secs_f64()))
        }
        InstanceOutcome::Skipped => ("skipped", String::new()),
        InstanceOutcome::Failed { phase, reason } => {
            ("failed", format!("{}: {reason}", phase.as_str()))
        }
    }
}
