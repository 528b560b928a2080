use std::path::Path;

use anyhow::Result;
use heimdall_core::config::{FleetConfig, ROLE_SCHEDULER, ROLE_WORKER};
use heimdall_core::service::ServiceController;
use heimdall_core::types::{FailurePolicy, ServiceState, TargetState};
use serde::Serialize;

use crate::output;

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

#[derive(clap::Subcommand)]
pub enum ServiceSubcommand {
    /// Start the service and wait until every host reports it running
    Start,
    /// Stop the service, escalating to a forced kill when allowed
    Stop,
    /// Stop then start
    Restart,
    /// Report the service state across the role's hosts
    Status,
}

/// One service addressed as (role, name, stop window, escalation).
struct ServiceTarget<'a> {
    role: &'static str,
    service: &'a str,
    stop_wait_ms: u64,
    escalate: bool,
}

#[derive(Serialize)]
struct StatusReport<'a> {
    service: &'a str,
    state: ServiceState,
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

pub fn run_scheduler(
    config_path: &Path,
    subcommand: ServiceSubcommand,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let config = super::load_config(config_path, dry_run)?;
    let target = ServiceTarget {
        role: ROLE_SCHEDULER,
        service: &config.scheduler_service,
        stop_wait_ms: config.max_wait_ms,
        escalate: true,
    };
    dispatch(&config, target, subcommand, json)
}

pub fn run_worker(
    config_path: &Path,
    subcommand: ServiceSubcommand,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let config = super::load_config(config_path, dry_run)?;
    let target = ServiceTarget {
        role: ROLE_WORKER,
        service: &config.worker_service,
        // Workers drain in-flight jobs, so they get the longer window.
        stop_wait_ms: config.worker_stop_wait_ms,
        escalate: config.kill_ghost_workers,
    };
    dispatch(&config, target, subcommand, json)
}

fn dispatch(
    config: &FleetConfig,
    target: ServiceTarget<'_>,
    subcommand: ServiceSubcommand,
    json: bool,
) -> Result<()> {
    let exec = super::executor(config);
    let ctl = ServiceController::new(exec.as_ref(), config.dry_run);
    let rt = super::runtime()?;

    match subcommand {
        ServiceSubcommand::Start => rt.block_on(start(config, &ctl, &target)),
        ServiceSubcommand::Stop => rt.block_on(stop(config, &ctl, &target)),
        ServiceSubcommand::Restart => rt.block_on(async {
            stop(config, &ctl, &target).await?;
            start(config, &ctl, &target).await
        }),
        ServiceSubcommand::Status => {
            let state = rt.block_on(ctl.status(target.role, target.service))?;
            if json {
                output::print_json(&StatusReport {
                    service: target.service,
                    state,
                })?;
            } else {
                println!("{}: {state}", target.service);
            }
            Ok(())
        }
    }
}

async fn start(
    config: &FleetConfig,
    ctl: &ServiceController<'_>,
    target: &ServiceTarget<'_>,
) -> Result<()> {
    ctl.set_state(
        target.role,
        target.service,
        TargetState::Running,
        config.max_wait_ms,
        config.poll_interval_ms,
        FailurePolicy::Raise,
    )
    .await?;
    Ok(())
}

async fn stop(
    config: &FleetConfig,
    ctl: &ServiceController<'_>,
    target: &ServiceTarget<'_>,
) -> Result<()> {
    ctl.stop_with_escalation(
        target.role,
        target.service,
        target.stop_wait_ms,
        config.poll_interval_ms,
        target.escalate,
    )
    .await?;
    Ok(())
}
