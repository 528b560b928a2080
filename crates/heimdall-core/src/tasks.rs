//! Operational tasks outside the rebinarization run: data file backup and
//! rollback, instance administration, and dataset bookkeeping checks.

use std::path::Path;

use remote_exec::RemoteExecutor;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{FleetConfig, DATA_FILE_NAME, ROLE_DB, ROLE_SCHEDULER, ROLE_WORKER};
use crate::error::{HeimdallError, Result};
use crate::instance::{ExclusionSet, InstanceRegistry};
use crate::service::ServiceController;
use crate::shell::{path_exists, run_mutating};
use crate::types::{FailurePolicy, TargetState};

// ---------------------------------------------------------------------------
// Backup / rollback
// ---------------------------------------------------------------------------

/// Copy the instance's serving data file to `<file>_<name>` and verify the
/// copy by checksum.
///
/// An instance without a data file is not an error: it is warned about and
/// added to the auto-exclusion set so a following rebinarization skips it.
pub async fn backup_data(
    exec: &dyn RemoteExecutor,
    config: &FleetConfig,
    name: &str,
    exclusions: &mut ExclusionSet,
) -> Result<()> {
    let data = config.data_file(name);
    let backup = format!("{data}_{name}");

    if config.dry_run {
        println!("DRY-RUN: {}", copy_command(config, &data, &backup));
        return Ok(());
    }

    if !path_exists(exec, ROLE_WORKER, &data, false).await? {
        warn!(instance = name, "no {DATA_FILE_NAME} found, adding to the auto-exclusion list");
        exclusions.insert(name);
        return Ok(());
    }

    exec.run(ROLE_WORKER, &copy_command(config, &data, &backup))
        .await?;
    verify_copy(exec, &data, &backup).await
}

/// Restore the backup made by [`backup_data`]. A missing backup is an error.
pub async fn rollback_data(
    exec: &dyn RemoteExecutor,
    config: &FleetConfig,
    name: &str,
) -> Result<()> {
    let data = config.data_file(name);
    let backup = format!("{data}_{name}");

    if config.dry_run {
        println!("DRY-RUN: {}", copy_command(config, &backup, &data));
        return Ok(());
    }

    if !path_exists(exec, ROLE_WORKER, &backup, false).await? {
        return Err(HeimdallError::DataMissing(name.to_string()));
    }

    exec.run(ROLE_WORKER, &copy_command(config, &backup, &data))
        .await?;
    verify_copy(exec, &data, &backup).await
}

fn copy_command(config: &FleetConfig, from: &str, to: &str) -> String {
    if config.standalone {
        format!("cp --archive {from} {to}")
    } else {
        // NFSv4 ACLs: don't preserve permissions, inheritance does the work.
        format!("cp {from} {to}")
    }
}

async fn verify_copy(exec: &dyn RemoteExecutor, original: &str, copy: &str) -> Result<()> {
    let md5_copy = checksum(exec, copy).await?;
    let md5_original = checksum(exec, original).await?;
    if md5_original != md5_copy {
        return Err(HeimdallError::ChecksumMismatch {
            original: original.to_string(),
            copy: copy.to_string(),
        });
    }
    info!(path = original, "copy verified");
    Ok(())
}

async fn checksum(exec: &dyn RemoteExecutor, path: &str) -> Result<String> {
    let output = exec
        .run(ROLE_WORKER, &format!("md5sum {path} | awk '{{print $1}}'"))
        .await?;
    Ok(output.line().to_string())
}

// ---------------------------------------------------------------------------
// Instance administration
// ---------------------------------------------------------------------------

/// Remove an instance entirely: its ini file, its directories, optionally
/// its logs, then bounce the workers and the scheduler so nothing keeps
/// serving the dead tenant.
pub async fn remove_instance(
    exec: &dyn RemoteExecutor,
    config: &FleetConfig,
    name: &str,
    purge_logs: bool,
) -> Result<()> {
    let dry = config.dry_run;
    run_mutating(
        exec,
        dry,
        ROLE_WORKER,
        &format!("rm --force {}/{}.ini", config.instances_dir, name),
    )
    .await?;

    let ctl = ServiceController::new(exec, dry);
    ctl.stop_with_escalation(
        ROLE_WORKER,
        &config.worker_service,
        config.worker_stop_wait_ms,
        config.poll_interval_ms,
        config.kill_ghost_workers,
    )
    .await?;
    ctl.set_state(
        ROLE_WORKER,
        &config.worker_service,
        TargetState::Running,
        config.max_wait_ms,
        config.poll_interval_ms,
        FailurePolicy::Raise,
    )
    .await?;
    ctl.stop_with_escalation(
        ROLE_SCHEDULER,
        &config.scheduler_service,
        config.max_wait_ms,
        config.poll_interval_ms,
        true,
    )
    .await?;
    ctl.set_state(
        ROLE_SCHEDULER,
        &config.scheduler_service,
        TargetState::Running,
        config.max_wait_ms,
        config.poll_interval_ms,
        FailurePolicy::Raise,
    )
    .await?;

    if purge_logs {
        run_mutating(
            exec,
            dry,
            ROLE_WORKER,
            &format!("rm --force {}/{}.log", config.log_dir, name),
        )
        .await?;
    }

    for dir in [
        config.ed_dir(name),
        format!("{}/{}", config.destination_dir, name),
        format!("{}/{}", config.backup_dir, name),
    ] {
        run_mutating(exec, dry, ROLE_WORKER, &format!("rm -rf {dir}")).await?;
    }
    info!(instance = name, "instance removed");
    Ok(())
}

/// Prepare a renamed instance by carrying the serving data file over to the
/// new ed directory.
pub async fn rename_instance(
    exec: &dyn RemoteExecutor,
    config: &FleetConfig,
    current: &str,
    new: &str,
) -> Result<()> {
    let dry = config.dry_run;
    run_mutating(
        exec,
        dry,
        ROLE_WORKER,
        &format!("mkdir --parents {}", config.ed_dir(new)),
    )
    .await?;
    run_mutating(
        exec,
        dry,
        ROLE_WORKER,
        &format!(
            "cp {}/{}/{} {}/",
            config.ed_basedir,
            current,
            DATA_FILE_NAME,
            config.ed_dir(new)
        ),
    )
    .await?;
    Ok(())
}

/// Upload the default synonyms file into the instance's source dir.
/// First deployment only; a no-op for every later run.
pub async fn seed_default_synonyms(
    exec: &dyn RemoteExecutor,
    config: &FleetConfig,
    registry: &InstanceRegistry,
    name: &str,
    synonyms_file: &Path,
) -> Result<()> {
    let instance = registry.get(name)?;
    if !instance.first_deploy {
        debug!(instance = name, "not a first deploy, synonyms left alone");
        return Ok(());
    }

    let remote = format!("{}/default_synonyms.txt", instance.source_dir);
    if config.dry_run {
        println!("DRY-RUN: put {} {remote}", synonyms_file.display());
        return Ok(());
    }
    info!(instance = name, "copying default synonyms");
    exec.put(ROLE_WORKER, synonyms_file, &remote).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Dataset bookkeeping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DatasetStatus {
    /// Last dataset recorded in the jobs table and present on disk.
    Ok { path: String },
    /// Recorded but the file is gone — binarization cannot re-run from it.
    Missing { path: String },
    /// The instance has no completed import job.
    NoJob,
    Excluded,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetCheck {
    pub instance: String,
    #[serde(flatten)]
    pub status: DatasetStatus,
}

/// Resolve the dataset used by the instance's last completed import job,
/// via single-line SQL lookups on the db role.
pub async fn last_dataset(
    exec: &dyn RemoteExecutor,
    config: &FleetConfig,
    name: &str,
) -> Result<Option<String>> {
    let instance_id = query_one(
        exec,
        config,
        &format!("SELECT id FROM instance WHERE name='{name}'"),
    )
    .await?;
    let Some(instance_id) = instance_id else {
        return Ok(None);
    };

    let job_id = query_one(
        exec,
        config,
        &format!(
            "SELECT id FROM job WHERE instance_id={instance_id} AND state='done' \
             ORDER BY id DESC LIMIT 1"
        ),
    )
    .await?;
    let Some(job_id) = job_id else {
        return Ok(None);
    };

    query_one(
        exec,
        config,
        &format!("SELECT name FROM data_set WHERE job_id={job_id} ORDER BY id DESC LIMIT 1"),
    )
    .await
}

async fn query_one(
    exec: &dyn RemoteExecutor,
    config: &FleetConfig,
    sql: &str,
) -> Result<Option<String>> {
    let command = format!(
        "su - postgres -c \"psql {} --quiet --tuples-only -c \\\"{sql}\\\"\"",
        config.database
    );
    let output = exec.run(ROLE_DB, &command).await?;
    let value = output.line();
    Ok(if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    })
}

/// Verify that every instance's last imported dataset still exists, so a
/// rebinarization run can actually replay it.
pub async fn check_datasets(
    exec: &dyn RemoteExecutor,
    config: &FleetConfig,
) -> Result<Vec<DatasetCheck>> {
    let registry = InstanceRegistry::from_config(config);
    let mut checks = Vec::with_capacity(registry.len());

    for instance in registry.iter() {
        let name = instance.name().to_string();
        if instance.excluded {
            info!(instance = %name, "NOTICE: instance is excluded, skipping check");
            checks.push(DatasetCheck {
                instance: name,
                status: DatasetStatus::Excluded,
            });
            continue;
        }

        let status = match last_dataset(exec, config, &name).await? {
            None => {
                warn!(
                    instance = %name,
                    "has a {DATA_FILE_NAME} but no completed import job"
                );
                DatasetStatus::NoJob
            }
            Some(path) => {
                if path_exists(exec, ROLE_WORKER, &path, false).await? {
                    info!(instance = %name, path, "dataset present");
                    DatasetStatus::Ok { path }
                } else {
                    warn!(instance = %name, path, "CRITICAL: dataset file is gone");
                    DatasetStatus::Missing { path }
                }
            }
        };
        checks.push(DatasetCheck {
            instance: name,
            status,
        });
    }
    Ok(checks)
}
