//! Fleet-wide rebinarization.
//!
//! One run brackets a parallel per-instance pipeline between a quiesce and a
//! resume of the fleet scheduler: stop the beat so the recurring binarization
//! job cannot race the manual run, upgrade + rebinarize every non-excluded
//! instance through a bounded worker pool, then restart the beat no matter
//! how many instances failed.

use std::sync::Arc;
use std::time::Instant;

use remote_exec::RemoteExecutor;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config::{FleetConfig, ROLE_SCHEDULER, ROLE_WORKER};
use crate::error::Result;
use crate::instance::{ExclusionSet, InstanceRegistry};
use crate::service::ServiceController;
use crate::shell::{path_exists, run_mutating};
use crate::types::{FailurePolicy, InstanceOutcome, PipelinePhase, RunSummary, TargetState};

// ---------------------------------------------------------------------------
// BinarizationOrchestrator
// ---------------------------------------------------------------------------

pub struct BinarizationOrchestrator {
    exec: Arc<dyn RemoteExecutor>,
    config: Arc<FleetConfig>,
}

impl BinarizationOrchestrator {
    pub fn new(exec: Arc<dyn RemoteExecutor>, config: Arc<FleetConfig>) -> Self {
        Self { exec, config }
    }

    /// Rebinarize every instance of the fleet.
    ///
    /// Phases: quiesce the scheduler (fatal on failure, nothing dispatched),
    /// preflight the exclusion set, fan out the per-instance pipelines over
    /// `pool_size` workers, join, then resume the scheduler unconditionally.
    pub async fn rebinarize_fleet(&self) -> Result<RunSummary> {
        let config = &self.config;
        let ctl = ServiceController::new(self.exec.as_ref(), config.dry_run);

        // Quiescing: any failure here aborts before any instance is touched.
        ctl.stop_with_escalation(
            ROLE_SCHEDULER,
            &config.scheduler_service,
            config.max_wait_ms,
            config.poll_interval_ms,
            true,
        )
        .await?;

        let registry = InstanceRegistry::from_config(config);
        let exclusions = self.preflight(&registry).await;
        if !exclusions.is_empty() {
            info!(
                excluded = exclusions.len(),
                "instances excluded from binarization: {}",
                exclusions.iter().collect::<Vec<_>>().join(", ")
            );
        }

        let summary = self.dispatch(&registry, exclusions).await;

        // Resuming: runs even when instances failed, so the beat is never
        // left permanently stopped after a partial failure.
        let resumed = ctl
            .set_state(
                ROLE_SCHEDULER,
                &config.scheduler_service,
                TargetState::Running,
                config.max_wait_ms,
                config.poll_interval_ms,
                FailurePolicy::Raise,
            )
            .await;

        info!(
            succeeded = summary.succeeded(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            "rebinarization run complete"
        );
        for (name, outcome) in summary.failures() {
            if let InstanceOutcome::Failed { phase, reason } = outcome {
                warn!(instance = name, phase = phase.as_str(), reason, "instance failed");
            }
        }

        resumed?;
        Ok(summary)
    }

    /// Re-launch binarization of the last processed input data for a single
    /// instance (no scheduler bracket, no exclusion logic).
    pub async fn rebinarize_instance(&self, name: &str) -> Result<()> {
        let registry = InstanceRegistry::from_config(&self.config);
        registry.get(name)?;
        binarize(self.exec.as_ref(), &self.config, name).await
    }

    /// Compute the exclusion set for this run: pre-seeded exclusions plus
    /// every instance that currently has no processable data.
    async fn preflight(&self, registry: &InstanceRegistry) -> ExclusionSet {
        let mut exclusions = ExclusionSet::default();
        for instance in registry.iter() {
            if instance.excluded {
                exclusions.insert(instance.name());
                continue;
            }
            if self.config.dry_run {
                // A dry run must work without live hosts; probes are skipped.
                continue;
            }
            match path_exists(self.exec.as_ref(), ROLE_WORKER, &instance.data_file, false).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(
                        instance = instance.name(),
                        "no {} found, adding to the auto-exclusion list",
                        crate::config::DATA_FILE_NAME
                    );
                    exclusions.insert(instance.name());
                }
                Err(e) => {
                    warn!(
                        instance = instance.name(),
                        error = %e,
                        "data availability probe failed, excluding from this run"
                    );
                    exclusions.insert(instance.name());
                }
            }
        }
        exclusions
    }

    /// Fan the per-instance pipelines out over a bounded worker pool and
    /// join them all. `pool_size = 1` degenerates to sequential execution.
    async fn dispatch(&self, registry: &InstanceRegistry, exclusions: ExclusionSet) -> RunSummary {
        let semaphore = Arc::new(Semaphore::new(self.config.pool_size));
        let exclusions = Arc::new(exclusions);
        let mut handles = Vec::with_capacity(registry.len());

        for name in registry.names() {
            let name = name.to_string();
            let exec = Arc::clone(&self.exec);
            let config = Arc::clone(&self.config);
            let exclusions = Arc::clone(&exclusions);
            let sem = Arc::clone(&semaphore);

            handles.push(tokio::spawn(async move {
                let _permit = match sem.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (
                            name.clone(),
                            InstanceOutcome::Failed {
                                phase: PipelinePhase::Binarize,
                                reason: "worker pool closed".to_string(),
                            },
                        )
                    }
                };
                // Exclusion membership is fixed at pipeline entry.
                let excluded = exclusions.contains(&name);
                let outcome = run_pipeline(exec.as_ref(), &config, &name, excluded).await;
                (name, outcome)
            }));
        }

        let mut summary = RunSummary::default();
        for handle in handles {
            match handle.await {
                Ok((name, outcome)) => summary.record(name, outcome),
                Err(e) => summary.record(
                    "unknown",
                    InstanceOutcome::Failed {
                        phase: PipelinePhase::Binarize,
                        reason: format!("task join error: {e}"),
                    },
                ),
            }
        }
        summary
    }
}

// ---------------------------------------------------------------------------
// Per-instance pipeline
// ---------------------------------------------------------------------------

/// Schema upgrade, then binarization unless excluded. Failures never leave
/// this function; siblings keep running.
async fn run_pipeline(
    exec: &dyn RemoteExecutor,
    config: &FleetConfig,
    name: &str,
    excluded: bool,
) -> InstanceOutcome {
    info!(instance = name, "loading data");
    let started = Instant::now();

    if let Err(e) = upgrade_schema(exec, config, name).await {
        error!(instance = name, error = %e, "schema upgrade failed");
        return InstanceOutcome::Failed {
            phase: PipelinePhase::SchemaUpgrade,
            reason: e.to_string(),
        };
    }

    if excluded {
        info!(instance = name, "NOTICE: instance is excluded, skipping binarization");
        return InstanceOutcome::Skipped;
    }

    info!(
        instance = name,
        "NOTICE: launching binarization @{}",
        chrono::Local::now().format("%H:%M:%S")
    );
    match binarize(exec, config, name).await {
        Ok(()) => {
            let elapsed = started.elapsed();
            info!(instance = name, "data loaded in {elapsed:.1?}");
            InstanceOutcome::Binarized { elapsed }
        }
        Err(e) => {
            error!(instance = name, error = %e, "failed binarization");
            InstanceOutcome::Failed {
                phase: PipelinePhase::Binarize,
                reason: e.to_string(),
            }
        }
    }
}

/// Upgrade the instance's data schema in its ed directory.
async fn upgrade_schema(exec: &dyn RemoteExecutor, config: &FleetConfig, name: &str) -> Result<()> {
    let dir = config.ed_dir(name);
    let command = format!("cd {dir} && PYTHONPATH=. alembic upgrade head");

    if config.dry_run {
        println!("DRY-RUN: {command}");
        return Ok(());
    }

    if !path_exists(exec, ROLE_SCHEDULER, &dir, true).await? {
        return Err(crate::error::HeimdallError::MissingRemotePath(dir));
    }

    exec.run(ROLE_SCHEDULER, &command).await?;
    Ok(())
}

/// Re-import the last processed dataset, producing a fresh serving file.
/// Blocking from the worker's point of view; this is the long step.
async fn binarize(exec: &dyn RemoteExecutor, config: &FleetConfig, name: &str) -> Result<()> {
    let command = format!(
        "cd {} && TYR_CONFIG_FILE={} python manage.py import_last_dataset {}",
        config.tyr_basedir, config.tyr_settings_file, name
    );
    run_mutating(exec, config.dry_run, ROLE_SCHEDULER, &command).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HeimdallError;
    use crate::testing::{failed_output, FakeExecutor};

    fn config(extra: &str) -> Arc<FleetConfig> {
        let yaml = format!(
            r#"
max_wait_ms: 60
poll_interval_ms: 10
roles:
  scheduler: [master]
  worker: [w1]
instances:
  alpha: {{}}
  bravo: {{}}
  charlie: {{}}
{extra}
"#
        );
        Arc::new(serde_yaml::from_str(&yaml).unwrap())
    }

    #[tokio::test]
    async fn fleet_run_binarizes_every_instance_once() {
        let exec = Arc::new(FakeExecutor::new().with_service("tyr_beat", true));
        let orch = BinarizationOrchestrator::new(exec.clone(), config("pool_size: 3"));

        let summary = orch.rebinarize_fleet().await.unwrap();

        assert_eq!(summary.succeeded(), 3);
        assert_eq!(summary.failed(), 0);
        for name in ["alpha", "bravo", "charlie"] {
            assert_eq!(exec.ran(&format!("import_last_dataset {name}")), 1);
            assert_eq!(exec.ran(&format!("cd /srv/ed/{name} && PYTHONPATH=. alembic upgrade head")), 1);
        }
        assert_eq!(exec.ran("service tyr_beat stop"), 1);
        assert_eq!(exec.ran("service tyr_beat start"), 1);
    }

    #[tokio::test]
    async fn no_data_instance_is_excluded_but_still_upgraded() {
        let exec = Arc::new(FakeExecutor::new().with_service("tyr_beat", true));
        exec.script_probe(
            "test -e /srv/ed/destination/bravo/data.nav.lz4",
            vec![failed_output(1, "")],
        );
        let orch = BinarizationOrchestrator::new(exec.clone(), config(""));

        let summary = orch.rebinarize_fleet().await.unwrap();

        assert_eq!(summary.succeeded(), 2);
        assert_eq!(summary.skipped(), 1);
        assert_eq!(exec.ran("import_last_dataset bravo"), 0);
        assert_eq!(exec.ran("cd /srv/ed/bravo && PYTHONPATH=. alembic upgrade head"), 1);
        assert_eq!(exec.ran("service tyr_beat start"), 1);
    }

    #[tokio::test]
    async fn preseeded_exclusions_are_honored() {
        let exec = Arc::new(FakeExecutor::new().with_service("tyr_beat", true));
        let orch =
            BinarizationOrchestrator::new(exec.clone(), config("excluded_instances: [charlie]"));

        let summary = orch.rebinarize_fleet().await.unwrap();

        assert_eq!(summary.skipped(), 1);
        assert_eq!(exec.ran("import_last_dataset charlie"), 0);
        assert_eq!(exec.ran("cd /srv/ed/charlie"), 1);
    }

    #[tokio::test]
    async fn quiesce_failure_dispatches_nothing() {
        let exec = Arc::new(FakeExecutor::new().with_wedged_service("tyr_beat"));
        let orch = BinarizationOrchestrator::new(exec.clone(), config(""));

        let err = orch.rebinarize_fleet().await.unwrap_err();

        assert!(matches!(err, HeimdallError::ServiceStuck { .. }));
        assert_eq!(exec.ran("alembic upgrade head"), 0);
        assert_eq!(exec.ran("import_last_dataset"), 0);
        assert_eq!(exec.ran("service tyr_beat start"), 0);
    }

    #[tokio::test]
    async fn instance_failure_is_isolated_and_resume_still_runs() {
        let exec = Arc::new(FakeExecutor::new().with_service("tyr_beat", true));
        exec.script_run("import_last_dataset bravo", failed_output(1, "bad dataset"));
        let orch = BinarizationOrchestrator::new(exec.clone(), config(""));

        let summary = orch.rebinarize_fleet().await.unwrap();

        assert_eq!(summary.succeeded(), 2);
        assert_eq!(summary.failed(), 1);
        let (name, outcome) = summary.failures().next().unwrap();
        assert_eq!(name, "bravo");
        assert!(matches!(
            outcome,
            InstanceOutcome::Failed { phase: PipelinePhase::Binarize, .. }
        ));
        assert_eq!(exec.ran("service tyr_beat start"), 1);
    }

    #[tokio::test]
    async fn schema_upgrade_failure_skips_binarization_for_that_instance() {
        let exec = Arc::new(FakeExecutor::new().with_service("tyr_beat", true));
        exec.script_probe("test -d /srv/ed/alpha", vec![failed_output(1, "")]);
        let orch = BinarizationOrchestrator::new(exec.clone(), config(""));

        let summary = orch.rebinarize_fleet().await.unwrap();

        assert_eq!(summary.failed(), 1);
        assert_eq!(exec.ran("import_last_dataset alpha"), 0);
        assert_eq!(exec.ran("import_last_dataset bravo"), 1);
    }

    #[tokio::test]
    async fn sequential_pool_still_covers_the_fleet() {
        let exec = Arc::new(FakeExecutor::new().with_service("tyr_beat", true));
        let orch = BinarizationOrchestrator::new(exec.clone(), config("pool_size: 1"));

        let summary = orch.rebinarize_fleet().await.unwrap();

        assert_eq!(summary.succeeded(), 3);
        assert_eq!(exec.ran("import_last_dataset"), 3);
    }

    #[tokio::test]
    async fn dry_run_executes_no_remote_commands() {
        let exec = Arc::new(FakeExecutor::new().with_service("tyr_beat", true));
        let orch = BinarizationOrchestrator::new(exec.clone(), config("dry_run: true"));

        let summary = orch.rebinarize_fleet().await.unwrap();

        assert_eq!(summary.succeeded(), 3);
        assert_eq!(exec.run_count(), 0);
        assert_eq!(exec.probe_count(), 0);
    }

    #[tokio::test]
    async fn single_instance_rebinarization_checks_registration() {
        let exec = Arc::new(FakeExecutor::new());
        let orch = BinarizationOrchestrator::new(exec.clone(), config(""));

        orch.rebinarize_instance("alpha").await.unwrap();
        assert_eq!(exec.ran("import_last_dataset alpha"), 1);

        let err = orch.rebinarize_instance("atlantis").await.unwrap_err();
        assert!(matches!(err, HeimdallError::InstanceNotFound(_)));
    }
}
