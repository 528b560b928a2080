use std::time::Duration;

use remote_exec::RemoteExecutor;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{HeimdallError, Result};
use crate::types::{FailurePolicy, ServiceState, TargetState};

// ---------------------------------------------------------------------------
// ServiceController
// ---------------------------------------------------------------------------

/// Brings a named service to a target state across a role's host group,
/// tolerating slow services via bounded polling and stuck services via a
/// single forced-kill escalation.
pub struct ServiceController<'a> {
    exec: &'a dyn RemoteExecutor,
    dry_run: bool,
}

impl<'a> ServiceController<'a> {
    pub fn new(exec: &'a dyn RemoteExecutor, dry_run: bool) -> Self {
        Self { exec, dry_run }
    }

    /// Poll `service <name> status` on every host of the role.
    ///
    /// Exit 0 means running (sysvinit convention). The role is only Running
    /// or Stopped when all hosts agree; anything else is Transitioning.
    pub async fn status(&self, role: &str, service: &str) -> Result<ServiceState> {
        let outputs = self
            .exec
            .probe(role, &format!("service {service} status"))
            .await?;
        let running = outputs.iter().filter(|o| o.success()).count();
        Ok(if running == 0 {
            ServiceState::Stopped
        } else if running == outputs.len() {
            ServiceState::Running
        } else {
            ServiceState::Transitioning
        })
    }

    /// Issue the state-change command once, then poll until the service
    /// reaches `target` or `max_wait_ms` elapses.
    ///
    /// Already at target is a no-op success — no duplicate command is sent.
    /// On timeout, `Raise` fails with `ServiceTimeout` and `Report` returns
    /// `false` so the caller can escalate.
    pub async fn set_state(
        &self,
        role: &str,
        service: &str,
        target: TargetState,
        max_wait_ms: u64,
        poll_interval_ms: u64,
        policy: FailurePolicy,
    ) -> Result<bool> {
        let command = format!("service {service} {}", target.verb());

        if self.dry_run {
            println!("DRY-RUN: {command}");
            return Ok(true);
        }

        if self.status(role, service).await? == target.state() {
            debug!(service, target = %target.state(), "already at target, nothing to do");
            return Ok(true);
        }

        info!(service, role, "issuing '{command}'");
        if let Err(e) = self.exec.run(role, &command).await {
            // The init script can exit nonzero while the service still
            // transitions; the poll below is the arbiter.
            warn!(service, error = %e, "state-change command failed, polling anyway");
        }

        let mut waited_ms = 0;
        while waited_ms < max_wait_ms {
            sleep(Duration::from_millis(poll_interval_ms)).await;
            waited_ms += poll_interval_ms;
            if self.status(role, service).await? == target.state() {
                return Ok(true);
            }
        }

        match policy {
            FailurePolicy::Raise => Err(HeimdallError::ServiceTimeout {
                service: service.to_string(),
                target: target.state(),
                waited_ms: max_wait_ms,
            }),
            FailurePolicy::Report => Ok(false),
        }
    }

    /// Stop a service, escalating to `kill -9` on the surviving processes
    /// when the polite stop times out and `escalate` is set.
    ///
    /// The escalation is a single attempt: one kill pass, one re-poll window
    /// of half the stop window. Processes that survive that make the service
    /// stuck — the one fatal condition in the subsystem.
    pub async fn stop_with_escalation(
        &self,
        role: &str,
        service: &str,
        max_wait_ms: u64,
        poll_interval_ms: u64,
        escalate: bool,
    ) -> Result<()> {
        let stopped = self
            .set_state(
                role,
                service,
                TargetState::Stopped,
                max_wait_ms,
                poll_interval_ms,
                FailurePolicy::Report,
            )
            .await?;
        if stopped {
            return Ok(());
        }

        if !escalate {
            return Err(HeimdallError::ServiceTimeout {
                service: service.to_string(),
                target: ServiceState::Stopped,
                waited_ms: max_wait_ms,
            });
        }

        warn!(service, "still running after {max_wait_ms}ms, killing ghost processes");

        let listing = format!("ps -eo pid,command | grep {}", grep_pattern(service));
        let pids = self.live_pids(role, &listing).await?;
        if pids.is_empty() {
            // Status said running but no process is left; call it stopped.
            return Ok(());
        }

        self.exec
            .probe(role, &format!("kill -9 {}", pids.join(" ")))
            .await?;

        let mut waited_ms = 0;
        while waited_ms <= max_wait_ms / 2 {
            if self.live_pids(role, &listing).await?.is_empty() {
                info!(service, "ghost processes killed");
                return Ok(());
            }
            sleep(Duration::from_millis(poll_interval_ms)).await;
            waited_ms += poll_interval_ms;
        }

        Err(HeimdallError::ServiceStuck {
            service: service.to_string(),
        })
    }

    async fn live_pids(&self, role: &str, listing: &str) -> Result<Vec<String>> {
        let outputs = self.exec.probe(role, listing).await?;
        let mut pids = Vec::new();
        for output in &outputs {
            for line in output.stdout.lines() {
                if let Some(pid) = line.split_whitespace().next() {
                    if pid.chars().all(|c| c.is_ascii_digit()) {
                        pids.push(pid.to_string());
                    }
                }
            }
        }
        Ok(pids)
    }
}

/// `tyr_beat` → `[t]yr_beat`, so the grep never matches itself.
fn grep_pattern(service: &str) -> String {
    let mut chars = service.chars();
    match chars.next() {
        Some(first) => format!("[{first}]{}", chars.as_str()),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{failed_output, ok_output, FakeExecutor};

    const WAIT: u64 = 60;
    const POLL: u64 = 10;

    #[tokio::test]
    async fn set_state_is_idempotent_at_target() {
        let exec = FakeExecutor::new().with_service("tyr_beat", true);
        let ctl = ServiceController::new(&exec, false);

        let ok = ctl
            .set_state("scheduler", "tyr_beat", TargetState::Running, WAIT, POLL, FailurePolicy::Raise)
            .await
            .unwrap();

        assert!(ok);
        assert_eq!(exec.ran("service tyr_beat start"), 0);
    }

    #[tokio::test]
    async fn stop_issues_command_once_and_polls_to_stopped() {
        let exec = FakeExecutor::new().with_service("tyr_beat", true);
        let ctl = ServiceController::new(&exec, false);

        let ok = ctl
            .set_state("scheduler", "tyr_beat", TargetState::Stopped, WAIT, POLL, FailurePolicy::Raise)
            .await
            .unwrap();

        assert!(ok);
        assert_eq!(exec.ran("service tyr_beat stop"), 1);
    }

    #[tokio::test]
    async fn timeout_reports_false_under_report_policy() {
        let exec = FakeExecutor::new().with_ghost_service("tyr_worker");
        let ctl = ServiceController::new(&exec, false);

        let ok = ctl
            .set_state("worker", "tyr_worker", TargetState::Stopped, WAIT, POLL, FailurePolicy::Report)
            .await
            .unwrap();

        assert!(!ok);
    }

    #[tokio::test]
    async fn timeout_raises_under_raise_policy() {
        let exec = FakeExecutor::new().with_ghost_service("tyr_worker");
        let ctl = ServiceController::new(&exec, false);

        let err = ctl
            .set_state("worker", "tyr_worker", TargetState::Stopped, WAIT, POLL, FailurePolicy::Raise)
            .await
            .unwrap_err();

        assert!(matches!(err, HeimdallError::ServiceTimeout { .. }));
    }

    #[tokio::test]
    async fn escalation_kills_ghost_processes() {
        let exec = FakeExecutor::new().with_ghost_service("tyr_worker");
        let ctl = ServiceController::new(&exec, false);

        ctl.stop_with_escalation("worker", "tyr_worker", WAIT, POLL, true)
            .await
            .unwrap();

        assert_eq!(exec.probes.lock().unwrap().iter().filter(|(_, c)| c.starts_with("kill -9")).count(), 1);
    }

    #[tokio::test]
    async fn wedged_service_is_stuck() {
        let exec = FakeExecutor::new().with_wedged_service("tyr_worker");
        let ctl = ServiceController::new(&exec, false);

        let err = ctl
            .stop_with_escalation("worker", "tyr_worker", WAIT, POLL, true)
            .await
            .unwrap_err();

        assert!(matches!(err, HeimdallError::ServiceStuck { .. }));
    }

    #[tokio::test]
    async fn escalation_disabled_raises_timeout() {
        let exec = FakeExecutor::new().with_ghost_service("tyr_worker");
        let ctl = ServiceController::new(&exec, false);

        let err = ctl
            .stop_with_escalation("worker", "tyr_worker", WAIT, POLL, false)
            .await
            .unwrap_err();

        assert!(matches!(err, HeimdallError::ServiceTimeout { .. }));
    }

    #[tokio::test]
    async fn mixed_hosts_report_transitioning() {
        let exec = FakeExecutor::new();
        exec.script_probe(
            "service kraken status",
            vec![ok_output("running"), failed_output(3, "")],
        );
        let ctl = ServiceController::new(&exec, false);

        let state = ctl.status("engine", "kraken").await.unwrap();
        assert_eq!(state, ServiceState::Transitioning);
    }

    #[tokio::test]
    async fn dry_run_prints_without_probing() {
        let exec = FakeExecutor::new().with_service("tyr_beat", true);
        let ctl = ServiceController::new(&exec, true);

        let ok = ctl
            .set_state("scheduler", "tyr_beat", TargetState::Stopped, WAIT, POLL, FailurePolicy::Raise)
            .await
            .unwrap();

        assert!(ok);
        assert_eq!(exec.run_count(), 0);
        assert_eq!(exec.probe_count(), 0);
    }

    #[test]
    fn grep_pattern_brackets_first_char() {
        assert_eq!(grep_pattern("tyr_worker"), "[t]yr_worker");
    }
}
