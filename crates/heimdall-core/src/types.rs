use std::fmt;
use std::time::Duration;

use serde::Serialize;

// ---------------------------------------------------------------------------
// ServiceState / FailurePolicy
// ---------------------------------------------------------------------------

/// Observed state of a remote service across a role's hosts.
///
/// `Transitioning` means the hosts disagree (some up, some down); a target
/// state is only considered reached once every host reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Running,
    Stopped,
    Transitioning,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::Running => "running",
            ServiceState::Stopped => "stopped",
            ServiceState::Transitioning => "transitioning",
        };
        f.write_str(s)
    }
}

/// Desired terminal state for a `set_state` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    Running,
    Stopped,
}

impl TargetState {
    /// The `service <name> <verb>` argument that moves toward this state.
    pub fn verb(self) -> &'static str {
        match self {
            TargetState::Running => "start",
            TargetState::Stopped => "stop",
        }
    }

    pub fn state(self) -> ServiceState {
        match self {
            TargetState::Running => ServiceState::Running,
            TargetState::Stopped => ServiceState::Stopped,
        }
    }
}

/// What `set_state` does when the wait window elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Fail with `ServiceTimeout`.
    Raise,
    /// Return `false`; the caller decides (usually an escalation path).
    Report,
}

// ---------------------------------------------------------------------------
// Pipeline outcomes
// ---------------------------------------------------------------------------

/// The two sequential steps of a per-instance pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    SchemaUpgrade,
    Binarize,
}

impl PipelinePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelinePhase::SchemaUpgrade => "schema_upgrade",
            PipelinePhase::Binarize => "binarize",
        }
    }
}

/// Terminal result of one instance's pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InstanceOutcome {
    /// Schema upgraded and data rebinarized.
    Binarized {
        #[serde(with = "duration_secs")]
        elapsed: Duration,
    },
    /// In the exclusion set at pipeline entry; schema upgrade still ran.
    Skipped,
    /// One phase failed; siblings were unaffected.
    Failed {
        phase: PipelinePhase,
        reason: String,
    },
}

mod duration_secs {
    use super::Duration;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

// ---------------------------------------------------------------------------
// RunSummary
// ---------------------------------------------------------------------------

/// Per-instance results of one fleet rebinarization run.
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub results: Vec<(String, InstanceOutcome)>,
}

impl RunSummary {
    pub fn record(&mut self, instance: impl Into<String>, outcome: InstanceOutcome) {
        self.results.push((instance.into(), outcome));
    }

    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, InstanceOutcome::Binarized { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, InstanceOutcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, InstanceOutcome::Failed { .. }))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &InstanceOutcome)> {
        self.results
            .iter()
            .filter(|(_, o)| matches!(o, InstanceOutcome::Failed { .. }))
            .map(|(n, o)| (n.as_str(), o))
    }

    fn count(&self, pred: impl Fn(&InstanceOutcome) -> bool) -> usize {
        self.results.iter().filter(|(_, o)| pred(o)).count()
    }
}
