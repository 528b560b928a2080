use crate::error::{HeimdallError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Role names the tasks address. Every fleet config must at least define
/// hosts for the scheduler and worker roles; `db` is only needed by the
/// dataset checks.
pub const ROLE_SCHEDULER: &str = "scheduler";
pub const ROLE_WORKER: &str = "worker";
pub const ROLE_DB: &str = "db";

/// Serving-format file produced by binarization.
pub const DATA_FILE_NAME: &str = "data.nav.lz4";

// ---------------------------------------------------------------------------
// InstanceConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Serving data file; defaults to `<destination_dir>/<name>/data.nav.lz4`.
    #[serde(default)]
    pub data_file: Option<String>,

    /// Input data directory; defaults to `<ed_basedir>/<name>/source`.
    #[serde(default)]
    pub source_dir: Option<String>,

    /// Set at creation, never cleared. Gates one-time setup actions such as
    /// seeding default synonyms.
    #[serde(default)]
    pub first_deploy: bool,
}

// ---------------------------------------------------------------------------
// FleetConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Parallelism degree of the rebinarization fan-out. 1 forces strict
    /// sequential execution (debugging / diagnosis).
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Print every mutating remote command instead of executing it.
    #[serde(default)]
    pub dry_run: bool,

    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Workers drain in-flight jobs before exiting, so they get a longer
    /// stop window than the scheduler.
    #[serde(default = "default_worker_stop_wait_ms")]
    pub worker_stop_wait_ms: u64,

    /// Escalate a failed worker stop to `kill -9` on the surviving pids.
    #[serde(default)]
    pub kill_ghost_workers: bool,

    /// Single-host deployment; file copies preserve permissions themselves
    /// instead of relying on NFSv4 ACL inheritance.
    #[serde(default)]
    pub standalone: bool,

    /// Instances excluded from binarization before any run starts.
    #[serde(default)]
    pub excluded_instances: Vec<String>,

    /// Role name → host group.
    #[serde(default)]
    pub roles: HashMap<String, Vec<String>>,

    #[serde(default = "default_scheduler_service")]
    pub scheduler_service: String,

    #[serde(default = "default_worker_service")]
    pub worker_service: String,

    #[serde(default = "default_ed_basedir")]
    pub ed_basedir: String,

    #[serde(default = "default_tyr_basedir")]
    pub tyr_basedir: String,

    #[serde(default = "default_tyr_settings_file")]
    pub tyr_settings_file: String,

    /// Per-instance ini directory, e.g. `/etc/tyr.d/fr-idf.ini`.
    #[serde(default = "default_instances_dir")]
    pub instances_dir: String,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_destination_dir")]
    pub destination_dir: String,

    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,

    /// Routing-platform database queried for job/dataset lookups.
    #[serde(default = "default_database")]
    pub database: String,

    #[serde(default)]
    pub instances: BTreeMap<String, InstanceConfig>,
}

fn default_pool_size() -> usize {
    8
}

fn default_max_wait_ms() -> u64 {
    4000
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_worker_stop_wait_ms() -> u64 {
    8000
}

fn default_scheduler_service() -> String {
    "tyr_beat".to_string()
}

fn default_worker_service() -> String {
    "tyr_worker".to_string()
}

fn default_ed_basedir() -> String {
    "/srv/ed".to_string()
}

fn default_tyr_basedir() -> String {
    "/srv/tyr".to_string()
}

fn default_tyr_settings_file() -> String {
    "/srv/tyr/settings.py".to_string()
}

fn default_instances_dir() -> String {
    "/etc/tyr.d".to_string()
}

fn default_log_dir() -> String {
    "/var/log/tyr".to_string()
}

fn default_destination_dir() -> String {
    "/srv/ed/destination".to_string()
}

fn default_backup_dir() -> String {
    "/srv/ed/backup".to_string()
}

fn default_database() -> String {
    "jormungandr".to_string()
}

impl Default for FleetConfig {
    fn default() -> Self {
        serde_yaml::from_str("{}").expect("empty config deserializes")
    }
}

impl FleetConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: FleetConfig = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configs that would misbehave at run time rather than failing
    /// mid-run with a half-quiesced fleet.
    pub fn validate(&self) -> Result<()> {
        if self.pool_size < 1 {
            return Err(HeimdallError::InvalidConfig(
                "pool_size must be >= 1".to_string(),
            ));
        }
        if self.poll_interval_ms < 1 {
            return Err(HeimdallError::InvalidConfig(
                "poll_interval_ms must be >= 1".to_string(),
            ));
        }
        for name in &self.excluded_instances {
            if !self.instances.contains_key(name) {
                return Err(HeimdallError::InvalidConfig(format!(
                    "excluded instance '{name}' is not a configured instance"
                )));
            }
        }
        for role in [ROLE_SCHEDULER, ROLE_WORKER] {
            match self.roles.get(role) {
                Some(hosts) if !hosts.is_empty() => {}
                _ => {
                    return Err(HeimdallError::InvalidConfig(format!(
                        "role '{role}' has no hosts"
                    )))
                }
            }
        }
        Ok(())
    }

    pub fn ed_dir(&self, instance: &str) -> String {
        format!("{}/{}", self.ed_basedir, instance)
    }

    pub fn data_file(&self, instance: &str) -> String {
        match self.instances.get(instance).and_then(|i| i.data_file.clone()) {
            Some(path) => path,
            None => format!("{}/{}/{}", self.destination_dir, instance, DATA_FILE_NAME),
        }
    }

    pub fn source_dir(&self, instance: &str) -> String {
        match self.instances.get(instance).and_then(|i| i.source_dir.clone()) {
            Some(path) => path,
            None => format!("{}/{}/source", self.ed_basedir, instance),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> &'static str {
        r#"
roles:
  scheduler: [tyr-master.prod]
  worker: [tyr1.prod, tyr2.prod]
  db: [db1.prod]
instances:
  fr-idf: {}
  nl:
    first_deploy: true
    data_file: /custom/nl/data.nav.lz4
"#
    }

    #[test]
    fn defaults_applied_on_minimal_config() {
        let config: FleetConfig = serde_yaml::from_str(minimal_yaml()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.pool_size, 8);
        assert_eq!(config.max_wait_ms, 4000);
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.scheduler_service, "tyr_beat");
        assert!(!config.dry_run);
        assert!(!config.kill_ghost_workers);
    }

    #[test]
    fn derived_paths_respect_overrides() {
        let config: FleetConfig = serde_yaml::from_str(minimal_yaml()).unwrap();

        assert_eq!(config.ed_dir("fr-idf"), "/srv/ed/fr-idf");
        assert_eq!(
            config.data_file("fr-idf"),
            "/srv/ed/destination/fr-idf/data.nav.lz4"
        );
        assert_eq!(config.data_file("nl"), "/custom/nl/data.nav.lz4");
        assert_eq!(config.source_dir("nl"), "/srv/ed/nl/source");
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        let mut config: FleetConfig = serde_yaml::from_str(minimal_yaml()).unwrap();
        config.pool_size = 0;
        assert!(matches!(
            config.validate(),
            Err(HeimdallError::InvalidConfig(_))
        ));
    }

    #[test]
    fn unknown_excluded_instance_is_rejected() {
        let mut config: FleetConfig = serde_yaml::from_str(minimal_yaml()).unwrap();
        config.excluded_instances.push("atlantis".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_role_is_rejected() {
        let mut config: FleetConfig = serde_yaml::from_str(minimal_yaml()).unwrap();
        config.roles.remove(ROLE_SCHEDULER);
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reads_and_validates_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.yaml");
        std::fs::write(&path, minimal_yaml()).unwrap();

        let config = FleetConfig::load(&path).unwrap();
        assert_eq!(config.instances.len(), 2);
    }
}
