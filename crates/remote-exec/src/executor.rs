use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use crate::process::{run_raw, run_to_completion, scp_command, ssh_command};
use crate::types::CommandOutput;
use crate::{RemoteExecError, Result};

// ─── RemoteExecutor ───────────────────────────────────────────────────────

/// The seam between fleet orchestration and actual remote hosts.
///
/// A role names a host group from the fleet config (`scheduler`, `worker`,
/// `db`, ...). Commands address roles, not hosts; implementations decide how
/// a role fans out. Production uses [`SshExecutor`]; tests use in-memory
/// fakes that record commands.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run `command` on every host of `role`, failing fast on the first
    /// nonzero exit. Returns the output of the last host on success.
    async fn run(&self, role: &str, command: &str) -> Result<CommandOutput>;

    /// Run `command` on every host of `role` and return all outputs.
    /// Nonzero exits are data here, not errors — used for status probes and
    /// process listings.
    async fn probe(&self, role: &str, command: &str) -> Result<Vec<CommandOutput>>;

    /// Copy a local file to the same path on every host of `role`.
    async fn put(&self, role: &str, local: &Path, remote: &str) -> Result<()>;

    /// Fetch a file's bytes from the first host of `role`.
    async fn get(&self, role: &str, remote: &str) -> Result<Vec<u8>>;
}

// ─── SshExecutor ──────────────────────────────────────────────────────────

/// Executes commands over the system `ssh`/`scp` binaries.
pub struct SshExecutor {
    roles: HashMap<String, Vec<String>>,
    ssh_options: Vec<String>,
    command_timeout_ms: Option<u64>,
}

impl SshExecutor {
    pub fn new(roles: HashMap<String, Vec<String>>) -> Self {
        Self {
            roles,
            ssh_options: vec!["BatchMode=yes".to_string()],
            command_timeout_ms: None,
        }
    }

    /// Add an `-o` option passed to every ssh/scp invocation.
    pub fn with_ssh_option(mut self, option: impl Into<String>) -> Self {
        self.ssh_options.push(option.into());
        self
    }

    /// Kill any single remote command that outlives this window.
    pub fn with_command_timeout(mut self, timeout_ms: u64) -> Self {
        self.command_timeout_ms = Some(timeout_ms);
        self
    }

    fn hosts_for(&self, role: &str) -> Result<&[String]> {
        match self.roles.get(role) {
            Some(hosts) if !hosts.is_empty() => Ok(hosts),
            _ => Err(RemoteExecError::UnknownRole(role.to_string())),
        }
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn run(&self, role: &str, command: &str) -> Result<CommandOutput> {
        let hosts = self.hosts_for(role)?;
        let mut last = None;
        for host in hosts {
            debug!(host, command, "remote run");
            let cmd = ssh_command(host, &self.ssh_options, command);
            let output = run_to_completion(host, cmd, self.command_timeout_ms).await?;
            if !output.success() {
                return Err(RemoteExecError::Command {
                    host: host.clone(),
                    code: output.exit_code,
                    stderr: output.stderr,
                });
            }
            last = Some(output);
        }
        // hosts_for guarantees at least one host
        Ok(last.unwrap_or(CommandOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        }))
    }

    async fn probe(&self, role: &str, command: &str) -> Result<Vec<CommandOutput>> {
        let hosts = self.hosts_for(role)?;
        let mut outputs = Vec::with_capacity(hosts.len());
        for host in hosts {
            debug!(host, command, "remote probe");
            let cmd = ssh_command(host, &self.ssh_options, command);
            outputs.push(run_to_completion(host, cmd, self.command_timeout_ms).await?);
        }
        Ok(outputs)
    }

    async fn put(&self, role: &str, local: &Path, remote: &str) -> Result<()> {
        let hosts = self.hosts_for(role)?;
        let local = local.to_string_lossy();
        for host in hosts {
            debug!(host, %local, remote, "remote put");
            let cmd = scp_command(host, &self.ssh_options, &local, remote);
            let output = run_to_completion(host, cmd, self.command_timeout_ms).await?;
            if !output.success() {
                return Err(RemoteExecError::Command {
                    host: host.clone(),
                    code: output.exit_code,
                    stderr: output.stderr,
                });
            }
        }
        Ok(())
    }

    async fn get(&self, role: &str, remote: &str) -> Result<Vec<u8>> {
        let hosts = self.hosts_for(role)?;
        let host = &hosts[0];
        debug!(host, remote, "remote get");
        let cmd = ssh_command(host, &self.ssh_options, &format!("cat {remote}"));
        let (code, out, err) = run_raw(host, cmd, self.command_timeout_ms).await?;
        if code != 0 {
            return Err(RemoteExecError::Command {
                host: host.clone(),
                code,
                stderr: String::from_utf8_lossy(&err).into_owned(),
            });
        }
        Ok(out)
    }
}
