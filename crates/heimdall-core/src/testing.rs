//! In-memory `RemoteExecutor` fake shared by the unit tests.
//!
//! Commands are matched by substring: service start/stop/status and
//! `ps`/`kill` follow a tiny built-in service model, everything else can be
//! scripted per test. All invocations are recorded for assertions.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use remote_exec::{CommandOutput, RemoteExecError, RemoteExecutor, Result};

pub(crate) fn ok_output(stdout: &str) -> CommandOutput {
    CommandOutput {
        exit_code: 0,
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

pub(crate) fn failed_output(code: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        exit_code: code,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum StopBehavior {
    /// `service X stop` works.
    Normal,
    /// Stop is ignored but `kill -9` clears the processes.
    Ghost,
    /// Neither stop nor kill has any effect.
    Wedged,
}

struct ServiceModel {
    running: bool,
    stop: StopBehavior,
}

#[derive(Default)]
pub(crate) struct FakeExecutor {
    pub(crate) runs: Mutex<Vec<(String, String)>>,
    pub(crate) probes: Mutex<Vec<(String, String)>>,
    pub(crate) puts: Mutex<Vec<(String, String, String)>>,
    run_scripts: Mutex<Vec<(String, CommandOutput)>>,
    probe_scripts: Mutex<Vec<(String, Vec<CommandOutput>)>>,
    services: Mutex<HashMap<String, ServiceModel>>,
}

impl FakeExecutor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_service(self, name: &str, running: bool) -> Self {
        self.add_service(name, running, StopBehavior::Normal);
        self
    }

    /// Service whose stop command is ignored; only `kill -9` works.
    pub(crate) fn with_ghost_service(self, name: &str) -> Self {
        self.add_service(name, true, StopBehavior::Ghost);
        self
    }

    /// Service that survives both stop and forced kill.
    pub(crate) fn with_wedged_service(self, name: &str) -> Self {
        self.add_service(name, true, StopBehavior::Wedged);
        self
    }

    fn add_service(&self, name: &str, running: bool, stop: StopBehavior) {
        self.services.lock().unwrap().insert(
            name.to_string(),
            ServiceModel { running, stop },
        );
    }

    /// Script the response for the first `run` whose command contains
    /// `needle`. Scripts are consulted in insertion order.
    pub(crate) fn script_run(&self, needle: &str, output: CommandOutput) {
        self.run_scripts
            .lock()
            .unwrap()
            .push((needle.to_string(), output));
    }

    pub(crate) fn script_probe(&self, needle: &str, outputs: Vec<CommandOutput>) {
        self.probe_scripts
            .lock()
            .unwrap()
            .push((needle.to_string(), outputs));
    }

    /// Number of executed (non-probe) commands containing `needle`.
    pub(crate) fn ran(&self, needle: &str) -> usize {
        self.runs
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, cmd)| cmd.contains(needle))
            .count()
    }

    pub(crate) fn run_count(&self) -> usize {
        self.runs.lock().unwrap().len()
    }

    pub(crate) fn probe_count(&self) -> usize {
        self.probes.lock().unwrap().len()
    }

    fn service_command(&self, command: &str) -> Option<CommandOutput> {
        let mut services = self.services.lock().unwrap();
        for (name, model) in services.iter_mut() {
            if command == format!("service {name} stop") {
                if model.stop == StopBehavior::Normal {
                    model.running = false;
                }
                return Some(ok_output(""));
            }
            if command == format!("service {name} start") {
                model.running = true;
                return Some(ok_output(""));
            }
        }
        None
    }

    fn service_probe(&self, command: &str) -> Option<Vec<CommandOutput>> {
        let mut services = self.services.lock().unwrap();

        if command.starts_with("kill -9") {
            for model in services.values_mut() {
                if model.stop == StopBehavior::Ghost {
                    model.running = false;
                }
            }
            return Some(vec![ok_output("")]);
        }

        // `ps -eo pid,command | grep [t]yr_beat` — undo the bracket trick
        // before matching the service name.
        let flat = command.replace(['[', ']'], "");
        for (name, model) in services.iter() {
            if command.ends_with("status") && command.contains(name.as_str()) {
                let out = if model.running {
                    ok_output(&format!("{name} is running"))
                } else {
                    failed_output(3, "")
                };
                return Some(vec![out]);
            }
            if flat.starts_with("ps -eo pid,command") && flat.contains(name.as_str()) {
                let out = if model.running {
                    ok_output(&format!("1234 /usr/bin/{name}\n"))
                } else {
                    ok_output("")
                };
                return Some(vec![out]);
            }
        }
        None
    }
}

#[async_trait]
impl RemoteExecutor for FakeExecutor {
    async fn run(&self, role: &str, command: &str) -> Result<CommandOutput> {
        self.runs
            .lock()
            .unwrap()
            .push((role.to_string(), command.to_string()));

        if let Some(output) = self.service_command(command) {
            return Ok(output);
        }

        let scripted = {
            let scripts = self.run_scripts.lock().unwrap();
            scripts
                .iter()
                .find(|(needle, _)| command.contains(needle.as_str()))
                .map(|(_, out)| out.clone())
        };
        match scripted {
            Some(out) if !out.success() => Err(RemoteExecError::Command {
                host: "fake".to_string(),
                code: out.exit_code,
                stderr: out.stderr,
            }),
            Some(out) => Ok(out),
            None => Ok(ok_output("")),
        }
    }

    async fn probe(&self, role: &str, command: &str) -> Result<Vec<CommandOutput>> {
        self.probes
            .lock()
            .unwrap()
            .push((role.to_string(), command.to_string()));

        let scripted = {
            let scripts = self.probe_scripts.lock().unwrap();
            scripts
                .iter()
                .find(|(needle, _)| command.contains(needle.as_str()))
                .map(|(_, outs)| outs.clone())
        };
        if let Some(outputs) = scripted {
            return Ok(outputs);
        }
        if let Some(outputs) = self.service_probe(command) {
            return Ok(outputs);
        }
        Ok(vec![ok_output("")])
    }

    async fn put(&self, role: &str, local: &Path, remote: &str) -> Result<()> {
        self.puts.lock().unwrap().push((
            role.to_string(),
            local.to_string_lossy().into_owned(),
            remote.to_string(),
        ));
        Ok(())
    }

    async fn get(&self, _role: &str, _remote: &str) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}
