use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::types::CommandOutput;
use crate::{RemoteExecError, Result};

// ─── Subprocess driver ────────────────────────────────────────────────────

/// Run a command to completion, capturing stdout and stderr concurrently.
///
/// Both pipes are drained while waiting so a chatty remote command can never
/// deadlock on a full pipe. If `timeout_ms` elapses first the child is killed
/// and `RemoteExecError::Timeout` is returned.
pub(crate) async fn run_raw(
    host: &str,
    mut cmd: Command,
    timeout_ms: Option<u64>,
) -> Result<(i32, Vec<u8>, Vec<u8>)> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn()?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("stdout not captured"))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("stderr not captured"))?;

    let mut out = Vec::new();
    let mut err = Vec::new();

    let wait = async {
        let (status, _, _) = tokio::try_join!(
            child.wait(),
            stdout.read_to_end(&mut out),
            stderr.read_to_end(&mut err),
        )?;
        Ok::<_, std::io::Error>(status)
    };

    let status = match timeout_ms {
        Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), wait).await {
            Ok(res) => res?,
            Err(_) => {
                let _ = child.kill().await;
                return Err(RemoteExecError::Timeout {
                    host: host.to_string(),
                    timeout_ms: ms,
                });
            }
        },
        None => wait.await?,
    };

    let code = match status.code() {
        Some(code) => code,
        // Killed by signal (Unix)
        None => {
            return Err(RemoteExecError::Signal {
                host: host.to_string(),
            })
        }
    };

    Ok((code, out, err))
}

pub(crate) async fn run_to_completion(
    host: &str,
    cmd: Command,
    timeout_ms: Option<u64>,
) -> Result<CommandOutput> {
    let (exit_code, out, err) = run_raw(host, cmd, timeout_ms).await?;
    Ok(CommandOutput {
        exit_code,
        stdout: String::from_utf8_lossy(&out).into_owned(),
        stderr: String::from_utf8_lossy(&err).into_owned(),
    })
}

// ─── Command builders ─────────────────────────────────────────────────────

/// Build `ssh [options] <host> <command>`.
///
/// The command is passed as a single argument; the remote shell does the word
/// splitting, exactly as typing `ssh host 'cmd'` would.
pub(crate) fn ssh_command(host: &str, options: &[String], command: &str) -> Command {
    let mut cmd = Command::new("ssh");
    for opt in options {
        cmd.arg("-o").arg(opt);
    }
    cmd.arg(host).arg(command);
    cmd
}

/// Build `scp [options] <local> <host>:<remote>`.
pub(crate) fn scp_command(host: &str, options: &[String], local: &str, remote: &str) -> Command {
    let mut cmd = Command::new("scp");
    for opt in options {
        cmd.arg("-o").arg(opt);
    }
    cmd.arg(local).arg(format!("{host}:{remote}"));
    cmd
}
