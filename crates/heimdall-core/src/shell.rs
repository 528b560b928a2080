//! Small helpers shared by the orchestrator and the fleet tasks.

use remote_exec::RemoteExecutor;

use crate::error::Result;

/// Run a remote-mutating command, or print it verbatim in dry-run mode.
///
/// Dry-run output goes to stdout so an operator can diff it against what a
/// real run would execute.
pub(crate) async fn run_mutating(
    exec: &dyn RemoteExecutor,
    dry_run: bool,
    role: &str,
    command: &str,
) -> Result<()> {
    if dry_run {
        println!("DRY-RUN: {command}");
        return Ok(());
    }
    exec.run(role, command).await?;
    Ok(())
}

/// Check a path on the first host of `role`. `-d` for directories, `-e`
/// otherwise.
pub(crate) async fn path_exists(
    exec: &dyn RemoteExecutor,
    role: &str,
    path: &str,
    directory: bool,
) -> Result<bool> {
    let flag = if directory { "-d" } else { "-e" };
    let outputs = exec.probe(role, &format!("test {flag} {path}")).await?;
    Ok(outputs.first().map(|o| o.success()).unwrap_or(false))
}
