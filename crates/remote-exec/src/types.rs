// ─── CommandOutput ────────────────────────────────────────────────────────

/// Captured result of one remote command invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Trimmed stdout, for commands that print a single-line identifier
    /// or checksum (SQL lookups, `md5sum | awk`).
    pub fn line(&self) -> &str {
        self.stdout.trim()
    }
}
