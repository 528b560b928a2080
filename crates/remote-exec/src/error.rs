use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteExecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("command failed on {host} (exit {code}): {stderr}")]
    Command {
        host: String,
        code: i32,
        stderr: String,
    },

    #[error("command terminated by signal on {host}")]
    Signal { host: String },

    #[error("command timed out on {host} after {timeout_ms}ms")]
    Timeout { host: String, timeout_ms: u64 },

    #[error("no hosts configured for role: {0}")]
    UnknownRole(String),
}

pub type Result<T> = std::result::Result<T, RemoteExecError>;
