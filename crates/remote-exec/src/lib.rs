//! `remote-exec` — ssh/scp subprocess driver for the heimdall fleet tools.
//!
//! Every remote operation in the workspace goes through the [`RemoteExecutor`]
//! trait: run a shell command on a role's hosts, or move a file to/from them.
//! The production implementation ([`SshExecutor`]) shells out to the system
//! `ssh`/`scp` binaries; tests inject in-memory fakes.
//!
//! # Architecture
//!
//! ```text
//! RemoteExecutor (trait)
//!     │
//!     ▼
//! SshExecutor     ← resolves role → hosts from the fleet config
//!     │              builds `ssh <host> <command>` / `scp ...`
//!     ▼
//! process.rs      ← tokio subprocess, stdout/stderr captured concurrently
//!     │
//!     ▼
//! CommandOutput   ← exit code + captured streams; nonzero exit maps to
//!                   RemoteExecError::Command for checked runs
//! ```

pub mod error;
pub mod executor;
pub mod types;

pub(crate) mod process;

pub use error::{RemoteExecError, Result};
pub use executor::{RemoteExecutor, SshExecutor};
pub use types::CommandOutput;
