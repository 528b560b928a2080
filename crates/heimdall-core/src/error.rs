use crate::types::ServiceState;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HeimdallError {
    #[error("service '{service}' did not reach {target} within {waited_ms}ms")]
    ServiceTimeout {
        service: String,
        target: ServiceState,
        waited_ms: u64,
    },

    #[error("service '{service}' is stuck: processes survived forced kill")]
    ServiceStuck { service: String },

    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    #[error("instance already registered: {0}")]
    InstanceExists(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("no data file for instance '{0}'")]
    DataMissing(String),

    #[error("remote path does not exist: {0}")]
    MissingRemotePath(String),

    #[error("checksum mismatch between {original} and {copy} (no space left on device?)")]
    ChecksumMismatch { original: String, copy: String },

    #[error(transparent)]
    Remote(#[from] remote_exec::RemoteExecError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, HeimdallError>;
