//! Orchestrator error types.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use tempest_core::ConfigError;
use tempest_provision::{ProvisionError, StorageError, TaskAborted};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("provisioning error: {0}")]
    Provision(#[from] ProvisionError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("discovery failed for cluster {cluster}: {reason}")]
    Discovery { cluster: String, reason: String },

    #[error("task {task} failed on {machine}: {detail}")]
    ScriptExecution {
        machine: String,
        task: String,
        detail: String,
    },

    #[error("task {task} on {machine} timed out after {timeout:?}")]
    ScriptTimeout {
        machine: String,
        task: String,
        timeout: Duration,
    },

    #[error(transparent)]
    Aborted(#[from] TaskAborted),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("writing attachment {path}: {source}")]
    AttachmentIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("serializing attachment: {0}")]
    AttachmentFormat(#[from] toml::ser::Error),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// A failure confined to one machine.
#[derive(Debug)]
pub struct MachineFailure {
    pub machine_id: String,
    pub error: OrchestratorError,
}
