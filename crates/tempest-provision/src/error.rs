//! Provisioning error types.

use thiserror::Error;

/// Errors returned by the provisioning API or the launcher.
#[derive(Debug, Clone, Error)]
pub enum ProvisionError {
    #[error("unknown hardware profile {requested}; offered profiles: [{}]", available.join(", "))]
    UnknownHardware {
        requested: String,
        available: Vec<String>,
    },

    #[error("image not found: {0}")]
    ImageNotFound(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("machine not found: {0}")]
    MachineNotFound(String),

    #[error("volume not found: {0}")]
    VolumeNotFound(String),

    #[error("provider error: {0}")]
    Api(String),
}

pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Per-machine failures while preparing an attached volume.
///
/// These never fail the launch of the group; the machine is reported
/// with the error attached.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("creating volume for {machine}: {source}")]
    Create {
        machine: String,
        source: ProvisionError,
    },

    #[error("volume {volume} for {machine} not available after {attempts} polls")]
    NotReady {
        machine: String,
        volume: String,
        attempts: u32,
    },

    #[error("volume {volume} for {machine} entered the error state")]
    Failed { machine: String, volume: String },

    #[error("volume {volume} for {machine} is already attached elsewhere")]
    AlreadyAttached { machine: String, volume: String },

    #[error("polling volume {volume} for {machine}: {source}")]
    Describe {
        machine: String,
        volume: String,
        source: ProvisionError,
    },

    #[error("attaching volume {volume} to {machine}: {source}")]
    Attach {
        machine: String,
        volume: String,
        source: ProvisionError,
    },
}
