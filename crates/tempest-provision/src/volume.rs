//! Attached-volume preparation with bounded readiness polling.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::StorageError;
use crate::provider::{MachineHandle, Provisioner, VolumeState};

/// Default number of readiness polls before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;
/// Default delay between readiness polls.
pub const DEFAULT_POLL_DELAY: Duration = Duration::from_secs(5);

/// Polls a volume until it is available, a fixed number of times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumePoller {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for VolumePoller {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_POLL_DELAY,
        }
    }
}

impl VolumePoller {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Wait until `volume_id` reports [`VolumeState::Available`].
    pub async fn wait_available(
        &self,
        provider: &dyn Provisioner,
        machine_id: &str,
        volume_id: &str,
    ) -> Result<(), StorageError> {
        for attempt in 1..=self.max_attempts {
            let state = provider.describe_volume(volume_id).await.map_err(|source| {
                StorageError::Describe {
                    machine: machine_id.to_string(),
                    volume: volume_id.to_string(),
                    source,
                }
            })?;

            match state {
                VolumeState::Available => {
                    debug!(volume = volume_id, attempt, "volume available");
                    return Ok(());
                }
                VolumeState::Error => {
                    return Err(StorageError::Failed {
                        machine: machine_id.to_string(),
                        volume: volume_id.to_string(),
                    });
                }
                VolumeState::InUse => {
                    return Err(StorageError::AlreadyAttached {
                        machine: machine_id.to_string(),
                        volume: volume_id.to_string(),
                    });
                }
                VolumeState::Creating => {
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.delay).await;
                    }
                }
            }
        }

        Err(StorageError::NotReady {
            machine: machine_id.to_string(),
            volume: volume_id.to_string(),
            attempts: self.max_attempts,
        })
    }

    /// Create a volume in the machine's zone, wait for it, and attach it.
    pub async fn provision(
        &self,
        provider: &dyn Provisioner,
        machine: &MachineHandle,
        size_gib: u32,
        device: &str,
    ) -> Result<String, StorageError> {
        let result = self.provision_inner(provider, machine, size_gib, device).await;
        if let Err(e) = &result {
            warn!(machine = %machine.id, error = %e, "volume preparation failed");
        }
        result
    }

    async fn provision_inner(
        &self,
        provider: &dyn Provisioner,
        machine: &MachineHandle,
        size_gib: u32,
        device: &str,
    ) -> Result<String, StorageError> {
        let volume = provider
            .create_volume(&machine.zone, size_gib)
            .await
            .map_err(|source| StorageError::Create {
                machine: machine.id.clone(),
                source,
            })?;

        self.wait_available(provider, &machine.id, &volume.id).await?;

        provider
            .attach_volume(&volume.id, &machine.id, device)
            .await
            .map_err(|source| StorageError::Attach {
                machine: machine.id.clone(),
                volume: volume.id.clone(),
                source,
            })?;

        debug!(machine = %machine.id, volume = %volume.id, device, "volume attached");
        Ok(volume.id)
    }
}
