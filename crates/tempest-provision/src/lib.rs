//! tempest-provision: the cloud API seam and node launching.
//!
//! [`Provisioner`] is the only way tempest talks to a provider.
//! [`NodeLauncher`] turns one launch group into one `create_machines`
//! call (tagging every machine with its `daemons` roles) and prepares
//! attached volumes. [`LaunchPool`] runs many launches with bounded
//! concurrency and collects one outcome per group.
//!
//! [`memory::MemoryProvider`] implements the trait in memory for tests
//! and dry runs.

pub mod error;
pub mod launcher;
pub mod memory;
pub mod pool;
pub mod provider;
pub mod volume;

pub use error::{ProvisionError, ProvisionResult, StorageError};
pub use launcher::{DEFAULT_INBOUND_PORTS, LaunchRequest, LaunchedMachine, NodeLauncher, StorageSpec};
pub use memory::MemoryProvider;
pub use pool::{GroupOutcome, LaunchPool, TaskAborted};
pub use provider::{
    HardwareProfile, MachineFilter, MachineHandle, MachineStatus, MachineTemplate, Provisioner,
    TaskOptions, TaskOutput, VolumeHandle, VolumeState,
};
pub use volume::VolumePoller;
