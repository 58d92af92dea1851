//! The provisioning API seam.
//!
//! Everything tempest needs from a cloud provider goes through
//! [`Provisioner`]. The orchestrator holds it as `Arc<dyn Provisioner>`,
//! so production adapters and the in-memory test double are
//! interchangeable.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ProvisionResult;

/// Lifecycle state reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineStatus {
    Pending,
    Running,
    Stopped,
    Terminated,
}

/// A machine as the provider describes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MachineHandle {
    pub id: String,
    /// Group the machine was launched into; tempest uses the cluster name.
    pub group: String,
    pub status: MachineStatus,
    pub instance_type: String,
    pub image_id: String,
    pub region: Option<String>,
    pub zone: String,
    pub private_address: Option<String>,
    pub public_address: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl MachineHandle {
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn is_terminated(&self) -> bool {
        self.status == MachineStatus::Terminated
    }
}

/// Narrows [`Provisioner::list_machines`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineFilter {
    /// Case-insensitive group match.
    pub group: Option<String>,
    pub include_terminated: bool,
}

impl MachineFilter {
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            group: Some(name.into()),
            include_terminated: false,
        }
    }

    pub fn matches(&self, machine: &MachineHandle) -> bool {
        if machine.is_terminated() && !self.include_terminated {
            return false;
        }
        match &self.group {
            Some(group) => machine.group.eq_ignore_ascii_case(group),
            None => true,
        }
    }
}

/// Everything a `create_machines` call needs besides group and count.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MachineTemplate {
    pub instance_type: String,
    /// `None` lets the provider pick its default image.
    pub image_id: Option<String>,
    pub region: Option<String>,
    pub placement_group: Option<String>,
    pub login_user: String,
    pub inbound_ports: Vec<u16>,
    /// Script run once, as root, at first boot.
    pub init_script: String,
    pub metadata: BTreeMap<String, String>,
    /// Operator public key authorized for `login_user`.
    pub public_key: String,
    pub map_ephemeral_device: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeHandle {
    pub id: String,
    pub zone: String,
    pub size_gib: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VolumeState {
    Creating,
    Available,
    InUse,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HardwareProfile {
    pub id: String,
    pub cores: u32,
    pub memory_mib: u64,
}

/// How a script task is run on a machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOptions {
    pub name: String,
    pub run_as_root: bool,
    /// Upper bound enforced by the caller; `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl TaskOptions {
    pub fn as_root(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            run_as_root: true,
            timeout: None,
        }
    }

    pub fn as_user(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            run_as_root: false,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl TaskOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Operations tempest consumes from an elastic compute provider.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn list_machines(&self, filter: &MachineFilter) -> ProvisionResult<Vec<MachineHandle>>;

    /// Launch `count` identical machines into `group`.
    async fn create_machines(
        &self,
        group: &str,
        count: usize,
        template: &MachineTemplate,
    ) -> ProvisionResult<Vec<MachineHandle>>;

    /// Run `script` on a machine and wait for it to exit.
    async fn run_task(
        &self,
        machine_id: &str,
        script: &str,
        options: &TaskOptions,
    ) -> ProvisionResult<TaskOutput>;

    async fn create_volume(&self, zone: &str, size_gib: u32) -> ProvisionResult<VolumeHandle>;

    async fn describe_volume(&self, volume_id: &str) -> ProvisionResult<VolumeState>;

    async fn attach_volume(
        &self,
        volume_id: &str,
        machine_id: &str,
        device: &str,
    ) -> ProvisionResult<()>;

    async fn list_hardware_profiles(&self) -> ProvisionResult<Vec<HardwareProfile>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(group: &str, status: MachineStatus) -> MachineHandle {
        MachineHandle {
            id: "m-1".into(),
            group: group.into(),
            status,
            instance_type: "m1.small".into(),
            image_id: "ami-1".into(),
            region: None,
            zone: "us-east-1a".into(),
            private_address: None,
            public_address: None,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn filter_matches_group_case_insensitively() {
        let filter = MachineFilter::group("Prod");
        assert!(filter.matches(&machine("prod", MachineStatus::Running)));
        assert!(!filter.matches(&machine("staging", MachineStatus::Running)));
    }

    #[test]
    fn filter_skips_terminated_by_default() {
        let m = machine("prod", MachineStatus::Terminated);
        assert!(!MachineFilter::group("prod").matches(&m));
        let all = MachineFilter {
            include_terminated: true,
            ..MachineFilter::group("prod")
        };
        assert!(all.matches(&m));
    }
}
