//! In-memory provisioning provider.
//!
//! Deterministic stand-in for a cloud API: machine ids `m-N`, private
//! addresses `10.0.0.N`, zones `<region>a`. Every call is recorded so
//! tests can assert on what was launched and which scripts ran where.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{ProvisionError, ProvisionResult};
use crate::provider::{
    HardwareProfile, MachineFilter, MachineHandle, MachineStatus, MachineTemplate, Provisioner,
    TaskOptions, TaskOutput, VolumeHandle, VolumeState,
};

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_IMAGE: &str = "ami-tempest-base";

/// How created volumes respond to `describe_volume`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeBehavior {
    /// Available on the N-th describe call.
    ReadyAfter(u32),
    /// Stays in `Creating` forever.
    Never,
    /// Goes straight to `Error`.
    Fails,
}

/// One recorded `create_machines` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCall {
    pub group: String,
    pub count: usize,
    pub template: MachineTemplate,
    pub machine_ids: Vec<String>,
}

/// One recorded `run_task` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
    pub machine_id: String,
    pub name: String,
    pub script: String,
    pub run_as_root: bool,
}

#[derive(Debug)]
struct Volume {
    handle: VolumeHandle,
    polls: u32,
    attached_to: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    machines: Vec<MachineHandle>,
    volumes: BTreeMap<String, Volume>,
    next_machine: usize,
    next_volume: usize,
    created: Vec<CreateCall>,
    tasks: Vec<TaskRecord>,
    attachments: Vec<(String, String, String)>,
}

pub struct MemoryProvider {
    hardware: Vec<HardwareProfile>,
    known_images: Option<BTreeSet<String>>,
    volume_behavior: VolumeBehavior,
    stuck_volumes: BTreeSet<String>,
    failing_task_machines: BTreeSet<String>,
    task_latency: Duration,
    machine_quota: Option<usize>,
    state: Mutex<State>,
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self {
            hardware: default_hardware(),
            known_images: None,
            volume_behavior: VolumeBehavior::ReadyAfter(1),
            stuck_volumes: BTreeSet::new(),
            failing_task_machines: BTreeSet::new(),
            task_latency: Duration::ZERO,
            machine_quota: None,
            state: Mutex::new(State::default()),
        }
    }

    pub fn with_hardware(mut self, profiles: Vec<HardwareProfile>) -> Self {
        self.hardware = profiles;
        self
    }

    /// Only these image ids exist; others fail with `ImageNotFound`.
    pub fn with_images<I, S>(mut self, images: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_images = Some(images.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_volume_behavior(mut self, behavior: VolumeBehavior) -> Self {
        self.volume_behavior = behavior;
        self
    }

    /// This volume stays in `Creating` regardless of the behavior.
    pub fn with_stuck_volume(mut self, volume_id: impl Into<String>) -> Self {
        self.stuck_volumes.insert(volume_id.into());
        self
    }

    /// Tasks on this machine exit non-zero.
    pub fn with_failing_tasks_on(mut self, machine_id: impl Into<String>) -> Self {
        self.failing_task_machines.insert(machine_id.into());
        self
    }

    pub fn with_task_latency(mut self, latency: Duration) -> Self {
        self.task_latency = latency;
        self
    }

    /// Total live machines the account may hold.
    pub fn with_machine_quota(mut self, quota: usize) -> Self {
        self.machine_quota = Some(quota);
        self
    }

    /// Register a machine directly, bypassing `create_machines`.
    pub async fn insert_machine(&self, machine: MachineHandle) {
        self.state.lock().await.machines.push(machine);
    }

    pub async fn terminate(&self, machine_id: &str) -> ProvisionResult<()> {
        let mut state = self.state.lock().await;
        let machine = state
            .machines
            .iter_mut()
            .find(|m| m.id == machine_id)
            .ok_or_else(|| ProvisionError::MachineNotFound(machine_id.to_string()))?;
        machine.status = MachineStatus::Terminated;
        Ok(())
    }

    pub async fn created_groups(&self) -> Vec<CreateCall> {
        self.state.lock().await.created.clone()
    }

    pub async fn tasks(&self) -> Vec<TaskRecord> {
        self.state.lock().await.tasks.clone()
    }

    pub async fn tasks_on(&self, machine_id: &str) -> Vec<TaskRecord> {
        self.state
            .lock()
            .await
            .tasks
            .iter()
            .filter(|t| t.machine_id == machine_id)
            .cloned()
            .collect()
    }

    /// `(volume, machine, device)` triples in attach order.
    pub async fn attachments(&self) -> Vec<(String, String, String)> {
        self.state.lock().await.attachments.clone()
    }

    pub async fn machines(&self) -> Vec<MachineHandle> {
        self.state.lock().await.machines.clone()
    }
}

fn default_hardware() -> Vec<HardwareProfile> {
    [
        ("m1.small", 1, 1_740),
        ("m1.medium", 1, 3_840),
        ("m1.large", 2, 7_680),
        ("m1.xlarge", 4, 15_360),
        ("c1.xlarge", 8, 7_168),
    ]
    .into_iter()
    .map(|(id, cores, memory_mib)| HardwareProfile {
        id: id.to_string(),
        cores,
        memory_mib,
    })
    .collect()
}

#[async_trait]
impl Provisioner for MemoryProvider {
    async fn list_machines(&self, filter: &MachineFilter) -> ProvisionResult<Vec<MachineHandle>> {
        let state = self.state.lock().await;
        Ok(state
            .machines
            .iter()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect())
    }

    async fn create_machines(
        &self,
        group: &str,
        count: usize,
        template: &MachineTemplate,
    ) -> ProvisionResult<Vec<MachineHandle>> {
        if !self.hardware.iter().any(|h| h.id == template.instance_type) {
            // Raw API error; the launcher fills in the catalog.
            return Err(ProvisionError::UnknownHardware {
                requested: template.instance_type.clone(),
                available: Vec::new(),
            });
        }

        let image_id = template
            .image_id
            .clone()
            .unwrap_or_else(|| DEFAULT_IMAGE.to_string());
        if let Some(known) = &self.known_images
            && !known.contains(&image_id)
        {
            return Err(ProvisionError::ImageNotFound(image_id));
        }

        let mut state = self.state.lock().await;

        if let Some(quota) = self.machine_quota {
            let live = state.machines.iter().filter(|m| !m.is_terminated()).count();
            if live + count > quota {
                return Err(ProvisionError::QuotaExceeded(format!(
                    "{count} requested, {} of {quota} available",
                    quota.saturating_sub(live)
                )));
            }
        }

        let region = template.region.clone();
        let zone = format!("{}a", region.as_deref().unwrap_or(DEFAULT_REGION));

        let mut launched = Vec::with_capacity(count);
        for _ in 0..count {
            state.next_machine += 1;
            let n = state.next_machine;
            let machine = MachineHandle {
                id: format!("m-{n}"),
                group: group.to_string(),
                status: MachineStatus::Running,
                instance_type: template.instance_type.clone(),
                image_id: image_id.clone(),
                region: region.clone(),
                zone: zone.clone(),
                private_address: Some(format!("10.0.0.{n}")),
                public_address: Some(format!("203.0.113.{n}")),
                metadata: template.metadata.clone(),
            };
            state.machines.push(machine.clone());
            launched.push(machine);
        }

        state.created.push(CreateCall {
            group: group.to_string(),
            count,
            template: template.clone(),
            machine_ids: launched.iter().map(|m| m.id.clone()).collect(),
        });

        debug!(group, count, instance_type = %template.instance_type, "created machines");
        Ok(launched)
    }

    async fn run_task(
        &self,
        machine_id: &str,
        script: &str,
        options: &TaskOptions,
    ) -> ProvisionResult<TaskOutput> {
        {
            let mut state = self.state.lock().await;
            if !state.machines.iter().any(|m| m.id == machine_id && !m.is_terminated()) {
                return Err(ProvisionError::MachineNotFound(machine_id.to_string()));
            }
            state.tasks.push(TaskRecord {
                machine_id: machine_id.to_string(),
                name: options.name.clone(),
                script: script.to_string(),
                run_as_root: options.run_as_root,
            });
        }

        if !self.task_latency.is_zero() {
            tokio::time::sleep(self.task_latency).await;
        }

        if self.failing_task_machines.contains(machine_id) {
            return Ok(TaskOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: format!("{}: simulated failure", options.name),
            });
        }

        Ok(TaskOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        })
    }

    async fn create_volume(&self, zone: &str, size_gib: u32) -> ProvisionResult<VolumeHandle> {
        let mut state = self.state.lock().await;
        state.next_volume += 1;
        let handle = VolumeHandle {
            id: format!("vol-{}", state.next_volume),
            zone: zone.to_string(),
            size_gib,
        };
        state.volumes.insert(
            handle.id.clone(),
            Volume {
                handle: handle.clone(),
                polls: 0,
                attached_to: None,
            },
        );
        Ok(handle)
    }

    async fn describe_volume(&self, volume_id: &str) -> ProvisionResult<VolumeState> {
        let mut state = self.state.lock().await;
        let volume = state
            .volumes
            .get_mut(volume_id)
            .ok_or_else(|| ProvisionError::VolumeNotFound(volume_id.to_string()))?;

        if volume.attached_to.is_some() {
            return Ok(VolumeState::InUse);
        }
        volume.polls += 1;
        if self.stuck_volumes.contains(volume_id) {
            return Ok(VolumeState::Creating);
        }
        Ok(match self.volume_behavior {
            VolumeBehavior::ReadyAfter(n) if volume.polls >= n => VolumeState::Available,
            VolumeBehavior::ReadyAfter(_) | VolumeBehavior::Never => VolumeState::Creating,
            VolumeBehavior::Fails => VolumeState::Error,
        })
    }

    async fn attach_volume(
        &self,
        volume_id: &str,
        machine_id: &str,
        device: &str,
    ) -> ProvisionResult<()> {
        let mut state = self.state.lock().await;
        let machine_zone = state
            .machines
            .iter()
            .find(|m| m.id == machine_id)
            .map(|m| m.zone.clone())
            .ok_or_else(|| ProvisionError::MachineNotFound(machine_id.to_string()))?;

        let volume = state
            .volumes
            .get_mut(volume_id)
            .ok_or_else(|| ProvisionError::VolumeNotFound(volume_id.to_string()))?;
        if volume.handle.zone != machine_zone {
            return Err(ProvisionError::Api(format!(
                "volume {volume_id} is in {}, machine {machine_id} in {machine_zone}",
                volume.handle.zone
            )));
        }
        if volume.attached_to.is_some() {
            return Err(ProvisionError::Api(format!("volume {volume_id} already attached")));
        }
        volume.attached_to = Some(machine_id.to_string());

        state.attachments.push((
            volume_id.to_string(),
            machine_id.to_string(),
            device.to_string(),
        ));
        Ok(())
    }

    async fn list_hardware_profiles(&self) -> ProvisionResult<Vec<HardwareProfile>> {
        Ok(self.hardware.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(instance_type: &str) -> MachineTemplate {
        MachineTemplate {
            instance_type: instance_type.into(),
            region: Some("eu-west-1".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn ids_and_addresses_are_sequential() {
        let provider = MemoryProvider::new();
        let first = provider.create_machines("c", 2, &template("m1.small")).await.unwrap();
        let second = provider.create_machines("c", 1, &template("m1.large")).await.unwrap();

        let ids: Vec<_> = first.iter().chain(&second).map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m-1", "m-2", "m-3"]);
        assert_eq!(second[0].private_address.as_deref(), Some("10.0.0.3"));
        assert_eq!(second[0].zone, "eu-west-1a");
        assert_eq!(second[0].image_id, DEFAULT_IMAGE);
    }

    #[tokio::test]
    async fn unknown_hardware_is_reported_raw() {
        let provider = MemoryProvider::new();
        let err = provider
            .create_machines("c", 1, &template("x9.huge"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::UnknownHardware { ref requested, ref available }
                if requested == "x9.huge" && available.is_empty()
        ));
    }

    #[tokio::test]
    async fn quota_counts_live_machines() {
        let provider = MemoryProvider::new().with_machine_quota(2);
        provider.create_machines("c", 2, &template("m1.small")).await.unwrap();
        let err = provider.create_machines("c", 1, &template("m1.small")).await.unwrap_err();
        assert!(matches!(err, ProvisionError::QuotaExceeded(_)));

        provider.terminate("m-1").await.unwrap();
        provider.create_machines("c", 1, &template("m1.small")).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_image_is_rejected() {
        let provider = MemoryProvider::new().with_images(["ami-1"]);
        let mut t = template("m1.small");
        t.image_id = Some("ami-2".into());
        let err = provider.create_machines("c", 1, &t).await.unwrap_err();
        assert!(matches!(err, ProvisionError::ImageNotFound(ref id) if id == "ami-2"));
    }

    #[tokio::test]
    async fn tasks_are_recorded_and_can_fail() {
        let provider = MemoryProvider::new().with_failing_tasks_on("m-2");
        provider.create_machines("c", 2, &template("m1.small")).await.unwrap();

        let ok = provider
            .run_task("m-1", "echo hi", &TaskOptions::as_user("setup"))
            .await
            .unwrap();
        let failed = provider
            .run_task("m-2", "echo hi", &TaskOptions::as_root("setup"))
            .await
            .unwrap();
        assert!(ok.success());
        assert!(!failed.success());

        let tasks = provider.tasks().await;
        assert_eq!(tasks.len(), 2);
        assert!(!tasks[0].run_as_root);
        assert!(tasks[1].run_as_root);
    }

    #[tokio::test]
    async fn attach_requires_matching_zone() {
        let provider = MemoryProvider::new();
        let m = provider.create_machines("c", 1, &template("m1.small")).await.unwrap();
        let vol = provider.create_volume("us-west-2a", 10).await.unwrap();
        let err = provider.attach_volume(&vol.id, &m[0].id, "/dev/sdx").await.unwrap_err();
        assert!(matches!(err, ProvisionError::Api(_)));
    }
}
