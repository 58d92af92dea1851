//! Launch one group of identical machines and prepare their storage.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tempest_core::{DAEMONS_TAG, RoleSet};
use tracing::{info, warn};

use crate::error::{ProvisionError, ProvisionResult, StorageError};
use crate::provider::{MachineHandle, MachineTemplate, Provisioner};
use crate::volume::VolumePoller;

/// Ports opened on every machine: ssh, nimbus thrift, ui, drpc,
/// logviewer, ganglia web, zookeeper client/peer/election, gmond.
pub const DEFAULT_INBOUND_PORTS: [u16; 11] =
    [22, 6627, 8080, 3772, 3773, 8000, 80, 2181, 2888, 3888, 8649];

/// Attached volume to create for each machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSpec {
    pub size_gib: u32,
    pub device: String,
}

/// One `create_machines` call's worth of machines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    /// Provider group; the cluster name.
    pub cluster: String,
    pub instance_type: String,
    pub roles: RoleSet,
    pub count: usize,
    pub image_id: Option<String>,
    pub region: Option<String>,
    pub placement_group: Option<String>,
    pub login_user: String,
    pub public_key: String,
    pub init_script: String,
    pub map_ephemeral_device: bool,
    pub storage: Option<StorageSpec>,
}

impl LaunchRequest {
    fn template(&self) -> MachineTemplate {
        let mut metadata = BTreeMap::new();
        metadata.insert(DAEMONS_TAG.to_string(), self.roles.to_tag());

        MachineTemplate {
            instance_type: self.instance_type.clone(),
            image_id: self.image_id.clone(),
            region: self.region.clone(),
            placement_group: self.placement_group.clone(),
            login_user: self.login_user.clone(),
            inbound_ports: DEFAULT_INBOUND_PORTS.to_vec(),
            init_script: self.init_script.clone(),
            metadata,
            public_key: self.public_key.clone(),
            map_ephemeral_device: self.map_ephemeral_device,
        }
    }
}

/// A launched machine and, if storage was requested and failed, why.
#[derive(Debug, Clone, Serialize)]
pub struct LaunchedMachine {
    pub machine: MachineHandle,
    pub volume_id: Option<String>,
    #[serde(skip)]
    pub storage_error: Option<StorageError>,
}

/// Launches groups against a [`Provisioner`].
#[derive(Clone)]
pub struct NodeLauncher {
    provider: Arc<dyn Provisioner>,
    poller: VolumePoller,
}

impl NodeLauncher {
    pub fn new(provider: Arc<dyn Provisioner>) -> Self {
        Self {
            provider,
            poller: VolumePoller::default(),
        }
    }

    pub fn with_poller(mut self, poller: VolumePoller) -> Self {
        self.poller = poller;
        self
    }

    pub fn provider(&self) -> &Arc<dyn Provisioner> {
        &self.provider
    }

    /// Launch `request.count` machines in one call, then prepare storage.
    ///
    /// The group fails as a whole only if the provider rejects the create
    /// call; storage problems are recorded per machine.
    pub async fn launch(&self, request: &LaunchRequest) -> ProvisionResult<Vec<LaunchedMachine>> {
        let template = request.template();
        let machines = match self
            .provider
            .create_machines(&request.cluster, request.count, &template)
            .await
        {
            Ok(machines) => machines,
            Err(e) => return Err(self.enrich(e).await),
        };

        info!(
            cluster = %request.cluster,
            instance_type = %request.instance_type,
            roles = %request.roles,
            count = machines.len(),
            "launched group"
        );

        let mut launched = Vec::with_capacity(machines.len());
        for machine in machines {
            let (volume_id, storage_error) = match &request.storage {
                Some(spec) if spec.size_gib > 0 => {
                    match self
                        .poller
                        .provision(self.provider.as_ref(), &machine, spec.size_gib, &spec.device)
                        .await
                    {
                        Ok(volume) => (Some(volume), None),
                        Err(e) => (None, Some(e)),
                    }
                }
                _ => (None, None),
            };
            launched.push(LaunchedMachine {
                machine,
                volume_id,
                storage_error,
            });
        }
        Ok(launched)
    }

    /// Attach the offered hardware profiles to an unknown-hardware error.
    async fn enrich(&self, error: ProvisionError) -> ProvisionError {
        match error {
            ProvisionError::UnknownHardware {
                requested,
                available,
            } if available.is_empty() => {
                let available = match self.provider.list_hardware_profiles().await {
                    Ok(profiles) => profiles.into_iter().map(|p| p.id).collect(),
                    Err(e) => {
                        warn!(error = %e, "listing hardware profiles failed");
                        Vec::new()
                    }
                };
                ProvisionError::UnknownHardware {
                    requested,
                    available,
                }
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::memory::{MemoryProvider, VolumeBehavior};

    fn request(instance_type: &str, count: usize, storage: Option<StorageSpec>) -> LaunchRequest {
        LaunchRequest {
            cluster: "prod".into(),
            instance_type: instance_type.into(),
            roles: RoleSet::parse_tokens("MASTER, UI").unwrap(),
            count,
            image_id: None,
            region: Some("eu-west-1".into()),
            placement_group: None,
            login_user: "ubuntu".into(),
            public_key: "ssh-rsa AAAA".into(),
            init_script: "#!/bin/bash\n".into(),
            map_ephemeral_device: false,
            storage,
        }
    }

    #[tokio::test]
    async fn one_call_per_group_with_daemons_tag() {
        let provider = Arc::new(MemoryProvider::new());
        let launcher = NodeLauncher::new(provider.clone());

        let launched = launcher.launch(&request("m1.medium", 2, None)).await.unwrap();
        assert_eq!(launched.len(), 2);
        assert!(launched.iter().all(|m| m.storage_error.is_none()));

        let calls = provider.created_groups().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].count, 2);
        assert_eq!(calls[0].group, "prod");
        assert_eq!(
            calls[0].template.metadata.get("daemons").map(String::as_str),
            Some("[coordinator, ui]")
        );
        assert_eq!(calls[0].template.inbound_ports, DEFAULT_INBOUND_PORTS.to_vec());
    }

    #[tokio::test]
    async fn unknown_hardware_lists_offered_profiles() {
        let launcher = NodeLauncher::new(Arc::new(MemoryProvider::new()));
        let err = launcher.launch(&request("x9.huge", 1, None)).await.unwrap_err();
        let ProvisionError::UnknownHardware { requested, available } = &err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(requested, "x9.huge");
        assert!(available.contains(&"m1.small".to_string()));
        assert!(err.to_string().contains("m1.large"));
    }

    #[tokio::test]
    async fn storage_failure_keeps_machine() {
        let provider = Arc::new(MemoryProvider::new().with_volume_behavior(VolumeBehavior::Never));
        let launcher = NodeLauncher::new(provider.clone())
            .with_poller(VolumePoller::new(3, Duration::ZERO));
        let spec = StorageSpec {
            size_gib: 50,
            device: "/dev/sdx".into(),
        };

        let launched = launcher.launch(&request("m1.small", 2, Some(spec))).await.unwrap();
        assert_eq!(launched.len(), 2);
        for m in &launched {
            assert!(matches!(
                m.storage_error,
                Some(StorageError::NotReady { attempts: 3, .. })
            ));
            assert!(m.volume_id.is_none());
        }
    }

    #[tokio::test]
    async fn volume_attached_in_machine_zone() {
        let provider = Arc::new(MemoryProvider::new());
        let launcher = NodeLauncher::new(provider.clone())
            .with_poller(VolumePoller::new(3, Duration::ZERO));
        let spec = StorageSpec {
            size_gib: 20,
            device: "/dev/sdx".into(),
        };

        let launched = launcher.launch(&request("m1.small", 1, Some(spec))).await.unwrap();
        assert_eq!(launched[0].volume_id.as_deref(), Some("vol-1"));
        assert_eq!(
            provider.attachments().await,
            vec![("vol-1".to_string(), "m-1".to_string(), "/dev/sdx".to_string())]
        );
    }
}
