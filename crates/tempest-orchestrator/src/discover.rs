//! Live topology discovery from provider metadata.
//!
//! The `daemons` tag on each machine is the only durable record of what a
//! machine is for. Discovery lists the cluster's machines, parses the tag,
//! and classifies machines by role. Nothing is cached: running discovery
//! again after a launch simply sees more machines.

use serde::Serialize;
use tracing::{debug, warn};

use tempest_core::{DAEMONS_TAG, Role, RoleSet};
use tempest_provision::{MachineFilter, MachineHandle, Provisioner};
use tempest_script::ScriptTopology;

use crate::error::{OrchestratorError, OrchestratorResult};

/// A discovered machine and its parsed roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveMachine {
    pub machine: MachineHandle,
    pub roles: RoleSet,
}

impl LiveMachine {
    pub fn id(&self) -> &str {
        &self.machine.id
    }

    pub fn private_address(&self) -> Option<&str> {
        self.machine.private_address.as_deref()
    }
}

/// The cluster as the provider currently sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LiveTopology {
    pub cluster: String,
    pub coordinator: Option<LiveMachine>,
    pub ui: Option<LiveMachine>,
    pub coordination_members: Vec<LiveMachine>,
    pub drpc_nodes: Vec<LiveMachine>,
    pub workers: Vec<LiveMachine>,
    pub log_viewers: Vec<LiveMachine>,
    /// Image of the first discovered machine; default for scale-out.
    pub image_id: Option<String>,
    /// Region of the first discovered machine; default for scale-out.
    pub region: Option<String>,
}

impl LiveTopology {
    /// Classify `machines`, keeping only live members of `cluster` that
    /// carry a parseable `daemons` tag.
    pub fn from_machines(cluster: &str, machines: impl IntoIterator<Item = MachineHandle>) -> Self {
        let mut topology = LiveTopology {
            cluster: cluster.to_string(),
            ..Default::default()
        };

        for machine in machines {
            if machine.is_terminated() || !machine.group.eq_ignore_ascii_case(cluster) {
                continue;
            }
            let Some(tag) = machine.metadata(DAEMONS_TAG) else {
                continue;
            };
            let roles = match RoleSet::from_tag(tag) {
                Ok(roles) => roles,
                Err(token) => {
                    warn!(machine = %machine.id, token = %token, "ignoring machine with unknown role in daemons tag");
                    continue;
                }
            };

            if topology.image_id.is_none() {
                topology.image_id = Some(machine.image_id.clone());
            }
            if topology.region.is_none() {
                topology.region = machine.region.clone();
            }

            let live = LiveMachine { machine, roles };
            if live.roles.contains(Role::Coordinator) && topology.coordinator.is_none() {
                topology.coordinator = Some(live.clone());
            }
            if live.roles.contains(Role::Ui) && topology.ui.is_none() {
                topology.ui = Some(live.clone());
            }
            if live.roles.contains(Role::CoordinationMember) {
                topology.coordination_members.push(live.clone());
            }
            if live.roles.contains(Role::Drpc) {
                topology.drpc_nodes.push(live.clone());
            }
            if live.roles.contains(Role::LogViewer) {
                topology.log_viewers.push(live.clone());
            }
            if live.roles.contains(Role::Worker) {
                topology.workers.push(live);
            }
        }

        debug!(
            cluster,
            coordinator = topology.coordinator.is_some(),
            ui = topology.ui.is_some(),
            members = topology.coordination_members.len(),
            workers = topology.workers.len(),
            "discovered topology"
        );
        topology
    }

    fn missing(&self, what: &str) -> OrchestratorError {
        OrchestratorError::Discovery {
            cluster: self.cluster.clone(),
            reason: format!("no {what} machine found"),
        }
    }

    pub fn require_coordinator(&self) -> OrchestratorResult<&LiveMachine> {
        self.coordinator.as_ref().ok_or_else(|| self.missing("coordinator"))
    }

    pub fn require_ui(&self) -> OrchestratorResult<&LiveMachine> {
        self.ui.as_ref().ok_or_else(|| self.missing("ui"))
    }

    pub fn is_empty(&self) -> bool {
        self.coordinator.is_none()
            && self.ui.is_none()
            && self.coordination_members.is_empty()
            && self.drpc_nodes.is_empty()
            && self.workers.is_empty()
            && self.log_viewers.is_empty()
    }

    /// Worker machine ids, in discovery order.
    pub fn worker_ids(&self) -> Vec<&str> {
        self.workers.iter().map(LiveMachine::id).collect()
    }

    /// Resolved addresses for script generation.
    pub fn script_topology(&self) -> OrchestratorResult<ScriptTopology> {
        let address = |m: &LiveMachine| {
            m.private_address().map(str::to_string).ok_or_else(|| {
                OrchestratorError::Discovery {
                    cluster: self.cluster.clone(),
                    reason: format!("machine {} has no private address", m.id()),
                }
            })
        };

        let coordinator = address(self.require_coordinator()?)?;
        let ui = address(self.require_ui()?)?;
        let members = self
            .coordination_members
            .iter()
            .map(address)
            .collect::<OrchestratorResult<Vec<_>>>()?;
        let drpc = self
            .drpc_nodes
            .iter()
            .map(address)
            .collect::<OrchestratorResult<Vec<_>>>()?;

        Ok(ScriptTopology::from_addresses(coordinator, ui, members, drpc))
    }
}

/// List the provider's machines and classify those belonging to `cluster`.
pub async fn discover(provider: &dyn Provisioner, cluster: &str) -> OrchestratorResult<LiveTopology> {
    let machines = provider.list_machines(&MachineFilter::group(cluster)).await?;
    Ok(LiveTopology::from_machines(cluster, machines))
}
