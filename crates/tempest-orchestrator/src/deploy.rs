//! Fresh cluster deployment.
//!
//! Groups are launched concurrently with identity-only init scripts. Once
//! every launch has been joined, the real private addresses are known, so
//! the shared root, user and start sequences are built once from them and
//! run on every machine.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use tempest_core::{
    ClusterConfiguration, Credentials, KeyMaterial, LaunchGroup, NodeId, Role, RoleAssignment,
    RoleSet,
};
use tempest_provision::{
    LaunchPool, LaunchRequest, LaunchedMachine, MachineHandle, NodeLauncher, ProvisionError,
    ProvisionResult,
};
use tempest_script::{BootScriptBuilder, HostRef, ScriptTopology};

use crate::attach::Attachment;
use crate::discover::discover;
use crate::error::{MachineFailure, OrchestratorError, OrchestratorResult};
use crate::reconciler::DEFAULT_TASK_TIMEOUT;
use crate::request::launch_request;
use crate::tasks::{ScriptTask, run_tasks};

/// A launched machine and the declaration slot it fills.
#[derive(Debug, Clone)]
pub struct DeployedMachine {
    pub node_id: NodeId,
    pub machine: MachineHandle,
    pub volume_id: Option<String>,
}

/// What happened to one launch unit.
#[derive(Debug)]
pub struct GroupReport {
    pub key: String,
    pub instance_type: String,
    pub roles: RoleSet,
    pub node_ids: Vec<NodeId>,
    pub result: OrchestratorResult<Vec<DeployedMachine>>,
}

/// A declared node id the provider never returned a machine for.
#[derive(Debug)]
pub struct UnfilledNode {
    pub node_id: NodeId,
    pub group: String,
    pub error: OrchestratorError,
}

#[derive(Debug)]
pub struct DeploymentReport {
    pub cluster: String,
    /// One entry per launch unit, in node-id order.
    pub groups: Vec<GroupReport>,
    /// Node ids missing from a short launch.
    pub unfilled: Vec<UnfilledNode>,
    /// Storage and setup failures on machines that were launched.
    pub machine_failures: Vec<MachineFailure>,
    /// Set when setup could not start at all, e.g. the coordinator's group failed.
    pub setup_error: Option<OrchestratorError>,
    pub attachment: Option<PathBuf>,
    /// Post-setup discovery or attachment write failure.
    pub attachment_error: Option<OrchestratorError>,
}

impl DeploymentReport {
    pub fn machines(&self) -> impl Iterator<Item = &DeployedMachine> {
        self.groups
            .iter()
            .filter_map(|g| g.result.as_ref().ok())
            .flatten()
    }

    pub fn failed_groups(&self) -> impl Iterator<Item = &GroupReport> {
        self.groups.iter().filter(|g| g.result.is_err())
    }

    /// True when every declared node launched, was set up, and the
    /// attachment (if requested) was written.
    pub fn is_complete(&self) -> bool {
        self.failed_groups().next().is_none()
            && self.unfilled.is_empty()
            && self.machine_failures.is_empty()
            && self.setup_error.is_none()
            && self.attachment_error.is_none()
    }
}

/// One `create_machines` call and the node ids it fills.
struct LaunchUnit {
    key: String,
    group: LaunchGroup,
    node_ids: Vec<NodeId>,
    request: LaunchRequest,
}

pub struct Deployer {
    launcher: NodeLauncher,
    credentials: Credentials,
    keys: KeyMaterial,
    parallelism: usize,
    task_timeout: Duration,
    attachment_dir: Option<PathBuf>,
}

impl Deployer {
    pub fn new(launcher: NodeLauncher, credentials: Credentials, keys: KeyMaterial) -> Self {
        Self {
            launcher,
            credentials,
            keys,
            parallelism: tempest_provision::pool::DEFAULT_PARALLELISM,
            task_timeout: DEFAULT_TASK_TIMEOUT,
            attachment_dir: None,
        }
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn with_attachment_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.attachment_dir = Some(dir.into());
        self
    }

    /// Deploy every slot of `config`.
    ///
    /// Configuration errors abort before any provider call. Everything
    /// after that is reported per group or per machine.
    pub async fn deploy(&self, config: &ClusterConfiguration) -> OrchestratorResult<DeploymentReport> {
        config.validate()?;
        let assignment = RoleAssignment::new(config);

        // Identity commands do not depend on addresses.
        let placeholders = ScriptTopology::from_assignment(&assignment)?;
        let identity = BootScriptBuilder::new(config, &self.credentials, &self.keys, &placeholders)?;

        let units = self.launch_units(config, &assignment, &identity);
        info!(cluster = config.name(), units = units.len(), "launching cluster");

        let mut pool: LaunchPool<ProvisionResult<Vec<LaunchedMachine>>> =
            LaunchPool::new(self.parallelism);
        let mut pending = Vec::with_capacity(units.len());
        for unit in units {
            let launcher = self.launcher.clone();
            let request = unit.request;
            pool.spawn(unit.key.clone(), async move { launcher.launch(&request).await });
            pending.push((unit.key, unit.group, unit.node_ids));
        }

        let mut groups = Vec::with_capacity(pending.len());
        let mut machine_failures = Vec::new();
        let mut unfilled = Vec::new();
        for ((key, group, node_ids), outcome) in pending.into_iter().zip(pool.join_all().await) {
            let result = match outcome.result {
                Ok(Ok(launched)) => Ok(assign_nodes(
                    &key,
                    &node_ids,
                    launched,
                    &mut unfilled,
                    &mut machine_failures,
                )),
                Ok(Err(e)) => Err(e.into()),
                Err(aborted) => Err(aborted.into()),
            };
            if let Err(e) = &result {
                warn!(group = %key, error = %e, "group launch failed");
            }
            groups.push(GroupReport {
                key,
                instance_type: group.instance_type,
                roles: group.roles,
                node_ids,
                result,
            });
        }

        let mut report = DeploymentReport {
            cluster: config.name().to_string(),
            groups,
            unfilled,
            machine_failures,
            setup_error: None,
            attachment: None,
            attachment_error: None,
        };

        let setup = match self.live_topology(config, &assignment, &report) {
            Ok(topology) => self.set_up(config, &topology, &mut report).await,
            Err(e) => Err(e),
        };
        if let Err(e) = setup {
            warn!(cluster = config.name(), error = %e, "skipping setup");
            report.setup_error = Some(e);
            return Ok(report);
        }

        if let Some(dir) = &self.attachment_dir {
            let written = match discover(self.launcher.provider().as_ref(), config.name()).await {
                Ok(live) => Attachment::from_topology(&live).and_then(|a| a.write(dir)),
                Err(e) => Err(e),
            };
            match written {
                Ok(path) => report.attachment = Some(path),
                Err(e) => {
                    warn!(cluster = config.name(), error = %e, "attachment not written");
                    report.attachment_error = Some(e);
                }
            }
        }

        info!(
            cluster = config.name(),
            machines = report.machines().count(),
            failed_groups = report.failed_groups().count(),
            unfilled = report.unfilled.len(),
            failed_machines = report.machine_failures.len(),
            "deployment finished"
        );
        Ok(report)
    }

    /// Split launch groups into provider calls.
    ///
    /// Coordination members each need their own `myid`, which is written
    /// by the init script, so groups containing them launch one node per
    /// call. Other groups launch in a single call.
    fn launch_units(
        &self,
        config: &ClusterConfiguration,
        assignment: &RoleAssignment,
        identity: &BootScriptBuilder<'_>,
    ) -> Vec<LaunchUnit> {
        let mut units = Vec::new();
        for group in assignment.launch_groups() {
            let unit = |node_ids: Vec<NodeId>, member_id: Option<u32>| {
                let init = identity
                    .identity_commands(&group.roles, &group.instance_type, member_id)
                    .render();
                let key = LaunchGroup {
                    node_ids: node_ids.clone(),
                    ..group.clone()
                }
                .key();
                LaunchUnit {
                    key,
                    group: group.clone(),
                    request: launch_request(
                        config,
                        &self.keys,
                        &group.instance_type,
                        group.roles.clone(),
                        node_ids.len(),
                        init,
                    ),
                    node_ids,
                }
            };

            if group.roles.contains(Role::CoordinationMember) {
                for &node_id in &group.node_ids {
                    units.push(unit(vec![node_id], assignment.coordination_member_id(node_id)));
                }
            } else {
                units.push(unit(group.node_ids.clone(), None));
            }
        }
        units
    }

    /// Addresses for script generation from the machines that launched.
    ///
    /// Coordinator and ui must be up. A member whose launch failed keeps a
    /// placeholder so the remaining members' server ids still match.
    fn live_topology(
        &self,
        config: &ClusterConfiguration,
        assignment: &RoleAssignment,
        report: &DeploymentReport,
    ) -> OrchestratorResult<ScriptTopology> {
        let addresses: BTreeMap<NodeId, String> = report
            .machines()
            .filter_map(|m| m.machine.private_address.clone().map(|a| (m.node_id, a)))
            .collect();
        let host = |id: NodeId| match addresses.get(&id) {
            Some(addr) => HostRef::Address(addr.clone()),
            None => HostRef::Placeholder(id),
        };
        let required = |role: Role| {
            assignment
                .node_ids_with_role(role)
                .into_iter()
                .find(|id| addresses.contains_key(id))
                .map(host)
                .ok_or_else(|| OrchestratorError::Discovery {
                    cluster: config.name().to_string(),
                    reason: format!("no {role} machine was launched"),
                })
        };

        let members: Vec<HostRef> = assignment.coordination_members().into_iter().map(host).collect();
        for member in &members {
            if let HostRef::Placeholder(id) = member {
                warn!(cluster = config.name(), node_id = id, "coordination member missing from ensemble");
            }
        }

        Ok(ScriptTopology {
            coordinator: required(Role::Coordinator)?,
            ui: required(Role::Ui)?,
            coordination_members: members,
            drpc_nodes: assignment
                .node_ids_with_role(Role::Drpc)
                .into_iter()
                .filter(|id| addresses.contains_key(id))
                .map(host)
                .collect(),
        })
    }

    /// Run root, user and start sequences on every launched machine.
    async fn set_up(
        &self,
        config: &ClusterConfiguration,
        topology: &ScriptTopology,
        report: &mut DeploymentReport,
    ) -> OrchestratorResult<()> {
        let builder = BootScriptBuilder::new(config, &self.credentials, &self.keys, topology)?;
        let tasks: Arc<[ScriptTask]> = vec![
            ScriptTask::from(&builder.root_phase()),
            ScriptTask::from(&builder.user_phase()),
            ScriptTask::from(&builder.start_sequence()),
        ]
        .into();

        let mut pool = LaunchPool::new(self.parallelism);
        for deployed in report.machines() {
            pool.spawn(
                deployed.machine.id.clone(),
                run_tasks(
                    Arc::clone(self.launcher.provider()),
                    deployed.machine.id.clone(),
                    Arc::clone(&tasks),
                    Some(self.task_timeout),
                ),
            );
        }

        for outcome in pool.join_all().await {
            let error = match outcome.result {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(aborted) => aborted.into(),
            };
            warn!(machine = %outcome.key, error = %error, "machine setup failed");
            report.machine_failures.push(MachineFailure {
                machine_id: outcome.key,
                error,
            });
        }
        Ok(())
    }
}

/// Pair launched machines with node ids.
///
/// Storage failures are recorded per machine. Node ids left over after a
/// short launch are recorded as unfilled.
fn assign_nodes(
    key: &str,
    node_ids: &[NodeId],
    launched: Vec<LaunchedMachine>,
    unfilled: &mut Vec<UnfilledNode>,
    failures: &mut Vec<MachineFailure>,
) -> Vec<DeployedMachine> {
    let (requested, returned) = (node_ids.len(), launched.len());
    if returned > requested {
        warn!(group = key, requested, returned, "provider returned surplus machines");
    }
    for &node_id in node_ids.iter().skip(returned) {
        warn!(group = key, node_id, requested, returned, "node was not launched");
        unfilled.push(UnfilledNode {
            node_id,
            group: key.to_string(),
            error: ProvisionError::Api(format!(
                "provider returned {returned} of {requested} machines"
            ))
            .into(),
        });
    }

    node_ids
        .iter()
        .zip(launched)
        .map(|(&node_id, launched)| {
            if let Some(e) = launched.storage_error {
                warn!(node_id, machine = %launched.machine.id, error = %e, "machine has no attached volume");
                failures.push(MachineFailure {
                    machine_id: launched.machine.id.clone(),
                    error: e.into(),
                });
            }
            DeployedMachine {
                node_id,
                machine: launched.machine,
                volume_id: launched.volume_id,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempest_provision::MemoryProvider;

    fn config() -> ClusterConfiguration {
        ClusterConfiguration::from_lines(
            "prod",
            [
                "storm-version 1.0.2",
                "zk-version 3.4.6",
                "m1.medium {MASTER, UI}",
                "m1.small {ZK}",
                "m1.small {ZK}",
                "m1.small {WORKER}",
                "m1.small {WORKER}",
            ]
            .map(String::from)
            .to_vec(),
        )
        .unwrap()
    }

    fn deployer() -> Deployer {
        Deployer::new(
            NodeLauncher::new(Arc::new(MemoryProvider::new())),
            Credentials::default(),
            KeyMaterial::default(),
        )
    }

    #[test]
    fn members_launch_one_per_call() {
        let config = config();
        let assignment = RoleAssignment::new(&config);
        let placeholders = ScriptTopology::from_assignment(&assignment).unwrap();
        let (creds, keys) = (Credentials::default(), KeyMaterial::default());
        let identity = BootScriptBuilder::new(&config, &creds, &keys, &placeholders).unwrap();

        let units = deployer().launch_units(&config, &assignment, &identity);
        let shape: Vec<(Vec<NodeId>, usize)> =
            units.iter().map(|u| (u.node_ids.clone(), u.request.count)).collect();
        assert_eq!(
            shape,
            vec![(vec![2], 1), (vec![3], 1), (vec![4], 1), (vec![5, 6], 2)]
        );
        assert!(units[1].request.init_script.contains("echo 1 > /home/ubuntu/zookeeper-data/myid"));
        assert!(units[2].request.init_script.contains("echo 2 > /home/ubuntu/zookeeper-data/myid"));
        assert!(!units[3].request.init_script.contains("myid"));
    }
}
