//! Topology reconciliation: discovery and worker scale-out.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use tempest_core::{ClusterConfiguration, Credentials, KeyMaterial, Role, RoleSet};
use tempest_provision::{LaunchPool, MachineHandle, NodeLauncher};
use tempest_script::BootScriptBuilder;

use crate::attach::Attachment;
use crate::discover::{LiveTopology, discover};
use crate::error::{MachineFailure, OrchestratorError, OrchestratorResult};
use crate::request::launch_request;
use crate::tasks::{ScriptTask, run_tasks};

/// Default upper bound on each post-boot setup task.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Outcome of [`TopologyReconciler::add_workers`].
#[derive(Debug)]
pub struct ScaleOutReport {
    /// Every machine the provider launched, including ones that failed setup.
    pub added: Vec<MachineHandle>,
    pub failures: Vec<MachineFailure>,
    /// Discovery re-run after setup, or the pre-launch view if that failed.
    pub topology: LiveTopology,
    pub attachment: Option<PathBuf>,
    /// Post-setup discovery or attachment write failure.
    pub attachment_error: Option<OrchestratorError>,
}

impl ScaleOutReport {
    /// Added machines that came up without any failure.
    pub fn healthy(&self) -> impl Iterator<Item = &MachineHandle> {
        self.added
            .iter()
            .filter(|m| !self.failures.iter().any(|f| f.machine_id == m.id))
    }
}

/// Reads a running cluster's topology and grows it.
pub struct TopologyReconciler {
    launcher: NodeLauncher,
    config: ClusterConfiguration,
    credentials: Credentials,
    keys: KeyMaterial,
    task_timeout: Duration,
    parallelism: usize,
    attachment_dir: Option<PathBuf>,
}

impl TopologyReconciler {
    pub fn new(
        launcher: NodeLauncher,
        config: ClusterConfiguration,
        credentials: Credentials,
        keys: KeyMaterial,
    ) -> Self {
        Self {
            launcher,
            config,
            credentials,
            keys,
            task_timeout: DEFAULT_TASK_TIMEOUT,
            parallelism: tempest_provision::pool::DEFAULT_PARALLELISM,
            attachment_dir: None,
        }
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Refresh `<dir>/<cluster>.toml` after every scale-out.
    pub fn with_attachment_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.attachment_dir = Some(dir.into());
        self
    }

    pub fn cluster(&self) -> &str {
        self.config.name()
    }

    pub async fn discover(&self) -> OrchestratorResult<LiveTopology> {
        discover(self.launcher.provider().as_ref(), self.cluster()).await
    }

    /// Launch `count` workers wired to the running coordinator.
    ///
    /// Fails before any machine is created if the cluster has no
    /// coordinator or ui. Once machines exist, setup failures on them and
    /// failures to refresh the topology are reported, not raised.
    pub async fn add_workers(
        &self,
        count: usize,
        instance_type: &str,
    ) -> OrchestratorResult<ScaleOutReport> {
        if count == 0 {
            return Err(OrchestratorError::InvalidRequest(
                "worker count must be at least 1".to_string(),
            ));
        }

        let before = self.discover().await?;
        let coordinator = before.require_coordinator()?;
        before.require_ui()?;
        let topology = before.script_topology()?;

        info!(
            cluster = self.cluster(),
            coordinator = coordinator.id(),
            count,
            instance_type,
            "adding workers"
        );

        let builder = BootScriptBuilder::new(&self.config, &self.credentials, &self.keys, &topology)?;
        let roles: RoleSet = [Role::Worker].into_iter().collect();

        let mut request = launch_request(
            &self.config,
            &self.keys,
            instance_type,
            roles.clone(),
            count,
            builder.init_script(&roles, instance_type, None).render(),
        );
        request.image_id = before.image_id.clone().or(request.image_id);
        request.region = before.region.clone().or(request.region);

        let launched = self.launcher.launch(&request).await?;

        let tasks: Arc<[ScriptTask]> = vec![
            ScriptTask::from(&builder.user_phase()),
            ScriptTask::from(&builder.start_sequence()),
        ]
        .into();

        let mut failures = Vec::new();
        let mut pool = LaunchPool::new(self.parallelism);
        for machine in &launched {
            if let Some(e) = &machine.storage_error {
                warn!(machine = %machine.machine.id, error = %e, "worker has no attached volume");
                failures.push(MachineFailure {
                    machine_id: machine.machine.id.clone(),
                    error: e.clone().into(),
                });
            }
            pool.spawn(
                machine.machine.id.clone(),
                run_tasks(
                    Arc::clone(self.launcher.provider()),
                    machine.machine.id.clone(),
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
            warn!(machine = %outcome.key, error = %error, "worker setup failed");
            failures.push(MachineFailure {
                machine_id: outcome.key,
                error,
            });
        }

        let (topology, attachment) = match self.discover().await {
            Ok(after) => {
                let attachment = match &self.attachment_dir {
                    Some(dir) => Attachment::from_topology(&after).and_then(|a| a.write(dir)).map(Some),
                    None => Ok(None),
                };
                (after, attachment)
            }
            Err(e) => (before, Err(e)),
        };
        let (attachment, attachment_error) = match attachment {
            Ok(path) => (path, None),
            Err(e) => {
                warn!(cluster = self.cluster(), error = %e, "topology not refreshed after scale-out");
                (None, Some(e))
            }
        };

        info!(
            cluster = self.cluster(),
            added = launched.len(),
            failed = failures.len(),
            workers = topology.workers.len(),
            "scale-out finished"
        );

        Ok(ScaleOutReport {
            added: launched.into_iter().map(|m| m.machine).collect(),
            failures,
            topology,
            attachment,
            attachment_error,
        })
    }
}
