//! Operator-side attachment to a running cluster.
//!
//! The attachment file tells local tooling where the coordinator, ui and
//! monitoring frontend live. It is rewritten after every scale-out so new
//! workers show up without touching the coordinator.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::discover::{LiveMachine, LiveTopology};
use crate::error::{OrchestratorError, OrchestratorResult};

const UI_PORT: u16 = 8080;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub cluster: String,
    pub coordinator: String,
    pub ui: String,
    pub ui_url: String,
    pub ganglia_url: String,
    pub zookeeper: Vec<String>,
    pub drpc: Vec<String>,
    pub workers: Vec<String>,
}

/// Address the operator can reach: public if known, else private.
fn reachable(machine: &LiveMachine) -> String {
    machine
        .machine
        .public_address
        .clone()
        .or_else(|| machine.machine.private_address.clone())
        .unwrap_or_else(|| machine.machine.id.clone())
}

impl Attachment {
    pub fn from_topology(topology: &LiveTopology) -> OrchestratorResult<Self> {
        let coordinator = reachable(topology.require_coordinator()?);
        let ui = reachable(topology.require_ui()?);
        Ok(Self {
            cluster: topology.cluster.clone(),
            ui_url: format!("http://{ui}:{UI_PORT}"),
            ganglia_url: format!("http://{ui}/ganglia"),
            coordinator,
            ui,
            zookeeper: topology.coordination_members.iter().map(reachable).collect(),
            drpc: topology.drpc_nodes.iter().map(reachable).collect(),
            workers: topology.workers.iter().map(reachable).collect(),
        })
    }

    pub fn path_in(dir: &Path, cluster: &str) -> PathBuf {
        dir.join(format!("{cluster}.toml"))
    }

    /// Write `<dir>/<cluster>.toml`, creating `dir` if needed.
    pub fn write(&self, dir: &Path) -> OrchestratorResult<PathBuf> {
        let path = Self::path_in(dir, &self.cluster);
        let content = toml::to_string_pretty(self)?;
        fs::create_dir_all(dir)
            .and_then(|_| fs::write(&path, content))
            .map_err(|source| OrchestratorError::AttachmentIo {
                path: path.clone(),
                source,
            })?;
        info!(cluster = %self.cluster, path = %path.display(), "attached to cluster");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempest_core::DAEMONS_TAG;
    use tempest_provision::{MachineHandle, MachineStatus};

    fn machine(id: &str, tag: &str, public: Option<&str>) -> MachineHandle {
        MachineHandle {
            id: id.into(),
            group: "prod".into(),
            status: MachineStatus::Running,
            instance_type: "m1.small".into(),
            image_id: "ami-1".into(),
            region: None,
            zone: "us-east-1a".into(),
            private_address: Some(format!("10.0.0.{}", &id[2..])),
            public_address: public.map(str::to_string),
            metadata: BTreeMap::from([(DAEMONS_TAG.to_string(), tag.to_string())]),
        }
    }

    #[test]
    fn writes_cluster_file() {
        let topo = LiveTopology::from_machines(
            "prod",
            vec![
                machine("m-1", "[coordinator, ui]", Some("198.51.100.1")),
                machine("m-2", "[worker]", None),
            ],
        );
        let attachment = Attachment::from_topology(&topo).unwrap();
        assert_eq!(attachment.ui_url, "http://198.51.100.1:8080");
        assert_eq!(attachment.ganglia_url, "http://198.51.100.1/ganglia");
        assert_eq!(attachment.workers, ["10.0.0.2"]);

        let dir = tempfile::tempdir().unwrap();
        let path = attachment.write(&dir.path().join("attach")).unwrap();
        assert_eq!(path, dir.path().join("attach/prod.toml"));

        let read: Attachment = toml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(read, attachment);
    }

    #[test]
    fn needs_coordinator() {
        let topo = LiveTopology::from_machines("prod", vec![machine("m-1", "[ui]", None)]);
        assert!(matches!(
            Attachment::from_topology(&topo),
            Err(OrchestratorError::Discovery { .. })
        ));
    }
}
