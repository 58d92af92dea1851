//! Hostnames of the load-bearing roles, as seen by script generation.

use std::fmt;

use serde::Serialize;
use tempest_core::{ConfigError, ConfigResult, NodeId, Role, RoleAssignment};

/// A reference to a cluster host inside generated configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HostRef {
    /// A resolved private address.
    Address(String),
    /// A node whose address is not known yet; renders as `node-<id>`.
    Placeholder(NodeId),
}

impl fmt::Display for HostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostRef::Address(addr) => f.write_str(addr),
            HostRef::Placeholder(id) => write!(f, "node-{id}"),
        }
    }
}

/// Resolved hosts for coordinator, ui, zookeeper members, and drpc nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptTopology {
    pub coordinator: HostRef,
    pub ui: HostRef,
    /// In member-id order: entry `i` is ZooKeeper server `i + 1`.
    pub coordination_members: Vec<HostRef>,
    pub drpc_nodes: Vec<HostRef>,
}

impl ScriptTopology {
    /// Placeholder topology for a cluster that has not been launched.
    pub fn from_assignment(assignment: &RoleAssignment) -> ConfigResult<Self> {
        let first = |role: Role| {
            assignment
                .node_ids_with_role(role)
                .into_iter()
                .next()
                .map(HostRef::Placeholder)
                .ok_or_else(|| ConfigError::MissingRole(role.to_string()))
        };

        Ok(Self {
            coordinator: first(Role::Coordinator)?,
            ui: first(Role::Ui)?,
            coordination_members: assignment
                .coordination_members()
                .into_iter()
                .map(HostRef::Placeholder)
                .collect(),
            drpc_nodes: assignment
                .node_ids_with_role(Role::Drpc)
                .into_iter()
                .map(HostRef::Placeholder)
                .collect(),
        })
    }

    /// Topology of machines whose private addresses are known.
    pub fn from_addresses(
        coordinator: impl Into<String>,
        ui: impl Into<String>,
        coordination_members: impl IntoIterator<Item = String>,
        drpc_nodes: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            coordinator: HostRef::Address(coordinator.into()),
            ui: HostRef::Address(ui.into()),
            coordination_members: coordination_members
                .into_iter()
                .map(HostRef::Address)
                .collect(),
            drpc_nodes: drpc_nodes.into_iter().map(HostRef::Address).collect(),
        }
    }
}
