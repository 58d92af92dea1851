//! The parsed, typed configuration of one cluster.

use tracing::debug;

use crate::declaration::{Declarations, Record, parse_records};
use crate::error::{ConfigError, ConfigResult};
use crate::roles::{Role, RoleSet};
use crate::settings::GlobalSettings;

/// Ordinal position of a slot record in the declaration (zero-based).
pub type NodeId = usize;

/// One declared node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSlot {
    pub node_id: NodeId,
    pub instance_type: String,
    pub roles: RoleSet,
}

/// A cluster declaration parsed into slots and global settings.
///
/// Read-only after construction; every accessor is a pure function of
/// the parsed state.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterConfiguration {
    name: String,
    lines: Vec<String>,
    slots: Vec<ClusterSlot>,
    settings: GlobalSettings,
}

impl ClusterConfiguration {
    /// Parse the records of `cluster_name`.
    ///
    /// Fails with [`ConfigError::UnknownCluster`] if the cluster is not
    /// declared, or with the first record-level error encountered.
    pub fn parse(declarations: &Declarations, cluster_name: &str) -> ConfigResult<Self> {
        let lines = declarations.lines(cluster_name)?;
        Self::from_lines(cluster_name, lines.to_vec())
    }

    pub fn from_lines(cluster_name: &str, lines: Vec<String>) -> ConfigResult<Self> {
        let records = parse_records(&lines)?;
        let settings = GlobalSettings::from_records(&records)?;
        let slots: Vec<ClusterSlot> = records
            .into_iter()
            .filter_map(|record| match record {
                Record::Slot(slot) => Some(ClusterSlot {
                    node_id: slot.index,
                    instance_type: slot.instance_type,
                    roles: slot.roles,
                }),
                Record::Global(_) => None,
            })
            .collect();

        debug!(
            cluster = cluster_name,
            slots = slots.len(),
            "parsed cluster declaration"
        );

        Ok(Self {
            name: cluster_name.to_string(),
            lines,
            slots,
            settings,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declaration lines this configuration was parsed from.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Slots in ascending node-id order.
    pub fn slots(&self) -> &[ClusterSlot] {
        &self.slots
    }

    pub fn slot(&self, node_id: NodeId) -> Option<&ClusterSlot> {
        self.slots.iter().find(|s| s.node_id == node_id)
    }

    pub fn settings(&self) -> &GlobalSettings {
        &self.settings
    }

    /// Pre-flight checks run before any provisioning call.
    ///
    /// Required versions must be declared and resolvable, the package
    /// manager must be supported, and the cluster must have a coordinator
    /// and a ui slot to wire the rest of the nodes to.
    pub fn validate(&self) -> ConfigResult<()> {
        self.settings.engine_download_url()?;
        self.settings.coordination_download_url()?;
        self.settings.package_manager()?;

        if self.slots.is_empty() {
            return Err(ConfigError::NoSlots);
        }
        for role in [Role::Coordinator, Role::Ui, Role::CoordinationMember] {
            if !self.slots.iter().any(|s| s.roles.contains(role)) {
                return Err(ConfigError::MissingRole(role.to_string()));
            }
        }
        Ok(())
    }

    /// A copy of the declaration as a single-cluster [`Declarations`],
    /// suitable for shipping to nodes.
    pub fn to_declarations(&self) -> Declarations {
        let mut decl = Declarations::default();
        decl.insert(&self.name, self.lines.iter().cloned());
        decl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declarations() -> Declarations {
        let mut decl = Declarations::default();
        decl.insert(
            "test",
            [
                "storm-version 1.0.2",
                "zk-version 3.4.6",
                "image ami-1234",
                "region eu-west-1",
                "m1.medium {MASTER, UI}",
                "m1.small {ZK}",
                "m1.small {WORKER}",
            ],
        );
        decl
    }

    #[test]
    fn node_ids_are_record_positions() {
        let config = ClusterConfiguration::parse(&declarations(), "test").unwrap();
        let ids: Vec<NodeId> = config.slots().iter().map(|s| s.node_id).collect();
        assert_eq!(ids, vec![4, 5, 6]);
        assert_eq!(config.slot(5).unwrap().instance_type, "m1.small");
        assert_eq!(config.settings().image(), Some("ami-1234"));
    }

    #[test]
    fn unknown_cluster_is_rejected() {
        let err = ClusterConfiguration::parse(&declarations(), "nope").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownCluster(ref c) if c == "nope"));
    }

    #[test]
    fn valid_declaration_passes_preflight() {
        let config = ClusterConfiguration::parse(&declarations(), "test").unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn preflight_rejects_unsupported_version() {
        let config = ClusterConfiguration::from_lines(
            "c",
            vec![
                "storm-version 9.9.9".into(),
                "zk-version 3.4.6".into(),
                "m1.medium {MASTER, UI, ZK}".into(),
            ],
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedEngineVersion(_))
        ));
    }

    #[test]
    fn preflight_requires_ui() {
        let config = ClusterConfiguration::from_lines(
            "c",
            vec![
                "storm-version 1.0.2".into(),
                "zk-version 3.4.6".into(),
                "m1.medium {MASTER, ZK}".into(),
            ],
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::MissingRole(ref r)) if r == "ui"));
    }

    #[test]
    fn declaration_copy_round_trips() {
        let config = ClusterConfiguration::parse(&declarations(), "test").unwrap();
        let copy = ClusterConfiguration::parse(&config.to_declarations(), "test").unwrap();
        assert_eq!(copy, config);
    }
}
