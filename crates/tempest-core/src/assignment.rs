//! Role assignment: the derived, read-only view over a cluster's slots.
//!
//! Everything downstream of the declaration asks the same three
//! questions: which instance type does node N use, which ZooKeeper id
//! does node N get, and which nodes run role R. `RoleAssignment` answers
//! them and groups slots into launch groups.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::{ClusterConfiguration, ClusterSlot, NodeId};
use crate::roles::{Role, RoleSet};

/// A batch of node ids sharing instance type and role set, launched
/// together in one provisioning call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchGroup {
    pub instance_type: String,
    pub roles: RoleSet,
    /// Ascending.
    pub node_ids: Vec<NodeId>,
}

impl LaunchGroup {
    /// Human-readable key used in logs and reports.
    pub fn key(&self) -> String {
        let ids: Vec<String> = self.node_ids.iter().map(|id| id.to_string()).collect();
        format!("{}{}#{}", self.instance_type, self.roles, ids.join(","))
    }
}

/// Derived view over a configuration's slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssignment {
    slots: BTreeMap<NodeId, ClusterSlot>,
    member_ids: BTreeMap<NodeId, u32>,
}

impl RoleAssignment {
    pub fn new(config: &ClusterConfiguration) -> Self {
        Self::from_slots(config.slots().iter().cloned())
    }

    pub fn from_slots(slots: impl IntoIterator<Item = ClusterSlot>) -> Self {
        let slots: BTreeMap<NodeId, ClusterSlot> =
            slots.into_iter().map(|s| (s.node_id, s)).collect();

        // Ascending node-id order; non-members do not consume an id.
        let mut next_id = 1;
        let mut member_ids = BTreeMap::new();
        for (node_id, slot) in &slots {
            if slot.roles.contains(Role::CoordinationMember) {
                member_ids.insert(*node_id, next_id);
                next_id += 1;
            }
        }

        Self { slots, member_ids }
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.slots.keys().copied()
    }

    pub fn instance_type_of(&self, node_id: NodeId) -> Option<&str> {
        self.slots.get(&node_id).map(|s| s.instance_type.as_str())
    }

    pub fn roles_of(&self, node_id: NodeId) -> Option<&RoleSet> {
        self.slots.get(&node_id).map(|s| &s.roles)
    }

    /// 1-based ZooKeeper id, or `None` for non-member nodes.
    pub fn coordination_member_id(&self, node_id: NodeId) -> Option<u32> {
        self.member_ids.get(&node_id).copied()
    }

    /// Member node ids in ascending order (equivalently, ascending id).
    pub fn coordination_members(&self) -> Vec<NodeId> {
        self.member_ids.keys().copied().collect()
    }

    /// Every node whose role set contains `role`.
    pub fn node_ids_with_role(&self, role: Role) -> BTreeSet<NodeId> {
        self.slots
            .values()
            .filter(|s| s.roles.contains(role))
            .map(|s| s.node_id)
            .collect()
    }

    /// Slots grouped by exact (instance type, role set), ordered by each
    /// group's smallest node id.
    pub fn launch_groups(&self) -> Vec<LaunchGroup> {
        let mut groups: BTreeMap<(String, RoleSet), Vec<NodeId>> = BTreeMap::new();
        for slot in self.slots.values() {
            groups
                .entry((slot.instance_type.clone(), slot.roles.clone()))
                .or_default()
                .push(slot.node_id);
        }

        let mut groups: Vec<LaunchGroup> = groups
            .into_iter()
            .map(|((instance_type, roles), node_ids)| LaunchGroup {
                instance_type,
                roles,
                node_ids,
            })
            .collect();
        groups.sort_by_key(|g| g.node_ids.first().copied());
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(lines: &[&str]) -> RoleAssignment {
        let lines = lines.iter().map(|s| s.to_string()).collect();
        RoleAssignment::new(&ClusterConfiguration::from_lines("c", lines).unwrap())
    }

    #[test]
    fn member_ids_are_dense_over_members_only() {
        let ra = assignment(&[
            "storm-version 1.0.2",
            "m1.medium {MASTER, UI}",
            "m1.small {ZK}",
            "m1.small {WORKER}",
            "m1.small {ZK}",
            "m1.small {WORKER}",
            "m1.small {ZK, DRPC}",
        ]);
        assert_eq!(ra.coordination_member_id(1), None);
        assert_eq!(ra.coordination_member_id(2), Some(1));
        assert_eq!(ra.coordination_member_id(3), None);
        assert_eq!(ra.coordination_member_id(4), Some(2));
        assert_eq!(ra.coordination_member_id(6), Some(3));
        assert_eq!(ra.coordination_members(), vec![2, 4, 6]);
    }

    #[test]
    fn member_ids_are_stable_across_recomputation() {
        let lines = ["m1.small {ZK}", "m1.small {WORKER}", "m1.small {zk, worker}"];
        assert_eq!(assignment(&lines), assignment(&lines));
    }

    #[test]
    fn scenario_one_topology() {
        let ra = assignment(&[
            "m1.medium {MASTER, UI}",
            "m1.small {ZK}",
            "m1.small {ZK}",
            "m1.small {ZK}",
            "m1.large {WORKER}",
            "m1.large {WORKER}",
        ]);
        let ids: Vec<u32> = [1, 2, 3]
            .iter()
            .map(|n| ra.coordination_member_id(*n).unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(ra.node_ids_with_role(Role::Worker).len(), 2);
        assert_eq!(ra.instance_type_of(4), Some("m1.large"));
    }

    #[test]
    fn role_queries_ignore_declaration_order() {
        let a = assignment(&["m1.small {UI, MASTER}", "m1.small {WORKER, DRPC}"]);
        let b = assignment(&["m1.small {MASTER, UI}", "m1.small {DRPC, WORKER}"]);
        for role in Role::ALL {
            assert_eq!(a.node_ids_with_role(role), b.node_ids_with_role(role));
        }
        assert_eq!(a.node_ids_with_role(Role::Drpc), BTreeSet::from([1]));
    }

    #[test]
    fn groups_by_instance_type_and_exact_role_set() {
        let ra = assignment(&[
            "m1.medium {MASTER, UI}",
            "m1.small {WORKER}",
            "m1.small {WORKER, DRPC}",
            "m1.small {WORKER}",
            "m1.large {WORKER}",
        ]);
        let groups = ra.launch_groups();
        assert_eq!(groups.len(), 4);
        assert_eq!(groups[0].node_ids, vec![0]);
        assert_eq!(groups[1].node_ids, vec![1, 3]);
        assert_eq!(groups[1].instance_type, "m1.small");
        assert_eq!(groups[2].node_ids, vec![2]);
        assert_eq!(groups[3].instance_type, "m1.large");
    }
}
