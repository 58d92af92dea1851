//! Daemon roles and the `daemons` metadata tag.
//!
//! The tag is the only topology record that survives between runs: it is
//! written on every machine at launch and read back during scale-out, so
//! [`RoleSet::to_tag`] and [`RoleSet::from_tag`] must round-trip exactly.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Name of the machine metadata attribute carrying the role list.
pub const DAEMONS_TAG: &str = "daemons";

/// A daemon function a node runs.
///
/// Variant order is the canonical order used when rendering role sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Nimbus: accepts topologies and assigns work.
    Coordinator,
    /// Storm UI, also the Ganglia aggregation point.
    Ui,
    /// Supervisor running worker processes.
    Worker,
    /// ZooKeeper ensemble member.
    CoordinationMember,
    Drpc,
    LogViewer,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Coordinator,
        Role::Ui,
        Role::Worker,
        Role::CoordinationMember,
        Role::Drpc,
        Role::LogViewer,
    ];

    /// Canonical token, as written into tags and daemons files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Coordinator => "coordinator",
            Role::Ui => "ui",
            Role::Worker => "worker",
            Role::CoordinationMember => "coordination-member",
            Role::Drpc => "drpc",
            Role::LogViewer => "logviewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    /// Parse a role token. Case-insensitive; accepts the legacy aliases
    /// (`MASTER`, `ZK`, ...) found in older declarations.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coordinator" | "master" | "nimbus" => Ok(Role::Coordinator),
            "ui" => Ok(Role::Ui),
            "worker" | "supervisor" => Ok(Role::Worker),
            "coordination-member" | "zk" | "zookeeper" => Ok(Role::CoordinationMember),
            "drpc" => Ok(Role::Drpc),
            "logviewer" | "log-viewer" => Ok(Role::LogViewer),
            other => Err(other.to_string()),
        }
    }
}

/// An ordered, duplicate-free set of roles.
///
/// Two slots declaring `{UI, MASTER}` and `{MASTER, UI}` hold equal sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoleSet(BTreeSet<Role>);

impl RoleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, role: Role) -> bool {
        self.0.insert(role)
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        self.0.iter().copied()
    }

    /// Parse a comma-separated token list (no brackets or braces).
    ///
    /// Empty tokens are skipped; an unknown token is returned as `Err`.
    pub fn parse_tokens(list: &str) -> Result<Self, String> {
        let mut set = RoleSet::new();
        for token in list.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            set.insert(token.parse()?);
        }
        Ok(set)
    }

    /// Render the `daemons` metadata value, e.g. `[coordinator, ui]`.
    pub fn to_tag(&self) -> String {
        let tokens: Vec<&str> = self.iter().map(|r| r.as_str()).collect();
        format!("[{}]", tokens.join(", "))
    }

    /// Parse a `daemons` metadata value.
    ///
    /// Literal brackets are stripped before tokenizing; tokens are trimmed
    /// and matched case-insensitively.
    pub fn from_tag(tag: &str) -> Result<Self, String> {
        Self::parse_tokens(&tag.replace(['[', ']'], ""))
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        RoleSet(iter.into_iter().collect())
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases_case_insensitively() {
        assert_eq!("MASTER".parse::<Role>().unwrap(), Role::Coordinator);
        assert_eq!(" zk ".parse::<Role>().unwrap(), Role::CoordinationMember);
        assert_eq!("LogViewer".parse::<Role>().unwrap(), Role::LogViewer);
        assert!("gateway".parse::<Role>().is_err());
    }

    #[test]
    fn order_of_declaration_is_irrelevant() {
        let a = RoleSet::parse_tokens("UI, MASTER, ZK").unwrap();
        let b = RoleSet::parse_tokens("ZK,master , ui").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn tag_round_trips() {
        let set: RoleSet = [Role::Worker, Role::Drpc, Role::Coordinator].into_iter().collect();
        let tag = set.to_tag();
        assert_eq!(tag, "[coordinator, worker, drpc]");
        assert_eq!(RoleSet::from_tag(&tag).unwrap(), set);
    }

    #[test]
    fn legacy_tag_is_readable() {
        let set = RoleSet::from_tag("[MASTER, UI, ZK]").unwrap();
        assert!(set.contains(Role::Coordinator));
        assert!(set.contains(Role::Ui));
        assert!(set.contains(Role::CoordinationMember));
        assert!(!set.contains(Role::Worker));
    }

    #[test]
    fn empty_tag_is_empty_set() {
        assert!(RoleSet::from_tag("[]").unwrap().is_empty());
    }
}
