//! Cluster declaration files and the typed record parser.
//!
//! A declaration file is TOML mapping each cluster name to an ordered
//! array of record lines:
//!
//! ```toml
//! production = [
//!   "storm-version 1.0.2",
//!   "zk-version 3.4.6",
//!   "m1.medium {MASTER, UI, ZK}",
//!   "m1.small {WORKER}",
//! ]
//! ```
//!
//! Lines are classified once, up front, into [`Record::Global`] or
//! [`Record::Slot`]. A line whose first token is one of the enumerated
//! [`SettingKey`]s is a global setting; everything else must be a slot.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::roles::RoleSet;

static SLOT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\S+)\s*\{([^}]*)\}\s*$").expect("slot pattern is valid")
});

/// Raw declarations: cluster name → ordered record lines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Declarations(BTreeMap<String, Vec<String>>);

impl Declarations {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|source| ConfigError::Toml {
            path: "<inline>".to_string(),
            source,
        })
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidValue {
            key: "declarations".to_string(),
            value: e.to_string(),
        })
    }

    /// Insert (or replace) the records of one cluster.
    pub fn insert<I, S>(&mut self, cluster: &str, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .insert(cluster.to_string(), lines.into_iter().map(Into::into).collect());
    }

    /// Fails if `cluster` is absent from the declaration.
    pub fn sanity_check(&self, cluster: &str) -> ConfigResult<()> {
        self.lines(cluster).map(|_| ())
    }

    pub fn lines(&self, cluster: &str) -> ConfigResult<&[String]> {
        self.0
            .get(cluster)
            .map(Vec::as_slice)
            .ok_or_else(|| ConfigError::UnknownCluster(cluster.to_string()))
    }

    pub fn cluster_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// The enumerated set of global-setting keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SettingKey {
    StormVersion,
    ZkVersion,
    Image,
    ImageUsername,
    PackageManager,
    Region,
    PlacementGroup,
    MountLocalStorage,
    PrivateKeyPath,
    PublicKeyPath,
    MemoryMonitor,
    RemoteExecPreConfig,
    RemoteExecPostConfig,
    EbsStorageSize,
    EbsDevice,
    HelperBundleUrl,
}

impl SettingKey {
    pub const ALL: [SettingKey; 16] = [
        SettingKey::StormVersion,
        SettingKey::ZkVersion,
        SettingKey::Image,
        SettingKey::ImageUsername,
        SettingKey::PackageManager,
        SettingKey::Region,
        SettingKey::PlacementGroup,
        SettingKey::MountLocalStorage,
        SettingKey::PrivateKeyPath,
        SettingKey::PublicKeyPath,
        SettingKey::MemoryMonitor,
        SettingKey::RemoteExecPreConfig,
        SettingKey::RemoteExecPostConfig,
        SettingKey::EbsStorageSize,
        SettingKey::EbsDevice,
        SettingKey::HelperBundleUrl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::StormVersion => "storm-version",
            SettingKey::ZkVersion => "zk-version",
            SettingKey::Image => "image",
            SettingKey::ImageUsername => "image-username",
            SettingKey::PackageManager => "packagemanager",
            SettingKey::Region => "region",
            SettingKey::PlacementGroup => "placementgroup",
            SettingKey::MountLocalStorage => "mount-local-storage",
            SettingKey::PrivateKeyPath => "private-key-path",
            SettingKey::PublicKeyPath => "public-key-path",
            SettingKey::MemoryMonitor => "memory-monitor",
            SettingKey::RemoteExecPreConfig => "remote-exec-preconfig",
            SettingKey::RemoteExecPostConfig => "remote-exec-postconfig",
            SettingKey::EbsStorageSize => "ebs-storage-size",
            SettingKey::EbsDevice => "ebs-device",
            SettingKey::HelperBundleUrl => "helper-bundle-url",
        }
    }

    /// Exact match against the enumerated key set.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }

    /// Keys that may repeat; their values accumulate in declaration order.
    pub fn is_repeatable(&self) -> bool {
        matches!(
            self,
            SettingKey::RemoteExecPreConfig | SettingKey::RemoteExecPostConfig
        )
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `key value` record. The value has surrounding quotes removed and is
/// trimmed, but keeps its case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalSetting {
    pub index: usize,
    pub key: SettingKey,
    pub value: String,
}

impl GlobalSetting {
    /// Items of a `{a, b, c}` list value, trimmed, empty items dropped.
    pub fn list_items(&self) -> Vec<String> {
        let inner = self
            .value
            .trim()
            .trim_start_matches('{')
            .trim_end_matches('}');
        inner
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// An `instanceType {role, role}` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotDeclaration {
    /// Position of the record in the declaration; doubles as the node id.
    pub index: usize,
    pub instance_type: String,
    pub roles: RoleSet,
}

/// One classified declaration line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Global(GlobalSetting),
    Slot(SlotDeclaration),
}

/// Classify and parse a single declaration line.
pub fn parse_record(index: usize, line: &str) -> ConfigResult<Record> {
    let malformed = || ConfigError::MalformedRecord {
        index,
        line: line.to_string(),
    };

    let trimmed = line.trim();
    let key = trimmed.split_whitespace().next().ok_or_else(malformed)?;

    if let Some(setting) = SettingKey::from_key(key) {
        let value = trimmed[key.len()..].replace('"', "").trim().to_string();
        if value.is_empty() {
            return Err(malformed());
        }
        return Ok(Record::Global(GlobalSetting {
            index,
            key: setting,
            value,
        }));
    }

    let caps = SLOT_RE.captures(trimmed).ok_or_else(malformed)?;
    let instance_type = caps[1].to_string();
    let roles = RoleSet::parse_tokens(&caps[2])
        .map_err(|token| ConfigError::UnknownRole { index, token })?;
    if roles.is_empty() {
        return Err(ConfigError::EmptyRoleSet { index });
    }

    Ok(Record::Slot(SlotDeclaration {
        index,
        instance_type,
        roles,
    }))
}

/// Parse every line of a cluster's declaration, in order.
pub fn parse_records(lines: &[String]) -> ConfigResult<Vec<Record>> {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| parse_record(i, line))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::Role;

    #[test]
    fn classifies_global_settings() {
        let rec = parse_record(0, "storm-version \"1.0.2\"").unwrap();
        assert_eq!(
            rec,
            Record::Global(GlobalSetting {
                index: 0,
                key: SettingKey::StormVersion,
                value: "1.0.2".to_string(),
            })
        );
    }

    #[test]
    fn classifies_slots() {
        let rec = parse_record(3, "m1.medium {MASTER, UI}").unwrap();
        match rec {
            Record::Slot(slot) => {
                assert_eq!(slot.index, 3);
                assert_eq!(slot.instance_type, "m1.medium");
                assert!(slot.roles.contains(Role::Coordinator));
                assert!(slot.roles.contains(Role::Ui));
            }
            other => panic!("expected slot, got {other:?}"),
        }
    }

    #[test]
    fn key_match_is_exact() {
        // "image-id" is not a setting key, and has no braces either.
        let err = parse_record(1, "image-id ami-123").unwrap_err();
        assert!(matches!(err, ConfigError::MalformedRecord { index: 1, .. }));
    }

    #[test]
    fn rejects_unknown_role() {
        let err = parse_record(2, "m1.small {WORKER, GATEWAY}").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownRole { index: 2, ref token } if token == "gateway"));
    }

    #[test]
    fn rejects_empty_role_set() {
        let err = parse_record(4, "m1.small { }").unwrap_err();
        assert!(matches!(err, ConfigError::EmptyRoleSet { index: 4 }));
    }

    #[test]
    fn list_values_split_on_commas() {
        let rec = parse_record(0, "remote-exec-preconfig {cd ~, touch a , echo hi}").unwrap();
        let Record::Global(setting) = rec else {
            panic!("expected global setting");
        };
        assert_eq!(setting.list_items(), vec!["cd ~", "touch a", "echo hi"]);
    }

    #[test]
    fn loads_toml_declarations() {
        let decl = Declarations::from_toml_str(
            r#"
mycluster = ["storm-version 1.0.2", "m1.small {WORKER}"]
other = []
"#,
        )
        .unwrap();
        assert_eq!(decl.lines("mycluster").unwrap().len(), 2);
        assert!(decl.sanity_check("other").is_ok());
        assert!(matches!(
            decl.sanity_check("missing"),
            Err(ConfigError::UnknownCluster(_))
        ));
    }

    #[test]
    fn loads_declarations_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clusters.toml");
        std::fs::write(&path, "c1 = [\"m1.small {WORKER}\"]\n").unwrap();
        let decl = Declarations::from_file(&path).unwrap();
        assert_eq!(decl.cluster_names().collect::<Vec<_>>(), vec!["c1"]);
    }
}
