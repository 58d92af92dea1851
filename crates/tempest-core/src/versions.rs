//! Release download locations.

const STORM_BASE: &str = "https://s3-eu-west-1.amazonaws.com/storm-releases/";
const STORM_MIRROR: &str = "http://mirror.cc.columbia.edu/pub/software/apache/storm/";
const ZK_BASE: &str = "https://s3-eu-west-1.amazonaws.com/zk-releases/";

/// Storm releases this tool knows how to install.
pub const SUPPORTED_ENGINE_VERSIONS: &[&str] = &[
    "0.8.2", "0.9.0.1", "0.9.2", "0.9.3", "0.9.4", "0.9.5", "0.9.6", "0.10.0", "0.10.1",
    "0.10.2", "1.0.0", "1.0.1", "1.0.2",
];

/// ZooKeeper releases this tool knows how to install.
pub const SUPPORTED_COORDINATION_VERSIONS: &[&str] = &["3.4.5", "3.4.6"];

/// Resolve the Storm tarball URL for `version`, or `None` if unsupported.
pub fn resolve_engine_url(version: &str) -> Option<String> {
    let url = match version.trim() {
        v @ ("0.8.2" | "0.9.0.1") => format!("{STORM_BASE}storm-{v}.tar.gz"),
        "0.9.2" => format!("{STORM_BASE}apache-storm-0.9.2-incubating.tar.gz"),
        v @ ("0.9.3" | "0.9.4" | "0.9.5") => format!("{STORM_BASE}apache-storm-{v}.tar.gz"),
        v @ ("0.9.6" | "0.10.0" | "0.10.1" | "0.10.2" | "1.0.0" | "1.0.1" | "1.0.2") => {
            format!("{STORM_MIRROR}apache-storm-{v}/apache-storm-{v}.tar.gz")
        }
        _ => return None,
    };
    Some(url)
}

/// Resolve the ZooKeeper tarball URL for `version`, or `None` if unsupported.
pub fn resolve_coordination_url(version: &str) -> Option<String> {
    match version.trim() {
        v @ ("3.4.5" | "3.4.6") => Some(format!("{ZK_BASE}zookeeper-{v}.tar.gz")),
        _ => None,
    }
}

/// Storm 1.x replaced `nimbus.host` with the `nimbus.seeds` list.
pub fn engine_uses_nimbus_seeds(version: &str) -> bool {
    version
        .split('.')
        .next()
        .and_then(|major| major.parse::<u32>().ok())
        .is_some_and(|major| major >= 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_supported_engine_version_resolves() {
        for v in SUPPORTED_ENGINE_VERSIONS {
            let url = resolve_engine_url(v).unwrap();
            assert!(url.starts_with("http"), "{url}");
            assert!(url.ends_with(".tar.gz"), "{url}");
            assert!(url.contains(v), "{url}");
            assert!(!url["https://".len()..].contains("//"), "{url}");
        }
    }

    #[test]
    fn every_supported_coordination_version_resolves() {
        for v in SUPPORTED_COORDINATION_VERSIONS {
            let url = resolve_coordination_url(v).unwrap();
            assert!(url.ends_with(&format!("zookeeper-{v}.tar.gz")));
        }
    }

    #[test]
    fn unsupported_versions_resolve_to_none() {
        assert_eq!(resolve_engine_url("9.9.9"), None);
        assert_eq!(resolve_engine_url(""), None);
        assert_eq!(resolve_coordination_url("3.5.0"), None);
    }

    #[test]
    fn nimbus_seeds_from_one_dot_oh() {
        assert!(!engine_uses_nimbus_seeds("0.10.2"));
        assert!(engine_uses_nimbus_seeds("1.0.0"));
    }
}
