//! Configuration error types.

use thiserror::Error;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading, parsing, or validating a cluster
/// declaration. All of them are fatal and surface before any
/// provisioning call is made.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cluster not found in declaration: {0}")]
    UnknownCluster(String),

    #[error("record {index} is malformed: {line:?}")]
    MalformedRecord { index: usize, line: String },

    #[error("record {index} declares unknown role {token:?}")]
    UnknownRole { index: usize, token: String },

    #[error("record {index} declares no roles")]
    EmptyRoleSet { index: usize },

    #[error("setting {0} is declared more than once")]
    DuplicateSetting(String),

    #[error("required setting missing: {0}")]
    MissingSetting(String),

    #[error("invalid value {value:?} for setting {key}")]
    InvalidValue { key: String, value: String },

    #[error("package manager not supported: {0}")]
    UnsupportedPackageManager(String),

    #[error("storm version not supported: {0}")]
    UnsupportedEngineVersion(String),

    #[error("zookeeper version not supported: {0}")]
    UnsupportedCoordinationVersion(String),

    #[error("cluster declares no node slots")]
    NoSlots,

    #[error("no slot carries the {0} role")]
    MissingRole(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}
