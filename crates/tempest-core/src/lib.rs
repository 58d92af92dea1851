//! tempest-core: the typed model of a cluster declaration.
//!
//! A declaration is an ordered list of record lines per cluster. Each line
//! is either a global setting (`storm-version 1.0.2`) or a slot
//! (`m1.medium {MASTER, UI}`). This crate parses those records once into
//! a [`ClusterConfiguration`] and derives the [`RoleAssignment`] view that
//! every downstream step (script generation, launch grouping) reads from.
//!
//! # Components
//!
//! - **`declaration`**: raw TOML declarations and the typed record parser
//! - **`settings`**: cluster-wide [`GlobalSettings`]
//! - **`config`**: [`ClusterConfiguration`] and its pre-flight validation
//! - **`assignment`**: [`RoleAssignment`], member ids, and launch groups
//! - **`roles`**: [`Role`], [`RoleSet`], and the `daemons` metadata tag
//! - **`versions`**: release download URL resolution
//! - **`credentials`**: cloud credentials and operator key material

pub mod assignment;
pub mod config;
pub mod credentials;
pub mod declaration;
pub mod error;
pub mod roles;
pub mod settings;
pub mod versions;

pub use assignment::{LaunchGroup, RoleAssignment};
pub use config::{ClusterConfiguration, ClusterSlot, NodeId};
pub use credentials::{Credentials, KeyMaterial};
pub use declaration::{Declarations, GlobalSetting, Record, SettingKey, SlotDeclaration};
pub use error::{ConfigError, ConfigResult};
pub use roles::{DAEMONS_TAG, Role, RoleSet};
pub use settings::{GlobalSettings, PackageManager};
