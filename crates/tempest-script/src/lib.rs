//! tempest-script: boot and setup command sequences for cluster nodes.
//!
//! Given a cluster configuration, credentials, and the hostnames of the
//! load-bearing roles, [`BootScriptBuilder`] produces three ordered
//! sequences per node:
//!
//! ```text
//! init   identity files (daemons, instance type, zookeeper myid)
//! root   storage → base tooling → s3cmd → ec2 tools → ganglia
//! user   aws creds → s3cfg → ec2 tools → node bundle + keys → downloads
//!        → pre-config commands → zoo.cfg / storm.yaml → post-config commands
//! start  zookeeper, nimbus, supervisor, ui, drpc, logviewer (role-guarded)
//! ```
//!
//! Order within a sequence is load-bearing: later steps assume earlier
//! ones succeeded. Every sequence is shared by all machines of a cluster;
//! per-machine behaviour comes from role guards evaluated on the node
//! against its `daemons` file.

pub mod builder;
pub mod command;
pub mod packages;
pub mod topology;

pub use builder::BootScriptBuilder;
pub use command::{BootCommandSequence, Command, Phase};
pub use topology::{HostRef, ScriptTopology};
