//! tempest-orchestrator: deploy a cluster, read it back, and grow it.
//!
//! - [`Deployer`] launches every slot of a declaration, then runs the
//!   root, user and start sequences built from the launched addresses.
//! - [`TopologyReconciler`] discovers a running cluster from its
//!   `daemons` tags and adds workers wired to the live coordinator.
//! - [`Attachment`] records where the operator's tools should point.
//!
//! Configuration and precondition failures are returned as errors before
//! anything is launched. Failures after that point are collected per group
//! or per machine in the returned report.

pub mod attach;
pub mod deploy;
pub mod discover;
pub mod error;
pub mod reconciler;
pub mod request;
pub mod tasks;

pub use attach::Attachment;
pub use deploy::{DeployedMachine, Deployer, DeploymentReport, GroupReport, UnfilledNode};
pub use discover::{LiveMachine, LiveTopology, discover};
pub use error::{MachineFailure, OrchestratorError, OrchestratorResult};
pub use reconciler::{DEFAULT_TASK_TIMEOUT, ScaleOutReport, TopologyReconciler};
