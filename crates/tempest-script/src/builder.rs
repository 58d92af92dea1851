//! Assembles the ordered per-phase boot sequences.

use tempest_core::{
    ClusterConfiguration, ConfigResult, Credentials, KeyMaterial, PackageManager, RoleSet,
};
use tracing::debug;

use crate::command::{BootCommandSequence, Command, Phase};
use crate::packages::{self, certificates, cloud, helper, monitoring, storm, system, zookeeper};
use crate::topology::ScriptTopology;

/// Task names the provider shows for each phase.
pub const INIT_TASK: &str = "tempest-init";
pub const ROOT_TASK: &str = "tempest-setup-root";
pub const USER_TASK: &str = "tempest-setup-user";
pub const START_TASK: &str = "tempest-start";

/// Builds boot command sequences for one cluster.
///
/// Everything that can fail (package manager, release URLs, serializing
/// the node bundle's configuration) is resolved in [`new`](Self::new),
/// so a builder that exists always produces complete sequences.
pub struct BootScriptBuilder<'a> {
    config: &'a ClusterConfiguration,
    credentials: &'a Credentials,
    keys: &'a KeyMaterial,
    topology: &'a ScriptTopology,
    package_manager: PackageManager,
    engine_version: String,
    engine_url: String,
    coordination_url: String,
    declarations_toml: String,
    credentials_toml: String,
}

impl<'a> BootScriptBuilder<'a> {
    pub fn new(
        config: &'a ClusterConfiguration,
        credentials: &'a Credentials,
        keys: &'a KeyMaterial,
        topology: &'a ScriptTopology,
    ) -> ConfigResult<Self> {
        let settings = config.settings();
        let package_manager = settings.package_manager()?;
        let engine_url = settings.engine_download_url()?;
        let coordination_url = settings.coordination_download_url()?;
        // Resolved above, so the version is present.
        let engine_version = settings.engine_version().unwrap_or_default().to_string();

        Ok(Self {
            config,
            credentials,
            keys,
            topology,
            package_manager,
            engine_version,
            engine_url,
            coordination_url,
            declarations_toml: config.to_declarations().to_toml_string()?,
            credentials_toml: credentials.to_toml_string()?,
        })
    }

    fn cluster(&self) -> &str {
        self.config.name()
    }

    fn home(&self) -> String {
        self.config.settings().home_dir()
    }

    /// Absolute path of the daemons file every role guard reads.
    pub fn daemons_file(&self) -> String {
        format!("{}/daemons", self.home())
    }

    fn sequence(&self, phase: Phase, task: &str) -> BootCommandSequence {
        BootCommandSequence::new(phase, task, self.daemons_file())
    }

    /// Identity files written at first boot: the role tag, the instance
    /// type, and the ZooKeeper `myid` for members.
    pub fn identity_commands(
        &self,
        roles: &RoleSet,
        instance_type: &str,
        member_id: Option<u32>,
    ) -> BootCommandSequence {
        let home = self.home();
        let user = self.config.settings().image_username();
        let mut seq = self.sequence(Phase::Init, INIT_TASK);

        seq.push(Command::write_file(self.daemons_file(), roles.to_tag()));
        seq.push(Command::write_file(format!("{home}/.instance-type"), instance_type));
        seq.push(Command::exec(format!(
            "chown {user} {} {home}/.instance-type",
            self.daemons_file()
        )));
        if let Some(id) = member_id {
            seq.extend(zookeeper::write_member_id(&home, user, id));
        }
        seq
    }

    /// Identity followed by the root phase, for embedding in a launch call.
    pub fn init_script(
        &self,
        roles: &RoleSet,
        instance_type: &str,
        member_id: Option<u32>,
    ) -> BootCommandSequence {
        let mut seq = self.identity_commands(roles, instance_type, member_id);
        seq.append(self.root_phase());
        seq
    }

    /// Elevated setup: storage, base tooling, s3cmd, ec2 tools, ganglia.
    pub fn root_phase(&self) -> BootCommandSequence {
        let settings = self.config.settings();
        let pm = self.package_manager;
        let mut seq = self.sequence(Phase::Root, ROOT_TASK);

        if settings.mount_local_storage() {
            seq.extend(system::mount_local_storage());
        }
        if settings.volume_size_gib() > 0 {
            seq.extend(system::mount_volume(settings.volume_device()));
        }

        seq.extend(system::install_base_tooling(pm));
        seq.extend(cloud::install_storage_cli(pm));

        if self.credentials.has_certificates() {
            seq.extend(certificates::install(pm));
        }

        seq.extend(monitoring::install(pm));
        seq.extend(monitoring::configure(self.cluster(), &self.topology.ui, pm));
        seq.extend(monitoring::start(pm));

        debug!(cluster = self.cluster(), commands = seq.len(), "built root phase");
        seq
    }

    /// Unprivileged setup, run as the image user once the machine is up.
    pub fn user_phase(&self) -> BootCommandSequence {
        let settings = self.config.settings();
        let creds = self.credentials;
        let home = self.home();
        let mut seq = self.sequence(Phase::User, USER_TASK);

        seq.extend(cloud::write_cloud_credentials(
            settings.region(),
            &creds.identity,
            &creds.credential,
        ));
        seq.extend(cloud::configure_storage_cli(&creds.identity, &creds.credential));

        if creds.has_certificates()
            && let Some((cert, key)) = &self.keys.x509
        {
            seq.extend(certificates::configure(cert, key, settings.region(), self.cluster()));
        }

        seq.extend(helper::download(settings.helper_bundle_url()));
        seq.extend(helper::write_configuration(
            &self.declarations_toml,
            &self.credentials_toml,
        ));
        seq.extend(helper::write_key_pair(self.keys));

        seq.extend(storm::download(&self.engine_url));
        seq.extend(zookeeper::download(&self.coordination_url));

        seq.extend(packages::custom_commands(settings.pre_config_commands()));

        seq.extend(zookeeper::configure(&home, &self.topology.coordination_members));
        seq.extend(storm::configure(&self.engine_version, &home, self.topology));

        seq.extend(packages::custom_commands(settings.post_config_commands()));

        debug!(cluster = self.cluster(), commands = seq.len(), "built user phase");
        seq
    }

    /// Supervised, role-guarded daemon start.
    pub fn start_sequence(&self) -> BootCommandSequence {
        let mut seq = self.sequence(Phase::Start, START_TASK);
        seq.extend(zookeeper::start());
        seq.extend(storm::start());
        if self.config.settings().memory_monitor() {
            seq.extend(helper::run_memory_monitor());
        }
        seq
    }
}
