//! Storm: download, `storm.yaml`, and role-guarded daemon start.

use tempest_core::Role;
use tempest_core::versions::engine_uses_nimbus_seeds;

use crate::command::Command;
use crate::packages::{download_and_unpack, supervised, zookeeper};
use crate::topology::ScriptTopology;

pub const NIMBUS_THRIFT_PORT: u16 = 6627;
pub const UI_PORT: u16 = 8080;
pub const DRPC_PORT: u16 = 3772;
pub const DRPC_INVOCATIONS_PORT: u16 = 3773;
pub const LOGVIEWER_PORT: u16 = 8000;
pub const SUPERVISOR_SLOTS: [u16; 4] = [6700, 6701, 6702, 6703];

pub fn download(url: &str) -> Vec<Command> {
    download_and_unpack(url, "~/storm")
}

/// Write `storm.yaml` with the resolved host lists.
pub fn configure(version: &str, home: &str, topology: &ScriptTopology) -> Vec<Command> {
    vec![
        Command::exec("mkdir -p ~/storm/storm-local"),
        Command::write_file("~/storm/conf/storm.yaml", storm_yaml(version, home, topology)),
    ]
}

fn storm_yaml(version: &str, home: &str, topology: &ScriptTopology) -> String {
    let mut yaml = String::from("storm.zookeeper.servers:\n");
    for host in &topology.coordination_members {
        yaml.push_str(&format!("  - \"{host}\"\n"));
    }
    yaml.push_str(&format!("storm.zookeeper.port: {}\n", zookeeper::CLIENT_PORT));

    if engine_uses_nimbus_seeds(version) {
        yaml.push_str(&format!("nimbus.seeds: [\"{}\"]\n", topology.coordinator));
    } else {
        yaml.push_str(&format!("nimbus.host: \"{}\"\n", topology.coordinator));
    }
    yaml.push_str(&format!("nimbus.thrift.port: {NIMBUS_THRIFT_PORT}\n"));
    yaml.push_str(&format!("storm.local.dir: \"{home}/storm/storm-local\"\n"));
    yaml.push_str(&format!("ui.port: {UI_PORT}\n"));
    yaml.push_str(&format!("logviewer.port: {LOGVIEWER_PORT}\n"));

    yaml.push_str("supervisor.slots.ports:\n");
    for port in SUPERVISOR_SLOTS {
        yaml.push_str(&format!("  - {port}\n"));
    }

    if !topology.drpc_nodes.is_empty() {
        yaml.push_str("drpc.servers:\n");
        for host in &topology.drpc_nodes {
            yaml.push_str(&format!("  - \"{host}\"\n"));
        }
        yaml.push_str(&format!("drpc.port: {DRPC_PORT}\n"));
        yaml.push_str(&format!("drpc.invocations.port: {DRPC_INVOCATIONS_PORT}\n"));
    }
    yaml
}

fn start_daemon(role: Role, daemon: &str) -> Command {
    Command::on_role(
        role,
        supervised(daemon, &format!("~/storm/bin/storm {daemon}")),
    )
}

/// Start each Storm daemon only on machines carrying its role.
pub fn start() -> Vec<Command> {
    vec![
        start_daemon(Role::Coordinator, "nimbus"),
        start_daemon(Role::Worker, "supervisor"),
        start_daemon(Role::Ui, "ui"),
        start_daemon(Role::Drpc, "drpc"),
        start_daemon(Role::LogViewer, "logviewer"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology(drpc: Vec<String>) -> ScriptTopology {
        ScriptTopology::from_addresses(
            "10.0.0.1",
            "10.0.0.2",
            vec!["10.0.0.3".to_string(), "10.0.0.4".to_string()],
            drpc,
        )
    }

    #[test]
    fn yaml_lists_zookeeper_and_nimbus() {
        let yaml = storm_yaml("1.0.2", "/home/ubuntu", &topology(vec![]));
        assert!(yaml.starts_with("storm.zookeeper.servers:\n  - \"10.0.0.3\"\n  - \"10.0.0.4\"\n"));
        assert!(yaml.contains("nimbus.seeds: [\"10.0.0.1\"]"));
        assert!(yaml.contains("storm.local.dir: \"/home/ubuntu/storm/storm-local\""));
        assert!(!yaml.contains("drpc.servers"));
    }

    #[test]
    fn old_releases_use_nimbus_host() {
        let yaml = storm_yaml("0.9.5", "/home/ubuntu", &topology(vec!["10.0.0.9".into()]));
        assert!(yaml.contains("nimbus.host: \"10.0.0.1\""));
        assert!(yaml.contains("drpc.servers:\n  - \"10.0.0.9\"\n"));
    }

    #[test]
    fn every_daemon_is_role_guarded() {
        let cmds = start();
        let roles: Vec<Role> = cmds
            .iter()
            .map(|c| match c {
                Command::OnRole { role, .. } => *role,
                other => panic!("unguarded start: {other:?}"),
            })
            .collect();
        assert_eq!(
            roles,
            vec![Role::Coordinator, Role::Worker, Role::Ui, Role::Drpc, Role::LogViewer]
        );
    }
}
