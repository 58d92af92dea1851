//! The node-side tempest bundle.
//!
//! Nodes carry a copy of the cluster declaration, the credentials, and
//! the operator's key pair so they can orchestrate each other (the
//! memory monitor, for one, talks to every supervisor over ssh).

use tempest_core::KeyMaterial;

use crate::command::Command;
use crate::packages::download_and_unpack;

pub fn download(url: &str) -> Vec<Command> {
    download_and_unpack(url, "~/tempest")
}

pub fn write_configuration(declarations_toml: &str, credentials_toml: &str) -> Vec<Command> {
    vec![
        Command::exec("mkdir -p ~/tempest/conf"),
        Command::write_file("~/tempest/conf/clusters.toml", declarations_toml),
        Command::write_file("~/tempest/conf/credential.toml", credentials_toml),
        Command::exec("chmod 600 ~/tempest/conf/credential.toml"),
    ]
}

/// Install the operator's key pair as the node's own.
pub fn write_key_pair(keys: &KeyMaterial) -> Vec<Command> {
    vec![
        Command::exec("mkdir -p ~/.ssh"),
        Command::write_file("~/.ssh/id_rsa", keys.private_key.as_str()),
        Command::write_file("~/.ssh/id_rsa.pub", keys.public_key.as_str()),
        // ssh refuses keys readable by others.
        Command::exec("chmod -R 700 ~/.ssh"),
    ]
}

pub fn run_memory_monitor() -> Vec<Command> {
    vec![Command::exec(
        "mkdir -p ~/logs && nohup ~/tempest/bin/memory-monitor >> ~/logs/memory-monitor.log 2>&1 &",
    )]
}
