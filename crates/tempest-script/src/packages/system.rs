//! Storage preparation and OS-level base tooling.

use tempest_core::PackageManager;

use crate::command::Command;

/// Device the provider maps the first ephemeral disk to.
pub const EPHEMERAL_DEVICE: &str = "/dev/sdb";

/// Format and mount the ephemeral disk at `/mnt`.
pub fn mount_local_storage() -> Vec<Command> {
    vec![
        Command::exec(format!("mkfs.ext4 -F {EPHEMERAL_DEVICE}")),
        Command::exec(format!("mount {EPHEMERAL_DEVICE} /mnt")),
        Command::exec("chmod 777 /mnt"),
    ]
}

/// Format and mount the attached volume at `/net`.
pub fn mount_volume(device: &str) -> Vec<Command> {
    vec![
        Command::exec("mkdir -p /net"),
        Command::exec(format!("mkfs.ext4 -F {device}")),
        Command::exec(format!("mount {device} /net")),
        Command::exec("chmod 777 /net"),
    ]
}

/// JDK and the download/unpack tools every later step relies on.
pub fn install_base_tooling(pm: PackageManager) -> Vec<Command> {
    match pm {
        PackageManager::Apt => vec![
            Command::exec("export DEBIAN_FRONTEND=noninteractive"),
            Command::exec("apt-get update -q"),
            Command::exec("apt-get install -q -y default-jdk-headless curl wget unzip python3"),
        ],
        PackageManager::Yum => vec![
            Command::exec("yum -y makecache"),
            Command::exec("yum -y install java-1.8.0-openjdk-headless curl wget unzip python3"),
        ],
    }
}
