//! Cloud CLI credentials and the s3cmd storage helper.

use tempest_core::PackageManager;

use crate::command::Command;

pub fn install_storage_cli(pm: PackageManager) -> Vec<Command> {
    match pm {
        PackageManager::Apt => vec![Command::exec("apt-get install -q -y s3cmd")],
        PackageManager::Yum => vec![Command::exec("yum -y install s3cmd")],
    }
}

/// Write `~/.aws/config` and `~/.aws/credentials`.
pub fn write_cloud_credentials(region: Option<&str>, identity: &str, credential: &str) -> Vec<Command> {
    let mut config = String::from("[default]\n");
    if let Some(region) = region {
        config.push_str(&format!("region = {region}\n"));
    }
    config.push_str("output = json\n");

    vec![
        Command::exec("mkdir -p ~/.aws"),
        Command::write_file("~/.aws/config", config),
        Command::write_file(
            "~/.aws/credentials",
            format!(
                "[default]\naws_access_key_id = {identity}\naws_secret_access_key = {credential}\n"
            ),
        ),
        Command::exec("chmod 600 ~/.aws/credentials"),
    ]
}

pub fn configure_storage_cli(identity: &str, credential: &str) -> Vec<Command> {
    vec![
        Command::write_file(
            "~/.s3cfg",
            format!("[default]\naccess_key = {identity}\nsecret_key = {credential}\nuse_https = True\n"),
        ),
        Command::exec("chmod 600 ~/.s3cfg"),
    ]
}
