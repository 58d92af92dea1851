//! ec2-ami-tools, installed only when x509 credentials are configured.

use tempest_core::PackageManager;

use crate::command::Command;

const AMI_TOOLS_URL: &str = "https://s3.amazonaws.com/ec2-downloads/ec2-ami-tools.zip";

pub fn install(pm: PackageManager) -> Vec<Command> {
    match pm {
        PackageManager::Apt => vec![Command::exec("apt-get install -q -y ec2-ami-tools")],
        PackageManager::Yum => vec![
            Command::exec(format!("curl -fsSL -o /tmp/ec2-ami-tools.zip {AMI_TOOLS_URL}")),
            Command::exec("mkdir -p /usr/local/ec2"),
            Command::exec("unzip -q -o /tmp/ec2-ami-tools.zip -d /usr/local/ec2"),
            Command::exec("rm -f /tmp/ec2-ami-tools.zip"),
        ],
    }
}

/// Copy the certificate pair to `~/.ec2` and export the tool environment.
pub fn configure(certificate: &str, private_key: &str, region: Option<&str>, cluster: &str) -> Vec<Command> {
    let mut env = String::from("export EC2_CERT=~/.ec2/cert.pem\nexport EC2_PRIVATE_KEY=~/.ec2/pk.pem\n");
    if let Some(region) = region {
        env.push_str(&format!("export EC2_REGION={region}\n"));
    }
    env.push_str(&format!("export TEMPEST_CLUSTER={cluster}\n"));

    vec![
        Command::exec("mkdir -p ~/.ec2"),
        Command::write_file("~/.ec2/cert.pem", certificate),
        Command::write_file("~/.ec2/pk.pem", private_key),
        Command::exec("chmod 600 ~/.ec2/cert.pem ~/.ec2/pk.pem"),
        Command::write_file("~/.ec2/env", env),
        Command::exec("grep -q '.ec2/env' ~/.bashrc || echo 'source ~/.ec2/env' >> ~/.bashrc"),
    ]
}
