//! ZooKeeper: member ids, configuration, and supervised start.

use tempest_core::Role;

use crate::command::Command;
use crate::packages::{download_and_unpack, supervised};
use crate::topology::HostRef;

pub const CLIENT_PORT: u16 = 2181;
pub const PEER_PORT: u16 = 2888;
pub const ELECTION_PORT: u16 = 3888;

/// Data directory, relative to the image user's home.
fn data_dir(home: &str) -> String {
    format!("{home}/zookeeper-data")
}

/// Write the member's `myid`. Runs as root at first boot, so paths are
/// absolute and ownership is handed to the image user.
pub fn write_member_id(home: &str, username: &str, member_id: u32) -> Vec<Command> {
    let dir = data_dir(home);
    vec![
        Command::exec(format!("mkdir -p {dir}")),
        Command::exec(format!("echo {member_id} > {dir}/myid")),
        Command::exec(format!("chown -R {username} {dir}")),
    ]
}

pub fn download(url: &str) -> Vec<Command> {
    download_and_unpack(url, "~/zookeeper")
}

/// Write `zoo.cfg`; server `i + 1` is `members[i]`.
pub fn configure(home: &str, members: &[HostRef]) -> Vec<Command> {
    let mut cfg = format!(
        "tickTime=2000\ninitLimit=10\nsyncLimit=5\ndataDir={}\nclientPort={CLIENT_PORT}\n",
        data_dir(home)
    );
    for (i, host) in members.iter().enumerate() {
        cfg.push_str(&format!(
            "server.{}={host}:{PEER_PORT}:{ELECTION_PORT}\n",
            i + 1
        ));
    }

    vec![
        Command::exec(format!("mkdir -p {}", data_dir(home))),
        Command::write_file("~/zookeeper/conf/zoo.cfg", cfg),
    ]
}

pub fn start() -> Vec<Command> {
    vec![Command::on_role(
        Role::CoordinationMember,
        supervised("zookeeper", "~/zookeeper/bin/zkServer.sh start-foreground"),
    )]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_lines_follow_member_order() {
        let members = vec![
            HostRef::Address("10.0.0.3".into()),
            HostRef::Address("10.0.0.1".into()),
        ];
        let cmds = configure("/home/ubuntu", &members);
        let Command::WriteFile { contents, .. } = &cmds[1] else {
            panic!("expected zoo.cfg write");
        };
        assert!(contents.contains("dataDir=/home/ubuntu/zookeeper-data\n"));
        assert!(contents.contains("server.1=10.0.0.3:2888:3888\nserver.2=10.0.0.1:2888:3888\n"));
    }

    #[test]
    fn member_id_is_written_to_data_dir() {
        let cmds = write_member_id("/home/ubuntu", "ubuntu", 3);
        assert_eq!(
            cmds[1],
            Command::exec("echo 3 > /home/ubuntu/zookeeper-data/myid")
        );
    }
}
