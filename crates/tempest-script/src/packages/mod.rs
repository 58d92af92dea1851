//! Per-package command recipes.
//!
//! Each module returns plain command lists; ordering across packages is
//! the builder's job.

pub mod certificates;
pub mod cloud;
pub mod helper;
pub mod monitoring;
pub mod storm;
pub mod system;
pub mod zookeeper;

use crate::command::Command;

/// Download a `.tar.gz` and unpack it into `dest`, dropping the archive's
/// top-level directory.
pub fn download_and_unpack(url: &str, dest: &str) -> Vec<Command> {
    vec![
        Command::exec(format!("mkdir -p {dest}")),
        Command::exec(format!(
            "curl -fsSL --retry 3 '{url}' | tar -xz -C {dest} --strip-components=1"
        )),
    ]
}

/// Start `command` under a restart loop, logging to `~/logs/<name>.log`.
pub fn supervised(name: &str, command: &str) -> Command {
    Command::exec(format!(
        "mkdir -p ~/logs && nohup bash -c 'while true; do {command}; sleep 5; done' >> ~/logs/{name}.log 2>&1 &"
    ))
}

/// Operator-supplied commands, in declaration order.
pub fn custom_commands(commands: &[String]) -> Vec<Command> {
    commands.iter().map(|c| Command::exec(c.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_strips_top_level_directory() {
        let cmds = download_and_unpack("https://example.com/x.tar.gz", "~/x");
        assert_eq!(cmds[0], Command::exec("mkdir -p ~/x"));
        assert_eq!(
            cmds[1],
            Command::exec("curl -fsSL --retry 3 'https://example.com/x.tar.gz' | tar -xz -C ~/x --strip-components=1")
        );
    }

    #[test]
    fn supervised_runs_in_background() {
        let Command::Exec(line) = supervised("nimbus", "~/storm/bin/storm nimbus") else {
            panic!("expected exec");
        };
        assert!(line.ends_with(">> ~/logs/nimbus.log 2>&1 &"));
        assert!(line.contains("while true; do ~/storm/bin/storm nimbus; sleep 5; done"));
    }
}
