//! Shell-level operations and their rendering.

use std::fmt;

use serde::Serialize;
use tempest_core::Role;

/// Heredoc delimiter used for file writes.
const EOF_MARKER: &str = "TEMPEST_EOF";

/// One shell-level operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Command {
    /// A single shell command line.
    Exec(String),
    /// Write `contents` verbatim to `path`, replacing it.
    WriteFile { path: String, contents: String },
    /// Run `command` only on machines whose daemons file lists `role`.
    OnRole { role: Role, command: Box<Command> },
}

impl Command {
    pub fn exec(line: impl Into<String>) -> Self {
        Command::Exec(line.into())
    }

    pub fn write_file(path: impl Into<String>, contents: impl Into<String>) -> Self {
        Command::WriteFile {
            path: path.into(),
            contents: contents.into(),
        }
    }

    pub fn on_role(role: Role, command: Command) -> Self {
        Command::OnRole {
            role,
            command: Box::new(command),
        }
    }

    fn render_into(&self, daemons_file: &str, out: &mut String) {
        match self {
            Command::Exec(line) => {
                out.push_str(line);
                out.push('\n');
            }
            Command::WriteFile { path, contents } => {
                out.push_str(&format!("cat > {path} <<'{EOF_MARKER}'\n"));
                out.push_str(contents);
                if !contents.ends_with('\n') {
                    out.push('\n');
                }
                out.push_str(EOF_MARKER);
                out.push('\n');
            }
            Command::OnRole { role, command } => {
                out.push_str(&format!(
                    "if grep -qiw -- '{role}' '{daemons_file}'; then\n"
                ));
                command.render_into(daemons_file, out);
                out.push_str("fi\n");
            }
        }
    }
}

/// Which privilege and point in the node lifecycle a sequence runs at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    /// Embedded in the launch call; runs once at first boot, as root.
    Init,
    /// Elevated setup after the machine is reachable.
    Root,
    /// Unprivileged setup, run as the image user.
    User,
    /// Supervised daemon start, run as the image user.
    Start,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::Root => "root",
            Phase::User => "user",
            Phase::Start => "start",
        }
    }

    pub fn runs_as_root(&self) -> bool {
        matches!(self, Phase::Init | Phase::Root)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered list of commands for one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootCommandSequence {
    pub phase: Phase,
    /// Name the provider gives the task running this sequence.
    pub task_name: String,
    /// Absolute path of the node's daemons file, read by role guards.
    pub daemons_file: String,
    pub commands: Vec<Command>,
}

impl BootCommandSequence {
    pub fn new(phase: Phase, task_name: impl Into<String>, daemons_file: impl Into<String>) -> Self {
        Self {
            phase,
            task_name: task_name.into(),
            daemons_file: daemons_file.into(),
            commands: Vec::new(),
        }
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn extend(&mut self, commands: impl IntoIterator<Item = Command>) {
        self.commands.extend(commands);
    }

    /// Append every command of `other`, keeping this sequence's phase.
    pub fn append(&mut self, other: BootCommandSequence) {
        self.commands.extend(other.commands);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Render as a bash script that stops at the first failing step.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("#!/bin/bash\n");
        out.push_str(&format!("# tempest task {} ({})\n", self.task_name, self.phase));
        out.push_str("set -e\n");
        for command in &self.commands {
            command.render_into(&self.daemons_file, &mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_in_order_with_guards_and_heredocs() {
        let mut seq = BootCommandSequence::new(Phase::User, "setup", "/home/ubuntu/daemons");
        seq.push(Command::exec("echo one"));
        seq.push(Command::write_file("~/a.conf", "k = v"));
        seq.push(Command::on_role(Role::Ui, Command::exec("echo ui-only")));

        let script = seq.render();
        let expected = "#!/bin/bash\n\
# tempest task setup (user)\n\
set -e\n\
echo one\n\
cat > ~/a.conf <<'TEMPEST_EOF'\n\
k = v\n\
TEMPEST_EOF\n\
if grep -qiw -- 'ui' '/home/ubuntu/daemons'; then\n\
echo ui-only\n\
fi\n";
        assert_eq!(script, expected);
    }

    #[test]
    fn guarded_file_write_keeps_heredoc_unindented() {
        let cmd = Command::on_role(
            Role::CoordinationMember,
            Command::write_file("/etc/x", "line\n"),
        );
        let mut out = String::new();
        cmd.render_into("/d", &mut out);
        assert!(out.contains("\nTEMPEST_EOF\nfi\n"));
        assert!(out.starts_with("if grep -qiw -- 'coordination-member' '/d'; then\n"));
    }

    #[test]
    fn append_keeps_phase() {
        let mut init = BootCommandSequence::new(Phase::Init, "init", "/d");
        init.push(Command::exec("a"));
        let mut root = BootCommandSequence::new(Phase::Root, "root", "/d");
        root.push(Command::exec("b"));
        init.append(root);
        assert_eq!(init.phase, Phase::Init);
        assert_eq!(init.len(), 2);
    }
}
