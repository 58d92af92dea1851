//! Running rendered boot sequences on machines.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use tempest_provision::{Provisioner, TaskOptions};
use tempest_script::BootCommandSequence;

use crate::error::{OrchestratorError, OrchestratorResult};

/// A sequence rendered once and shared by every machine that runs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptTask {
    pub name: String,
    pub run_as_root: bool,
    pub script: String,
}

impl From<&BootCommandSequence> for ScriptTask {
    fn from(seq: &BootCommandSequence) -> Self {
        Self {
            name: seq.task_name.clone(),
            run_as_root: seq.phase.runs_as_root(),
            script: seq.render(),
        }
    }
}

/// Run `tasks` in order on one machine, stopping at the first failure.
pub async fn run_tasks(
    provider: Arc<dyn Provisioner>,
    machine_id: String,
    tasks: Arc<[ScriptTask]>,
    timeout: Option<Duration>,
) -> OrchestratorResult<()> {
    for task in tasks.iter() {
        let mut options = if task.run_as_root {
            TaskOptions::as_root(&task.name)
        } else {
            TaskOptions::as_user(&task.name)
        };
        if let Some(timeout) = timeout {
            options = options.with_timeout(timeout);
        }

        let run = provider.run_task(&machine_id, &task.script, &options);
        let output = match timeout {
            Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| {
                OrchestratorError::ScriptTimeout {
                    machine: machine_id.clone(),
                    task: task.name.clone(),
                    timeout: limit,
                }
            })?,
            None => run.await,
        }
        .map_err(|e| OrchestratorError::ScriptExecution {
            machine: machine_id.clone(),
            task: task.name.clone(),
            detail: e.to_string(),
        })?;

        if !output.success() {
            warn!(machine = %machine_id, task = %task.name, exit_code = output.exit_code, "task failed");
            return Err(OrchestratorError::ScriptExecution {
                machine: machine_id,
                task: task.name.clone(),
                detail: format!("exit code {}: {}", output.exit_code, output.stderr.trim()),
            });
        }
        debug!(machine = %machine_id, task = %task.name, "task finished");
    }
    Ok(())
}
