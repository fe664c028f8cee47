//! Task dispatcher - runs a resolved task as a child process.
//!
//! Contract with the plugin process:
//! - stdin: `{"args": {...}, "ctx": {"repoRoot", "cwd", "selectedTaskId"}}`
//! - stdout/stderr: inherited from the launcher
//! - env: the launcher's environment plus the `AUTOMATE_ME_*` variables below
//!
//! Direct mode runs `<exec>` with no arguments inside the repo root.
//! Protocol mode runs `<exec> run <taskName>` in the inherited cwd.
//!
//! There is no timeout: the call blocks until the child exits.

use crate::manifest::ExecMode;
use crate::plugins::TaskRecord;
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use thiserror::Error;
use tracing::{debug, info};

pub const ENV_REPO_ROOT: &str = "AUTOMATE_ME_REPO_ROOT";
pub const ENV_CWD: &str = "AUTOMATE_ME_CWD";
pub const ENV_TASK_ID: &str = "AUTOMATE_ME_TASK_ID";
pub const ENV_PLUGIN_ID: &str = "AUTOMATE_ME_PLUGIN_ID";
pub const ENV_TASK_NAME: &str = "AUTOMATE_ME_TASK_NAME";
pub const ENV_SCOPE: &str = "AUTOMATE_ME_SCOPE";

/// Subcommand used in protocol mode
pub const RUN_VERB: &str = "run";

/// Errors surfaced to the caller of [`run_task`]. Never retried.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("encode input JSON: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to start {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write task input: {0}")]
    Stdin(#[source] io::Error),

    #[error("failed waiting for {path}: {source}")]
    Wait {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("task {task_id} failed: {path} exited with {status}")]
    Failed {
        task_id: String,
        path: PathBuf,
        status: ExitStatus,
    },
}

/// Context block of the stdin payload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunContext {
    pub repo_root: String,
    pub cwd: String,
    pub selected_task_id: String,
}

/// JSON written to the plugin's stdin
#[derive(Debug, Clone, Serialize)]
pub struct RunPayload {
    pub args: Map<String, Value>,
    pub ctx: RunContext,
}

impl RunPayload {
    pub fn new(
        task: &TaskRecord,
        repo_root: Option<&Path>,
        cwd: &Path,
        args: Map<String, Value>,
    ) -> Self {
        Self {
            args,
            ctx: RunContext {
                repo_root: path_string(repo_root),
                cwd: cwd.to_string_lossy().to_string(),
                selected_task_id: task.id(),
            },
        }
    }
}

fn path_string(path: Option<&Path>) -> String {
    path.map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// The six variables added to the plugin's environment.
pub fn task_env(
    task: &TaskRecord,
    repo_root: Option<&Path>,
    cwd: &Path,
) -> Vec<(&'static str, String)> {
    vec![
        (ENV_REPO_ROOT, path_string(repo_root)),
        (ENV_CWD, cwd.to_string_lossy().to_string()),
        (ENV_TASK_ID, task.id()),
        (ENV_PLUGIN_ID, task.plugin_id.clone()),
        (ENV_TASK_NAME, task.task.name.clone()),
        (ENV_SCOPE, task.scope.to_string()),
    ]
}

/// Build the child command for `task` (no stdio wiring).
pub fn build_command(task: &TaskRecord, repo_root: Option<&Path>, cwd: &Path) -> Command {
    let mut cmd = Command::new(&task.plugin_path);
    match task.exec_mode {
        ExecMode::Direct => {
            if let Some(root) = repo_root.filter(|r| !r.as_os_str().is_empty()) {
                cmd.current_dir(root);
            }
        }
        ExecMode::Protocol => {
            cmd.arg(RUN_VERB).arg(&task.task.name);
        }
    }
    cmd.envs(task_env(task, repo_root, cwd));
    cmd
}

/// Run `task` to completion with `args` as its input.
pub fn run_task(
    task: &TaskRecord,
    repo_root: Option<&Path>,
    cwd: &Path,
    args: Map<String, Value>,
) -> Result<(), DispatchError> {
    let task_id = task.id();
    let payload = serde_json::to_vec(&RunPayload::new(task, repo_root, cwd, args))?;

    info!(task = %task_id, path = ?task.plugin_path, mode = ?task.exec_mode, "Running task");
    let mut child = build_command(task, repo_root, cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|source| DispatchError::Spawn {
            path: task.plugin_path.clone(),
            source,
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        match stdin.write_all(&payload) {
            Ok(()) => {}
            // The plugin may exit without reading its input
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                debug!(task = %task_id, "Plugin closed stdin early");
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(DispatchError::Stdin(e));
            }
        }
    }

    let status = child.wait().map_err(|source| DispatchError::Wait {
        path: task.plugin_path.clone(),
        source,
    })?;
    if !status.success() {
        return Err(DispatchError::Failed {
            task_id,
            path: task.plugin_path.clone(),
            status,
        });
    }
    debug!(task = %task_id, "Task finished");
    Ok(())
}
