//! Plugin resolution - merges every discovered source into one record per plugin id.
//!
//! Sources are merged in a fixed order: local executables, global executables,
//! local specs, global specs. Precedence is by scope:
//! - local replaces global (with a [`Warning::LocalOverride`])
//! - global never replaces local (dropped silently)
//! - within one scope the later source wins, so a spec pins metadata over a
//!   `describe` result for the same id
//!
//! Nothing is cached: every call re-reads the filesystem and re-runs `describe`.

use crate::discovery::{self, DiscoveryError, Warning};
use crate::manifest::{ExecMode, Manifest, TaskSpec};
use crate::paths::{PathConfig, Scope};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// A fully resolved plugin
#[derive(Debug, Clone, PartialEq)]
pub struct PluginRecord {
    /// Executable invoked for this plugin's tasks
    pub path: PathBuf,
    pub scope: Scope,
    pub manifest: Manifest,
    pub exec_mode: ExecMode,
}

impl PluginRecord {
    pub fn id(&self) -> &str {
        self.manifest.id()
    }

    pub fn direct_exec(&self) -> bool {
        self.exec_mode.is_direct()
    }
}

/// One task of one resolved plugin, flattened for listing and dispatch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub plugin_id: String,
    pub plugin_title: String,
    pub task: TaskSpec,
    pub scope: Scope,
    pub plugin_path: PathBuf,
    pub exec_mode: ExecMode,
}

impl TaskRecord {
    /// `"<pluginId>:<taskName>"`
    pub fn id(&self) -> String {
        task_id(&self.plugin_id, &self.task.name)
    }

    pub fn direct_exec(&self) -> bool {
        self.exec_mode.is_direct()
    }
}

/// Compose the stable task identifier.
pub fn task_id(plugin_id: &str, task_name: &str) -> String {
    format!("{}:{}", plugin_id, task_name)
}

/// Result of one resolution pass
#[derive(Debug, Default)]
pub struct Resolution {
    /// One record per plugin id, in no particular order
    pub plugins: Vec<PluginRecord>,
    /// Skipped candidates and overrides, in discovery order
    pub warnings: Vec<Warning>,
}

/// Merge records in arrival order under scope precedence.
pub fn merge_records(
    records: impl IntoIterator<Item = PluginRecord>,
    warnings: &mut Vec<Warning>,
) -> Vec<PluginRecord> {
    let mut by_id: HashMap<String, PluginRecord> = HashMap::new();
    for record in records {
        if let Some(existing) = by_id.get(record.id()) {
            match (existing.scope, record.scope) {
                (Scope::Local, Scope::Global) => {
                    debug!(
                        id = %record.id(),
                        path = ?record.path,
                        "Global plugin shadowed by local"
                    );
                    continue;
                }
                (Scope::Global, Scope::Local) => {
                    warn!(
                        id = %record.id(),
                        local = ?record.path,
                        global = ?existing.path,
                        "Plugin overridden by local"
                    );
                    warnings.push(Warning::LocalOverride {
                        id: record.id().to_string(),
                        local: record.path.clone(),
                        global: existing.path.clone(),
                    });
                }
                // Same scope: later source replaces earlier
                _ => {
                    debug!(id = %record.id(), path = ?record.path, "Replacing same-scope plugin");
                }
            }
        }
        by_id.insert(record.id().to_string(), record);
    }
    by_id.into_values().collect()
}

/// Discover, describe and merge all plugins visible from `paths`.
pub fn load_plugins(paths: &PathConfig) -> Result<Resolution, DiscoveryError> {
    let mut warnings = Vec::new();

    let candidates = discovery::discover_candidates(paths)?;
    let specs = discovery::load_specs(paths, &mut warnings)?;
    let described = discovery::describe_candidates(candidates, &mut warnings);

    let plugins = merge_records(described.into_iter().chain(specs), &mut warnings);
    info!(
        plugins = plugins.len(),
        warnings = warnings.len(),
        "Resolved plugins"
    );
    Ok(Resolution { plugins, warnings })
}

/// Flatten plugins into one record per task.
///
/// A task name repeated within one manifest keeps its last definition, so
/// every task identifier is unique.
pub fn build_tasks(plugins: &[PluginRecord]) -> Vec<TaskRecord> {
    let mut tasks: Vec<TaskRecord> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for plugin in plugins {
        for task in &plugin.manifest.tasks {
            let record = TaskRecord {
                plugin_id: plugin.id().to_string(),
                plugin_title: plugin.manifest.plugin.title.clone(),
                task: task.clone(),
                scope: plugin.scope,
                plugin_path: plugin.path.clone(),
                exec_mode: plugin.exec_mode,
            };
            let id = record.id();
            match index.get(&id) {
                Some(&slot) => {
                    warn!(task = %id, path = ?plugin.path, "Duplicate task name, keeping last");
                    tasks[slot] = record;
                }
                None => {
                    index.insert(id, tasks.len());
                    tasks.push(record);
                }
            }
        }
    }
    tasks
}

/// Order tasks by identifier.
pub fn sort_tasks(tasks: &mut [TaskRecord]) {
    tasks.sort_by_cached_key(TaskRecord::id);
}

/// Find a task by its `"<pluginId>:<taskName>"` identifier.
pub fn find_task<'a>(tasks: &'a [TaskRecord], id: &str) -> Option<&'a TaskRecord> {
    tasks.iter().find(|task| task.id() == id)
}
