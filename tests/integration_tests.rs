//! End-to-end tests for plugin resolution and task dispatch
//!
//! Each test builds a throwaway repository and config base under a temp
//! directory, drops shell-script plugins into the scope directories, and
//! drives the public API the same way the CLI does.

#![cfg(unix)]

use automate_me::discovery::Warning;
use automate_me::dispatch;
use automate_me::inputs;
use automate_me::manifest::ExecMode;
use automate_me::paths::{self, PathConfig, Scope};
use automate_me::plugins::{self, TaskRecord};
use automate_me::specs;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A repository with a `.git` marker plus a separate config base
struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        fs::create_dir_all(dir.path().join("repo").join(".git")).unwrap();
        fs::create_dir_all(dir.path().join("config")).unwrap();
        Self { dir }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn repo(&self) -> PathBuf {
        self.root().join("repo")
    }

    fn config_base(&self) -> PathBuf {
        self.root().join("config")
    }

    fn paths(&self) -> PathConfig {
        PathConfig::with_config_base(Some(self.repo()), self.config_base())
    }

    fn global_only(&self) -> PathConfig {
        PathConfig::with_config_base(None, self.config_base())
    }

    fn bin(&self, scope: Scope) -> PathBuf {
        let dir = self.paths().bin_dir(scope).unwrap();
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn specs(&self, scope: Scope) -> PathBuf {
        let dir = self.paths().specs_dir(scope).unwrap();
        fs::create_dir_all(&dir).unwrap();
        dir
    }
}

fn write_script(path: &Path, body: &str) {
    fs::write(path, body).expect("Failed to write script");
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

/// A plugin that prints `manifest` for `describe` and runs `run_body` otherwise.
fn write_plugin(path: &Path, manifest: &Value, run_body: &str) {
    let script = format!(
        "#!/bin/sh\n\
         if [ \"$1\" = \"describe\" ]; then\n\
         cat <<'MANIFEST'\n{}\nMANIFEST\n\
         exit 0\n\
         fi\n\
         {}\n",
        serde_json::to_string(manifest).unwrap(),
        run_body
    );
    write_script(path, &script);
}

fn manifest(id: &str, title: &str, tasks: &[&str]) -> Value {
    json!({
        "schemaVersion": 1,
        "plugin": {"id": id, "title": title},
        "tasks": tasks.iter().map(|t| json!({"name": t})).collect::<Vec<_>>(),
    })
}

fn resolve_tasks(paths: &PathConfig) -> (Vec<TaskRecord>, Vec<Warning>) {
    let resolution = plugins::load_plugins(paths).expect("resolution failed");
    let mut tasks = plugins::build_tasks(&resolution.plugins);
    plugins::sort_tasks(&mut tasks);
    (tasks, resolution.warnings)
}

// ============================================================================
// DISCOVERY AND DIRECT DISPATCH
// ============================================================================

#[test]
fn test_local_executable_runs_directly_from_repo_root() {
    let ws = Workspace::new();
    let stdin_out = ws.root().join("stdin.json");
    let argc_out = ws.root().join("argc.txt");
    let pwd_out = ws.root().join("pwd.txt");

    let greet = ws.bin(Scope::Local).join("greet");
    write_plugin(
        &greet,
        &json!({
            "schemaVersion": 1,
            "plugin": {"id": "greet", "title": "Greeter"},
            "tasks": [{"name": "hello", "description": "Say hello"}]
        }),
        &format!(
            "cat > '{}'\necho \"$#\" > '{}'\npwd > '{}'",
            stdin_out.display(),
            argc_out.display(),
            pwd_out.display()
        ),
    );

    let paths = ws.paths();
    let (tasks, warnings) = resolve_tasks(&paths);
    assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
    assert_eq!(tasks.len(), 1);

    let task = plugins::find_task(&tasks, "greet:hello").expect("greet:hello missing");
    assert_eq!(task.plugin_title, "Greeter");
    assert_eq!(task.task.title, "hello");
    assert_eq!(task.scope, Scope::Local);
    assert_eq!(task.exec_mode, ExecMode::Direct);
    assert_eq!(task.plugin_path, greet);

    let cwd = ws.repo().join("nested");
    fs::create_dir_all(&cwd).unwrap();
    dispatch::run_task(task, paths.repo_root(), &cwd, Map::new()).unwrap();

    let payload: Value = serde_json::from_slice(&fs::read(&stdin_out).unwrap()).unwrap();
    assert_eq!(payload["args"], json!({}));
    assert_eq!(payload["ctx"]["selectedTaskId"], "greet:hello");
    assert_eq!(
        payload["ctx"]["repoRoot"],
        ws.repo().to_string_lossy().to_string()
    );
    assert_eq!(payload["ctx"]["cwd"], cwd.to_string_lossy().to_string());
    assert_eq!(fs::read_to_string(&argc_out).unwrap(), "0\n");
    let pwd = fs::read_to_string(&pwd_out).unwrap();
    assert_eq!(
        fs::canonicalize(pwd.trim()).unwrap(),
        fs::canonicalize(ws.repo()).unwrap()
    );
}

#[test]
fn test_repo_root_found_from_nested_directory() {
    let ws = Workspace::new();
    let nested = ws.repo().join("a").join("b");
    fs::create_dir_all(&nested).unwrap();
    assert_eq!(paths::find_repo_root(&nested), Some(ws.repo()));
}

// ============================================================================
// SPECS AND PROTOCOL DISPATCH
// ============================================================================

#[test]
fn test_protocol_spec_dispatches_run_verb() {
    let ws = Workspace::new();
    let argv_out = ws.root().join("argv.txt");
    let stdin_out = ws.root().join("stdin.json");

    // The tool lives outside every bin/ directory and never gets described
    let tool = ws.root().join("tool.sh");
    write_script(
        &tool,
        &format!(
            "#!/bin/sh\n\
             if [ \"$1\" = \"describe\" ]; then exit 9; fi\n\
             echo \"$@\" > '{}'\n\
             cat > '{}'\n",
            argv_out.display(),
            stdin_out.display()
        ),
    );
    fs::write(
        ws.specs(Scope::Local).join("tool.json"),
        serde_json::to_string(&json!({
            "schemaVersion": 1,
            "plugin": {"id": "tool", "exec": tool, "execMode": "protocol"},
            "tasks": [{
                "name": "search",
                "inputs": [{"name": "pattern", "type": "string", "required": true}]
            }]
        }))
        .unwrap(),
    )
    .unwrap();

    let paths = ws.paths();
    let (tasks, warnings) = resolve_tasks(&paths);
    assert!(warnings.is_empty());
    let task = plugins::find_task(&tasks, "tool:search").unwrap();
    assert_eq!(task.exec_mode, ExecMode::Protocol);

    let args = inputs::collect_args(&task.task, Map::new(), &["pattern=foo".to_string()]).unwrap();
    dispatch::run_task(task, paths.repo_root(), &ws.repo(), args).unwrap();

    assert_eq!(fs::read_to_string(&argv_out).unwrap(), "run search\n");
    let payload: Value = serde_json::from_slice(&fs::read(&stdin_out).unwrap()).unwrap();
    assert_eq!(payload["args"], json!({"pattern": "foo"}));
    assert_eq!(payload["ctx"]["selectedTaskId"], "tool:search");
}

#[test]
fn test_local_spec_pins_over_local_executable() {
    let ws = Workspace::new();
    let lint = ws.bin(Scope::Local).join("lint");
    write_plugin(&lint, &manifest("lint", "Described", &["check"]), "exit 0");

    fs::write(
        ws.specs(Scope::Local).join("lint.json"),
        serde_json::to_string(&json!({
            "schemaVersion": 1,
            "plugin": {"id": "lint", "title": "Pinned", "exec": "/usr/bin/true"},
            "tasks": [{"name": "fix"}]
        }))
        .unwrap(),
    )
    .unwrap();

    let (tasks, warnings) = resolve_tasks(&ws.paths());
    assert!(warnings.is_empty());
    let ids: Vec<String> = tasks.iter().map(TaskRecord::id).collect();
    assert_eq!(ids, vec!["lint:fix"]);
    assert_eq!(tasks[0].plugin_title, "Pinned");
    assert_eq!(tasks[0].plugin_path, PathBuf::from("/usr/bin/true"));
}

#[test]
fn test_imported_spec_is_discovered() {
    let ws = Workspace::new();
    let source = ws.root().join("incoming.json");
    fs::write(
        &source,
        r#"{"schemaVersion":1,"plugin":{"id":"ci/tools","exec":"/bin/true"},"tasks":[{"name":"build"}]}"#,
    )
    .unwrap();

    let paths = ws.paths();
    let dest = specs::import_spec(&source, &paths, Scope::Global).unwrap();
    assert_eq!(
        dest,
        ws.config_base()
            .join("automate-me")
            .join("specs")
            .join("ci_tools.json")
    );

    let (tasks, _) = resolve_tasks(&paths);
    let task = plugins::find_task(&tasks, "ci/tools:build").unwrap();
    assert_eq!(task.scope, Scope::Global);
}

// ============================================================================
// PRECEDENCE
// ============================================================================

#[test]
fn test_local_overrides_global_with_warning() {
    let ws = Workspace::new();
    let global = ws.bin(Scope::Global).join("fmt");
    let local = ws.bin(Scope::Local).join("fmt");
    write_plugin(&global, &manifest("fmt", "Global fmt", &["run", "old"]), "exit 0");
    write_plugin(&local, &manifest("fmt", "Local fmt", &["run"]), "exit 0");

    let (tasks, warnings) = resolve_tasks(&ws.paths());
    let ids: Vec<String> = tasks.iter().map(TaskRecord::id).collect();
    assert_eq!(ids, vec!["fmt:run"]);
    assert_eq!(tasks[0].plugin_title, "Local fmt");
    assert_eq!(tasks[0].scope, Scope::Local);
    assert_eq!(tasks[0].plugin_path, local);

    // Local executables are merged before global ones, so a global record
    // arriving second is dropped without a warning
    assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
}

#[test]
fn test_local_spec_overriding_global_executable_warns() {
    let ws = Workspace::new();
    let global = ws.bin(Scope::Global).join("deploy");
    write_plugin(&global, &manifest("deploy", "Global", &["ship"]), "exit 0");
    fs::write(
        ws.specs(Scope::Local).join("deploy.json"),
        r#"{"schemaVersion":1,"plugin":{"id":"deploy","exec":"/bin/true"},"tasks":[{"name":"ship"}]}"#,
    )
    .unwrap();

    let (tasks, warnings) = resolve_tasks(&ws.paths());
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].scope, Scope::Local);
    assert_eq!(
        warnings,
        vec![Warning::LocalOverride {
            id: "deploy".to_string(),
            local: PathBuf::from("/bin/true"),
            global: global.clone(),
        }]
    );
}

#[test]
fn test_global_only_without_repository() {
    let ws = Workspace::new();
    write_plugin(
        &ws.bin(Scope::Global).join("notes"),
        &manifest("notes", "Notes", &["today"]),
        "exit 0",
    );
    write_plugin(
        &ws.bin(Scope::Local).join("hidden"),
        &manifest("hidden", "Hidden", &["x"]),
        "exit 0",
    );

    let (tasks, warnings) = resolve_tasks(&ws.global_only());
    assert!(warnings.is_empty());
    let ids: Vec<String> = tasks.iter().map(TaskRecord::id).collect();
    assert_eq!(ids, vec!["notes:today"]);
}

#[test]
fn test_task_ids_are_unique_and_sorted() {
    let ws = Workspace::new();
    write_plugin(
        &ws.bin(Scope::Local).join("b"),
        &manifest("beta", "Beta", &["two", "one"]),
        "exit 0",
    );
    write_plugin(
        &ws.bin(Scope::Global).join("a"),
        &manifest("alpha", "Alpha", &["x"]),
        "exit 0",
    );
    write_plugin(
        &ws.bin(Scope::Global).join("b2"),
        &manifest("beta", "Shadowed", &["three"]),
        "exit 0",
    );

    let (tasks, _) = resolve_tasks(&ws.paths());
    let ids: Vec<String> = tasks.iter().map(TaskRecord::id).collect();
    assert_eq!(ids, vec!["alpha:x", "beta:one", "beta:two"]);
    let unique: HashSet<&String> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len());
}

// ============================================================================
// FAILURES
// ============================================================================

#[test]
fn test_broken_describe_is_skipped_with_warning() {
    let ws = Workspace::new();
    let bin = ws.bin(Scope::Local);
    write_script(&bin.join("broken"), "#!/bin/sh\necho 'not json'\n");
    write_script(&bin.join("crashes"), "#!/bin/sh\nexit 3\n");
    write_plugin(&bin.join("ok"), &manifest("ok", "Ok", &["go"]), "exit 0");
    fs::write(bin.join("README.txt"), "not executable").unwrap();

    let (tasks, warnings) = resolve_tasks(&ws.paths());
    let ids: Vec<String> = tasks.iter().map(TaskRecord::id).collect();
    assert_eq!(ids, vec!["ok:go"]);
    assert_eq!(warnings.len(), 2);
    assert!(warnings
        .iter()
        .all(|w| matches!(w, Warning::DescribeFailed { .. })));
}

#[test]
fn test_invalid_spec_is_skipped_with_warning() {
    let ws = Workspace::new();
    let specs_dir = ws.specs(Scope::Global);
    fs::write(specs_dir.join("bad.json"), "{").unwrap();
    fs::write(
        specs_dir.join("noexec.json"),
        r#"{"schemaVersion":1,"plugin":{"id":"x"},"tasks":[]}"#,
    )
    .unwrap();
    fs::write(specs_dir.join("notes.txt"), "ignored").unwrap();

    let (tasks, warnings) = resolve_tasks(&ws.paths());
    assert!(tasks.is_empty());
    assert_eq!(warnings.len(), 2);
    assert!(warnings
        .iter()
        .all(|w| matches!(w, Warning::InvalidSpec { .. })));
}

#[test]
fn test_failing_task_reports_exit_status() {
    let ws = Workspace::new();
    write_plugin(
        &ws.bin(Scope::Local).join("boom"),
        &manifest("boom", "Boom", &["go"]),
        "exit 4",
    );

    let paths = ws.paths();
    let (tasks, _) = resolve_tasks(&paths);
    let task = plugins::find_task(&tasks, "boom:go").unwrap();
    let err = dispatch::run_task(task, paths.repo_root(), &ws.repo(), Map::new()).unwrap_err();
    assert!(err.to_string().contains("boom:go"));
}

#[test]
fn test_plugin_with_null_tasks_is_kept() {
    let ws = Workspace::new();
    write_plugin(
        &ws.bin(Scope::Local).join("empty"),
        &json!({
            "schemaVersion": 1,
            "plugin": {"id": "empty", "title": "Empty"},
            "tasks": null
        }),
        "exit 0",
    );

    let resolution = plugins::load_plugins(&ws.paths()).unwrap();
    assert!(resolution.warnings.is_empty());
    assert_eq!(resolution.plugins.len(), 1);
    assert_eq!(resolution.plugins[0].id(), "empty");
    assert!(plugins::build_tasks(&resolution.plugins).is_empty());
}
