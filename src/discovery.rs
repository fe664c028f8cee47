//! Plugin discovery - finds plugin sources inside a scope.
//!
//! Two sources per scope:
//! - `bin/`: executables that describe themselves via `<exec> describe`
//! - `specs/`: `*.json` manifests pointing at an executable via `plugin.exec`
//!
//! A missing directory yields nothing. An unreadable one is an error. A single
//! bad candidate only produces a [`Warning`] and is skipped.

use crate::manifest::{Manifest, ManifestError};
use crate::paths::{PathConfig, PathError, Scope};
use crate::plugins::PluginRecord;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use thiserror::Error;
use tracing::{debug, warn};

/// Extension of declarative spec files (matched case-insensitively)
pub const SPEC_EXTENSION: &str = "json";
/// Portability fallback for platforms without execute bits
pub const EXE_SUFFIX: &str = ".exe";
/// Verb passed to executables to obtain their manifest
pub const DESCRIBE_VERB: &str = "describe";

/// Fatal discovery errors
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Why a `describe` call produced no manifest
#[derive(Debug, Error)]
pub enum DescribeError {
    #[error("spawn failed: {0}")]
    Spawn(#[source] io::Error),

    #[error("describe exited with {0}")]
    Failed(ExitStatus),

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// Non-fatal problems collected during a resolution pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// `describe` failed or printed an invalid manifest
    DescribeFailed { path: PathBuf, error: String },
    /// A spec file failed to parse or lacks `plugin.exec`
    InvalidSpec { path: PathBuf, error: String },
    /// A local plugin replaced a global one with the same id
    LocalOverride {
        id: String,
        local: PathBuf,
        global: PathBuf,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DescribeFailed { path, error } => {
                write!(f, "{} describe failed: {}", path.display(), error)
            }
            Self::InvalidSpec { path, error } => {
                write!(f, "invalid spec {}: {}", path.display(), error)
            }
            Self::LocalOverride { id, local, global } => write!(
                f,
                "plugin id {} overridden by local {} (was {})",
                id,
                local.display(),
                global.display()
            ),
        }
    }
}

/// A discovered executable awaiting `describe`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginCandidate {
    pub path: PathBuf,
    pub scope: Scope,
}

/// Sorted entries of `dir`, or `None` if it does not exist.
fn read_dir_sorted(dir: &Path) -> Result<Option<Vec<fs::DirEntry>>, DiscoveryError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = ?dir, "Plugin directory does not exist");
            return Ok(None);
        }
        Err(source) => {
            return Err(DiscoveryError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
    };
    let mut entries = entries
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| DiscoveryError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    entries.sort_by_key(|entry| entry.file_name());
    Ok(Some(entries))
}

/// Whether `path` should be treated as a plugin executable.
pub fn is_executable(path: &Path, metadata: &fs::Metadata) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 != 0 {
            return true;
        }
    }
    #[cfg(not(unix))]
    let _ = metadata;

    path.file_name()
        .map(|name| {
            name.to_string_lossy()
                .to_lowercase()
                .ends_with(EXE_SUFFIX)
        })
        .unwrap_or(false)
}

/// List executable files directly inside `dir`.
pub fn find_executables(dir: &Path) -> Result<Vec<PathBuf>, DiscoveryError> {
    let Some(entries) = read_dir_sorted(dir)? else {
        return Ok(Vec::new());
    };
    let mut found = Vec::new();
    for entry in entries {
        let path = entry.path();
        // Follows symlinks so linked binaries count
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!(path = ?path, error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if metadata.is_dir() {
            continue;
        }
        if is_executable(&path, &metadata) {
            found.push(path);
        } else {
            debug!(path = ?path, "Skipping non-executable file");
        }
    }
    Ok(found)
}

/// Executable candidates from the `bin/` of every available scope, local first.
pub fn discover_candidates(paths: &PathConfig) -> Result<Vec<PluginCandidate>, DiscoveryError> {
    let mut candidates = Vec::new();
    for scope in paths.scopes() {
        let dir = paths.bin_dir(scope)?;
        for path in find_executables(&dir)? {
            candidates.push(PluginCandidate { path, scope });
        }
    }
    Ok(candidates)
}

/// Run `<path> describe` and parse its stdout as a manifest.
pub fn describe_plugin(path: &Path) -> Result<Manifest, DescribeError> {
    debug!(path = ?path, "Describing plugin");
    let output = Command::new(path)
        .arg(DESCRIBE_VERB)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .output()
        .map_err(DescribeError::Spawn)?;
    if !output.status.success() {
        return Err(DescribeError::Failed(output.status));
    }
    Ok(Manifest::parse(&output.stdout)?)
}

/// Describe each candidate, skipping failures with a warning.
pub fn describe_candidates(
    candidates: Vec<PluginCandidate>,
    warnings: &mut Vec<Warning>,
) -> Vec<PluginRecord> {
    let mut records = Vec::new();
    for candidate in candidates {
        match describe_plugin(&candidate.path) {
            Ok(manifest) => {
                let exec_mode = manifest.plugin.exec_mode();
                records.push(PluginRecord {
                    path: candidate.path,
                    scope: candidate.scope,
                    manifest,
                    exec_mode,
                });
            }
            Err(e) => {
                warn!(path = ?candidate.path, error = %e, "Plugin describe failed");
                warnings.push(Warning::DescribeFailed {
                    path: candidate.path,
                    error: e.to_string(),
                });
            }
        }
    }
    records
}

fn has_spec_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(SPEC_EXTENSION))
        .unwrap_or(false)
}

/// Parse every `*.json` spec in `dir` into records for `scope`.
pub fn read_spec_dir(
    dir: &Path,
    scope: Scope,
    warnings: &mut Vec<Warning>,
) -> Result<Vec<PluginRecord>, DiscoveryError> {
    let Some(entries) = read_dir_sorted(dir)? else {
        return Ok(Vec::new());
    };
    let mut records = Vec::new();
    for entry in entries {
        let path = entry.path();
        if path.is_dir() || !has_spec_extension(&path) {
            continue;
        }
        let data = fs::read(&path).map_err(|source| DiscoveryError::Io {
            path: path.clone(),
            source,
        })?;
        let manifest = match Manifest::parse_with_exec(&data) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(path = ?path, error = %e, "Skipping invalid spec");
                warnings.push(Warning::InvalidSpec {
                    path,
                    error: e.to_string(),
                });
                continue;
            }
        };
        let exec = PathBuf::from(manifest.plugin.exec_path().unwrap_or_default());
        let exec_mode = manifest.plugin.exec_mode();
        debug!(path = ?path, id = %manifest.id(), mode = ?exec_mode, "Loaded spec");
        records.push(PluginRecord {
            path: exec,
            scope,
            manifest,
            exec_mode,
        });
    }
    Ok(records)
}

/// Spec records from the `specs/` of every available scope, local first.
pub fn load_specs(
    paths: &PathConfig,
    warnings: &mut Vec<Warning>,
) -> Result<Vec<PluginRecord>, DiscoveryError> {
    let mut records = Vec::new();
    for scope in paths.scopes() {
        let dir = paths.specs_dir(scope)?;
        records.extend(read_spec_dir(&dir, scope, warnings)?);
    }
    Ok(records)
}
