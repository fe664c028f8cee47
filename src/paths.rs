//! Scope roots and repository detection.
//!
//! Two scopes carry plugins, both with the same layout:
//! - `<repoRoot>/.automate-me/{bin,specs}` (local)
//! - `<configBase>/automate-me/{bin,specs}` (global)
//!
//! `<configBase>` is `$XDG_CONFIG_HOME` when set, otherwise the platform's
//! per-user configuration directory.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Directory name of the local scope inside a repository
pub const LOCAL_DIR_NAME: &str = ".automate-me";
/// Directory name of the global scope inside the config base
pub const GLOBAL_DIR_NAME: &str = "automate-me";
/// Version-control marker used as a repo root fallback
pub const VCS_MARKER: &str = ".git";
pub const BIN_DIR_NAME: &str = "bin";
pub const SPECS_DIR_NAME: &str = "specs";
/// Environment variable overriding the config base directory
pub const CONFIG_HOME_ENV: &str = "XDG_CONFIG_HOME";

/// Where a plugin or spec was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Local,
    Global,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Global => "global",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Scope {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "global" => Ok(Self::Global),
            _ => Err(format!("Invalid scope '{}'. Must be: local, global", s)),
        }
    }
}

/// Configuration-class errors: a scope root cannot be computed
#[derive(Debug, Error)]
pub enum PathError {
    #[error("no repo root: local scope is undefined outside a repository")]
    NoRepoRoot,

    #[error("cannot resolve a user config directory (set {CONFIG_HOME_ENV})")]
    NoConfigDir,
}

/// Resolve the global config base: `$XDG_CONFIG_HOME`, else the platform config dir.
pub fn config_base_dir() -> Result<PathBuf, PathError> {
    if let Some(dir) = std::env::var_os(CONFIG_HOME_ENV) {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    dirs::config_dir().ok_or(PathError::NoConfigDir)
}

/// Walk upward from `start` looking for the repository root.
///
/// A directory holding `.automate-me` wins immediately, at any depth. Otherwise
/// the closest directory holding `.git` is returned. `None` means only the
/// global scope applies.
pub fn find_repo_root(start: &Path) -> Option<PathBuf> {
    let mut vcs_root: Option<&Path> = None;
    for dir in start.ancestors() {
        if dir.join(LOCAL_DIR_NAME).exists() {
            debug!(root = ?dir, "Found local scope marker");
            return Some(dir.to_path_buf());
        }
        if vcs_root.is_none() && dir.join(VCS_MARKER).exists() {
            vcs_root = Some(dir);
        }
    }
    if let Some(dir) = vcs_root {
        debug!(root = ?dir, "Falling back to version-control root");
    }
    vcs_root.map(Path::to_path_buf)
}

/// Computes scope roots for one resolution pass.
#[derive(Debug, Clone)]
pub struct PathConfig {
    repo_root: Option<PathBuf>,
    config_base: PathBuf,
}

impl PathConfig {
    /// Build from the process environment. An empty `repo_root` counts as none.
    pub fn new(repo_root: Option<PathBuf>) -> Result<Self, PathError> {
        Ok(Self::with_config_base(repo_root, config_base_dir()?))
    }

    /// Build with an explicit config base (no environment lookup).
    pub fn with_config_base(
        repo_root: Option<PathBuf>,
        config_base: impl Into<PathBuf>,
    ) -> Self {
        Self {
            repo_root: repo_root.filter(|p| !p.as_os_str().is_empty()),
            config_base: config_base.into(),
        }
    }

    pub fn repo_root(&self) -> Option<&Path> {
        self.repo_root.as_deref()
    }

    pub fn config_base(&self) -> &Path {
        &self.config_base
    }

    /// `<repoRoot>/.automate-me` or `<configBase>/automate-me`
    pub fn scope_root(&self, scope: Scope) -> Result<PathBuf, PathError> {
        match scope {
            Scope::Local => self
                .repo_root
                .as_ref()
                .map(|root| root.join(LOCAL_DIR_NAME))
                .ok_or(PathError::NoRepoRoot),
            Scope::Global => Ok(self.config_base.join(GLOBAL_DIR_NAME)),
        }
    }

    pub fn bin_dir(&self, scope: Scope) -> Result<PathBuf, PathError> {
        Ok(self.scope_root(scope)?.join(BIN_DIR_NAME))
    }

    pub fn specs_dir(&self, scope: Scope) -> Result<PathBuf, PathError> {
        Ok(self.scope_root(scope)?.join(SPECS_DIR_NAME))
    }

    /// Scopes that exist for this pass, local first.
    pub fn scopes(&self) -> Vec<Scope> {
        if self.repo_root.is_some() {
            vec![Scope::Local, Scope::Global]
        } else {
            vec![Scope::Global]
        }
    }
}
