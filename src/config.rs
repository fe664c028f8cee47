//! Launcher configuration.
//!
//! Loaded from, in increasing priority:
//! 1. Default values
//! 2. `<configBase>/automate-me/config.yaml`
//! 3. Environment variables with `AUTOMATE_ME_` prefix and `__` as the nesting
//!    separator (e.g. `AUTOMATE_ME_OUTPUT__FORMAT=json`)
//!
//! Configuration only shapes CLI presentation and import defaults. Discovery
//! precedence and the dispatch contract are fixed.

use crate::paths::{Scope, GLOBAL_DIR_NAME};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Name of the optional config file inside the global scope root
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub import: ImportConfig,
}

/// Listing output format
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

/// Target scope for `import` when no flag is given
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DefaultScope {
    /// Local inside a repository, global elsewhere
    #[default]
    Auto,
    Local,
    Global,
}

impl DefaultScope {
    pub fn resolve(&self, has_repo_root: bool) -> Scope {
        match self {
            Self::Auto if has_repo_root => Scope::Local,
            Self::Auto => Scope::Global,
            Self::Local => Scope::Local,
            Self::Global => Scope::Global,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ImportConfig {
    #[serde(default)]
    pub default_scope: DefaultScope,
}

/// Path of the config file under `config_base`.
pub fn config_file_path(config_base: &Path) -> PathBuf {
    config_base.join(GLOBAL_DIR_NAME).join(CONFIG_FILE_NAME)
}

/// `AUTOMATE_ME_*` variables, nested with `__`
/// (e.g. `AUTOMATE_ME_IMPORT__DEFAULT_SCOPE=global`).
fn environment() -> Environment {
    Environment::with_prefix("AUTOMATE_ME")
        .prefix_separator("_")
        .separator("__")
}

/// Load configuration from all sources
pub fn load_config(config_base: &Path) -> Result<AppConfig, ConfigError> {
    load_config_with(config_base, environment())
}

fn load_config_with(config_base: &Path, env: Environment) -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .set_default("output.format", "text")?
        .set_default("import.default_scope", "auto")?
        .add_source(File::from(config_file_path(config_base)).required(false))
        .add_source(env);

    builder.build()?.try_deserialize()
}
