//! Plugin manifest - the JSON self-description of a plugin and its tasks.
//!
//! The same document comes from two places: the stdout of `<exec> describe`,
//! and static spec files under a scope's `specs/` directory.
//!
//! ```json
//! {
//!   "schemaVersion": 1,
//!   "plugin": { "id": "greet", "title": "Greeter", "exec": "/usr/bin/greet", "execMode": "protocol" },
//!   "tasks": [ { "name": "hello", "inputs": [ { "name": "who", "type": "string", "required": true, "prompt": "Who?" } ] } ]
//! }
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The only manifest schema version this build understands
pub const SCHEMA_VERSION: i64 = 1;

/// Errors raised while decoding or validating a manifest
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("invalid manifest JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("unsupported schemaVersion: {0}")]
    UnsupportedSchema(i64),

    #[error("manifest missing plugin.id")]
    MissingPluginId,

    #[error("task[{0}] missing name")]
    MissingTaskName(usize),

    #[error("manifest for plugin {0} missing plugin.exec")]
    MissingExec(String),
}

/// Decode `null` as the field's default, as if the key were absent.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Top-level manifest document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default, deserialize_with = "null_as_default")]
    pub schema_version: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub plugin: PluginInfo,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tasks: Vec<TaskSpec>,
}

/// Plugin identity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInfo {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Executable override; required for spec files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<String>,
    /// `"protocol"` selects `run <task>` invocation, anything else is direct
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec_mode: Option<String>,
}

impl PluginInfo {
    /// Declared executable, if non-empty
    pub fn exec_path(&self) -> Option<&str> {
        self.exec.as_deref().filter(|exec| !exec.is_empty())
    }

    pub fn exec_mode(&self) -> ExecMode {
        ExecMode::from_tag(self.exec_mode.as_deref())
    }
}

/// A task offered by a plugin
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub inputs: Vec<InputSpec>,
}

/// Type tag of a task input.
///
/// Unknown tags are kept as [`InputType::Other`] so the manifest still loads;
/// only collecting a value for such an input fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InputType {
    String,
    Path,
    Int,
    Float,
    Bool,
    Enum,
    MultiEnum,
    Other(String),
}

impl InputType {
    pub fn is_choice(&self) -> bool {
        matches!(self, Self::Enum | Self::MultiEnum)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::String => "string",
            Self::Path => "path",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Enum => "enum",
            Self::MultiEnum => "multienum",
            Self::Other(tag) => tag.as_str(),
        }
    }
}

impl Default for InputType {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl From<String> for InputType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "string" => Self::String,
            "path" => Self::Path,
            "int" => Self::Int,
            "float" => Self::Float,
            "bool" => Self::Bool,
            "enum" => Self::Enum,
            "multienum" => Self::MultiEnum,
            _ => Self::Other(tag),
        }
    }
}

impl From<InputType> for String {
    fn from(input_type: InputType) -> Self {
        match input_type {
            InputType::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

/// A declared task input
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub input_type: InputType,
    #[serde(default, deserialize_with = "null_as_default")]
    pub required: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub choices: Vec<String>,
    /// Suppress echo when collected interactively
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub secret: bool,
}

/// How a resolved task is invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    /// `<exec>` with no arguments, cwd = repo root
    Direct,
    /// `<exec> run <taskName>`, cwd inherited
    Protocol,
}

impl ExecMode {
    /// `"protocol"` (any case) selects protocol mode; everything else is direct.
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag {
            Some(tag) if tag.eq_ignore_ascii_case("protocol") => Self::Protocol,
            _ => Self::Direct,
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, Self::Direct)
    }
}

impl Manifest {
    /// Decode and validate a manifest, filling empty task titles with the task name.
    pub fn parse(data: &[u8]) -> Result<Self, ManifestError> {
        let mut manifest: Manifest = serde_json::from_slice(data)?;
        if manifest.schema_version != SCHEMA_VERSION {
            return Err(ManifestError::UnsupportedSchema(manifest.schema_version));
        }
        if manifest.plugin.id.is_empty() {
            return Err(ManifestError::MissingPluginId);
        }
        for (i, task) in manifest.tasks.iter_mut().enumerate() {
            if task.name.is_empty() {
                return Err(ManifestError::MissingTaskName(i));
            }
            if task.title.is_empty() {
                task.title = task.name.clone();
            }
        }
        Ok(manifest)
    }

    /// Like [`Manifest::parse`], additionally requiring `plugin.exec`.
    pub fn parse_with_exec(data: &[u8]) -> Result<Self, ManifestError> {
        let manifest = Self::parse(data)?;
        if manifest.plugin.exec_path().is_none() {
            return Err(ManifestError::MissingExec(manifest.plugin.id));
        }
        Ok(manifest)
    }

    pub fn id(&self) -> &str {
        &self.plugin.id
    }
}
