//! Spec import - copies an external manifest into a scope's `specs/` directory.
//!
//! The original bytes are stored unchanged at `<specs>/<sanitized-id>.json`,
//! replacing any previous import of the same plugin id.

use crate::manifest::{Manifest, ManifestError};
use crate::paths::{PathConfig, PathError, Scope};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("read spec {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error("write spec {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Map a plugin id to a safe file stem.
///
/// ASCII letters, digits, `-`, `_` and `.` are kept; anything else becomes `_`.
/// An empty id yields `spec`.
pub fn sanitize_filename(value: &str) -> String {
    if value.is_empty() {
        return "spec".to_string();
    }
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Validate `source` and store it in the `specs/` directory of `scope`.
pub fn import_spec(
    source: &Path,
    paths: &PathConfig,
    scope: Scope,
) -> Result<PathBuf, ImportError> {
    let data = fs::read(source).map_err(|e| ImportError::Read {
        path: source.to_path_buf(),
        source: e,
    })?;
    // An imported spec is never described, so it must name its executable
    let manifest = Manifest::parse_with_exec(&data)?;

    let dest_dir = paths.specs_dir(scope)?;
    fs::create_dir_all(&dest_dir).map_err(|e| ImportError::Write {
        path: dest_dir.clone(),
        source: e,
    })?;
    let dest = dest_dir.join(format!("{}.json", sanitize_filename(manifest.id())));
    fs::write(&dest, &data).map_err(|e| ImportError::Write {
        path: dest.clone(),
        source: e,
    })?;

    info!(id = %manifest.id(), scope = %scope, path = ?dest, "Imported spec");
    Ok(dest)
}
