//! Scheme loading from a directory of YAML files.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::Scheme;

/// Errors raised while reading scheme files. All of them are startup-fatal.
#[derive(Error, Debug)]
pub enum SchemeError {
    #[error("Failed to read schemes directory {dir}: {source}")]
    DirUnreadable {
        dir: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read scheme file {file}: {source}")]
    FileUnreadable {
        file: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse scheme file {file}: {source}")]
    ParseError {
        file: PathBuf,
        source: serde_yaml::Error,
    },
}

/// Load every `*.yaml`/`*.yml` file under `dir`, one scheme per file.
///
/// Files are read in lexicographic order so startup diagnostics are stable.
/// Duplicate-id detection happens later, in the registry.
pub fn load_dir(dir: impl AsRef<Path>) -> Result<Vec<Scheme>, SchemeError> {
    let dir = dir.as_ref();
    let entries = fs::read_dir(dir).map_err(|source| SchemeError::DirUnreadable {
        dir: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            matches!(
                path.extension().and_then(|ext| ext.to_str()),
                Some("yaml") | Some("yml")
            )
        })
        .collect();
    files.sort();

    let mut schemes = Vec::with_capacity(files.len());
    for file in files {
        let raw = fs::read_to_string(&file).map_err(|source| SchemeError::FileUnreadable {
            file: file.clone(),
            source,
        })?;
        let scheme: Scheme =
            serde_yaml::from_str(&raw).map_err(|source| SchemeError::ParseError {
                file: file.clone(),
                source,
            })?;
        tracing::info!(id = %scheme.id, file = %file.display(), "loaded scheme");
        schemes.push(scheme);
    }

    Ok(schemes)
}
