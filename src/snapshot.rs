//! Snapshot file format and I/O.
//!
//! The persisted state is a single human-readable JSON document holding the
//! full envelope and location sets. Every flush rewrites it wholesale; there
//! is no incremental or append format, and no write-ahead log. A crash
//! between a mutation and the next flush loses only the unflushed delta.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{Envelope, Location};
use crate::error::CatalogError;

/// The on-disk document: everything the store needs to restore itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Snapshot {
    /// When this snapshot was written. Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,

    /// Every indexed envelope, in reference order.
    #[serde(default)]
    pub entities: Vec<Envelope>,

    /// Every registered location, in id order.
    #[serde(default)]
    pub locations: Vec<Location>,
}

/// Reads a snapshot. `Ok(None)` means the file does not exist, which is the
/// normal first-run condition, not an error.
pub(crate) fn read(path: &Path) -> Result<Option<Snapshot>, CatalogError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(CatalogError::Io {
                path: path.to_path_buf(),
                source: err,
            })
        }
    };
    let snapshot = serde_json::from_str(&raw)?;
    Ok(Some(snapshot))
}

/// Writes a snapshot, creating parent directories as needed.
pub(crate) fn write(path: &Path, snapshot: &Snapshot) -> Result<(), CatalogError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir).map_err(|err| CatalogError::Io {
                path: path.to_path_buf(),
                source: err,
            })?;
        }
    }

    let raw = serde_json::to_string_pretty(snapshot)?;
    fs::write(path, raw).map_err(|err| CatalogError::Io {
        path: path.to_path_buf(),
        source: err,
    })
}
