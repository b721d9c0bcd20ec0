// SPDX-License-Identifier: MIT

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error at {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Wraps a stored document with a schema version and last-write timestamp,
/// matching the teacher's `Snapshot { version, ... }` durability hygiene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Versioned<T> {
    #[serde(rename = "v")]
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub data: T,
}

impl<T> Versioned<T> {
    pub fn new(version: u32, data: T) -> Self {
        Self { version, updated_at: Utc::now(), data }
    }
}

/// Generic atomic JSON document store: write(tmp) -> fsync -> rename -> chmod.
///
/// One instance per logical document (tunnel state, forwarding rules, ...).
/// Never mutates the final path in place.
pub struct AtomicJsonStore<T> {
    path: PathBuf,
    mode: u32,
    _marker: PhantomData<T>,
}

impl<T> AtomicJsonStore<T>
where
    T: Serialize + for<'de> Deserialize<'de>,
{
    pub fn new(path: impl Into<PathBuf>, mode: u32) -> Self {
        Self { path: path.into(), mode, _marker: PhantomData }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document if present. Missing file is `Ok(None)`; corrupt
    /// JSON is surfaced so callers can decide whether to start fresh.
    pub fn load(&self) -> Result<Option<T>, StorageError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io { path: self.path.clone(), source: e }),
        }
    }

    /// Write the document atomically: serialize to a sibling `.tmp` file,
    /// fsync it, rename over the final path, then chmod.
    pub fn save(&self, value: &T) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::Io { path: parent.to_path_buf(), source: e })?;
        }
        let json = serde_json::to_vec_pretty(value)?;
        let tmp_path = self.path.with_extension("tmp");

        let write_result = (|| -> std::io::Result<()> {
            let mut f = std::fs::File::create(&tmp_path)?;
            use std::io::Write;
            f.write_all(&json)?;
            f.sync_all()?;
            Ok(())
        })();
        write_result.map_err(|e| StorageError::Io { path: tmp_path.clone(), source: e })?;

        std::fs::rename(&tmp_path, &self.path)
            .map_err(|e| StorageError::Io { path: self.path.clone(), source: e })?;

        set_permissions(&self.path, self.mode)
            .map_err(|e| StorageError::Io { path: self.path.clone(), source: e })?;
        Ok(())
    }
}

#[cfg(unix)]
fn set_permissions(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Doc {
        name: String,
        count: u32,
    }

    #[test]
    fn round_trips_and_sets_mode() {
        let dir = tempfile::tempdir().unwrap();
        let store: AtomicJsonStore<Doc> = AtomicJsonStore::new(dir.path().join("doc.json"), 0o600);
        assert!(store.load().unwrap().is_none());

        let doc = Doc { name: "a".into(), count: 1 };
        store.save(&doc).unwrap();
        assert_eq!(store.load().unwrap(), Some(doc));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let meta = std::fs::metadata(store.path()).unwrap();
            assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        }
    }

    #[test]
    fn no_tmp_file_survives_a_successful_save() {
        let dir = tempfile::tempdir().unwrap();
        let store: AtomicJsonStore<Doc> = AtomicJsonStore::new(dir.path().join("doc.json"), 0o600);
        store.save(&Doc { name: "x".into(), count: 0 }).unwrap();
        assert!(!dir.path().join("doc.tmp").exists());
    }
}
