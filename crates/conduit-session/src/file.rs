//! Session storage backed by JSON files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::SessionError;
use crate::storage::{SessionStorage, StoredRecord};

#[derive(Serialize, Deserialize)]
struct FileRecord {
    version: u64,
    data: String,
}

/// One JSON file per session key in `dir`.
///
/// The version check and the write happen under a process-wide lock, so
/// writers sharing one `FileSessionStorage` are serialized. Separate processes
/// writing the same directory are not.
pub struct FileSessionStorage {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSessionStorage {
    /// Create a store, ensuring the directory exists.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Keys map to file names one-to-one: ASCII letters, digits and `-` are
    /// kept, every other byte (including `_`) becomes `_xx` in hex.
    fn record_path(&self, key: &str) -> PathBuf {
        let mut name = String::with_capacity(key.len());
        for byte in key.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                name.push(char::from(byte));
            } else {
                name.push_str(&format!("_{byte:02x}"));
            }
        }
        self.dir.join(format!("{name}.json"))
    }

    fn read(&self, path: &Path) -> Result<Option<FileRecord>, SessionError> {
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(path)?;
        let record: FileRecord = serde_json::from_str(&data).inspect_err(|e| {
            tracing::warn!("Failed to parse session file {}: {e}", path.display());
        })?;
        Ok(Some(record))
    }
}

impl SessionStorage for FileSessionStorage {
    fn exists(&self, key: &str) -> Result<bool, SessionError> {
        Ok(self.record_path(key).exists())
    }

    fn get(&self, key: &str) -> Result<Option<StoredRecord>, SessionError> {
        let record = self.read(&self.record_path(key))?;
        Ok(record.map(|r| StoredRecord {
            version: r.version,
            data: r.data,
        }))
    }

    /// Atomic write: `.tmp` then rename.
    fn save(&self, key: &str, data: String, expected_version: u64) -> Result<u64, SessionError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| SessionError::Storage("session file lock poisoned".into()))?;

        let path = self.record_path(key);
        let found = self.read(&path)?.map_or(0, |r| r.version);
        if found != expected_version {
            return Err(SessionError::Conflict {
                key: key.to_string(),
                expected: expected_version,
                found,
            });
        }

        let version = found + 1;
        let json = serde_json::to_string_pretty(&FileRecord { version, data })?;
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(version)
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        let path = self.record_path(key);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }
}
