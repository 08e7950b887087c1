//! Key-value storage contract for sessions.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::SessionError;

/// A stored session payload and its version. Version 0 means "absent".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub version: u64,
    pub data: String,
}

/// Where sessions live between calls.
///
/// `save` is a compare-and-swap on the record version: it must fail with
/// [`SessionError::Conflict`] when the stored version differs from
/// `expected_version`, so concurrent writers cannot silently overwrite each
/// other.
pub trait SessionStorage: Send + Sync {
    fn exists(&self, key: &str) -> Result<bool, SessionError>;

    fn get(&self, key: &str) -> Result<Option<StoredRecord>, SessionError>;

    /// Store `data` and return the new version.
    fn save(&self, key: &str, data: String, expected_version: u64) -> Result<u64, SessionError>;

    fn remove(&self, key: &str) -> Result<(), SessionError>;
}

/// Process-local storage.
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    records: Mutex<HashMap<String, StoredRecord>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> Result<MutexGuard<'_, HashMap<String, StoredRecord>>, SessionError> {
        self.records
            .lock()
            .map_err(|_| SessionError::Storage("session storage lock poisoned".into()))
    }
}

impl SessionStorage for MemorySessionStorage {
    fn exists(&self, key: &str) -> Result<bool, SessionError> {
        Ok(self.records()?.contains_key(key))
    }

    fn get(&self, key: &str) -> Result<Option<StoredRecord>, SessionError> {
        Ok(self.records()?.get(key).cloned())
    }

    fn save(&self, key: &str, data: String, expected_version: u64) -> Result<u64, SessionError> {
        let mut records = self.records()?;
        let found = records.get(key).map_or(0, |r| r.version);
        if found != expected_version {
            return Err(SessionError::Conflict {
                key: key.to_string(),
                expected: expected_version,
                found,
            });
        }
        let version = found + 1;
        records.insert(key.to_string(), StoredRecord { version, data });
        Ok(version)
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        self.records()?.remove(key);
        Ok(())
    }
}
