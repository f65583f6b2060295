// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Persistent token storage.
//!
//! `TokenStore` is the only code that reads or writes the persisted token
//! keys. The backing `KeyValueStorage` mirrors browser local storage: string
//! keys to string values, surviving restarts.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

use crate::error::ClientError;
use crate::models::TokenRecord;

pub const ACCESS_TOKEN_KEY: &str = "stravaAccessToken";
pub const REFRESH_TOKEN_KEY: &str = "stravaRefreshToken";
pub const TOKEN_EXPIRY_KEY: &str = "stravaTokenExpiry";

/// Storage backend errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt storage file: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl From<StorageError> for ClientError {
    fn from(err: StorageError) -> Self {
        ClientError::Storage(err.to_string())
    }
}

/// String key/value storage.
pub trait KeyValueStorage: Send {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;

    /// Read several keys from one snapshot of the storage.
    fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<String>>, StorageError> {
        keys.iter().map(|key| self.get(key)).collect()
    }

    /// Write every entry as one operation.
    fn set_many(&mut self, entries: &[(&str, &str)]) -> Result<(), StorageError> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }

    fn remove_many(&mut self, keys: &[&str]) -> Result<(), StorageError> {
        for key in keys {
            self.remove(key)?;
        }
        Ok(())
    }
}

/// In-memory storage, lost when dropped.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    entries: BTreeMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Storage kept in a JSON object file, readable only by the owner.
///
/// The file is re-read on every access so separate processes sharing the
/// path see each other's writes on their next read, with no coordination.
/// Writes go to a temporary sibling that is renamed over the file, so a
/// reader sees either the old contents or the new ones.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let content = serde_json::to_string_pretty(entries)?;
        secure_write(&self.path, &content)?;
        Ok(())
    }
}

/// Distinguishes temporary files of concurrent writers in one process.
static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

fn secure_write(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(
        ".{}.{}.{}.tmp",
        file_name,
        std::process::id(),
        WRITE_SEQ.fetch_add(1, Ordering::Relaxed)
    ));

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let written = options.open(&tmp_path).and_then(|mut file| {
        file.write_all(content.as_bytes())?;
        file.sync_all()
    });
    if let Err(err) = written.and_then(|()| std::fs::rename(&tmp_path, path)) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(err);
    }

    Ok(())
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries)
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.remove_many(&[key])
    }

    fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<String>>, StorageError> {
        let mut entries = self.read_all()?;
        Ok(keys.iter().map(|key| entries.remove(*key)).collect())
    }

    fn set_many(&mut self, new_entries: &[(&str, &str)]) -> Result<(), StorageError> {
        let mut entries = self.read_all()?;
        for (key, value) in new_entries {
            entries.insert(key.to_string(), value.to_string());
        }
        self.write_all(&entries)
    }

    fn remove_many(&mut self, keys: &[&str]) -> Result<(), StorageError> {
        let mut entries = self.read_all()?;
        let before = entries.len();
        entries.retain(|key, _| !keys.contains(&key.as_str()));
        if entries.len() != before {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}

/// Owner of the persisted `TokenRecord`.
///
/// All three keys are written and read as one storage operation, so a reader
/// never observes a partially saved record, even from another process.
pub struct TokenStore<S> {
    storage: Mutex<S>,
}

impl<S: KeyValueStorage> TokenStore<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage: Mutex::new(storage),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, S> {
        self.storage
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn save(&self, record: &TokenRecord) -> Result<(), ClientError> {
        let expires_at = record.expires_at.to_string();
        self.lock().set_many(&[
            (ACCESS_TOKEN_KEY, record.access_token.as_str()),
            (REFRESH_TOKEN_KEY, record.refresh_token.as_str()),
            (TOKEN_EXPIRY_KEY, expires_at.as_str()),
        ])?;
        tracing::debug!(expires_at = record.expires_at, "Tokens saved");
        Ok(())
    }

    /// Read the stored record. `None` when any field is absent or the
    /// expiry is not a number.
    pub fn load(&self) -> Result<Option<TokenRecord>, ClientError> {
        let values =
            self.lock()
                .get_many(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, TOKEN_EXPIRY_KEY])?;

        let [Some(access_token), Some(refresh_token), Some(expires_at)] =
            <[Option<String>; 3]>::try_from(values).unwrap_or_default()
        else {
            return Ok(None);
        };

        let Ok(expires_at) = expires_at.trim().parse::<i64>() else {
            tracing::warn!("Stored token expiry is not a number, ignoring stored tokens");
            return Ok(None);
        };

        if access_token.is_empty() {
            return Ok(None);
        }

        Ok(Some(TokenRecord {
            access_token,
            refresh_token,
            expires_at,
        }))
    }

    /// Whether the stored token is within `skew_ms` of expiring.
    ///
    /// With nothing stored there is nothing to refresh, so this is `false`.
    pub fn is_expiring_soon(&self, now_ms: i64, skew_ms: i64) -> Result<bool, ClientError> {
        Ok(self
            .load()?
            .is_some_and(|record| record.is_expiring_soon(now_ms, skew_ms)))
    }

    pub fn clear(&self) -> Result<(), ClientError> {
        self.lock()
            .remove_many(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, TOKEN_EXPIRY_KEY])?;
        tracing::debug!("Tokens cleared");
        Ok(())
    }
}
