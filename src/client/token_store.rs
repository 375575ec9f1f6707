// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Token Store
//!
//! Persists the session as three independent string entries:
//!
//! | Key | Value |
//! |-----|-------|
//! | `authToken` | access token |
//! | `refreshToken` | refresh token (optional) |
//! | `userData` | JSON-serialized [`User`] |
//!
//! Writes are not atomic across entries. [`TokenStore::load`] only reports
//! a session when both the access token and a parseable user are present,
//! so a partially written session reads as no session.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::error::StorageError;
use crate::models::{TokenPair, User};

pub const AUTH_TOKEN_KEY: &str = "authToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const USER_DATA_KEY: &str = "userData";

/// Persisted string key/value storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    /// Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Process-local storage. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries().remove(key);
        Ok(())
    }
}

/// One file per key inside a directory.
///
/// Each write goes to a temporary file that is then renamed over the
/// target, so a single entry is never observed half-written.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir)?;

        let path = self.path_for(key);
        let temp_path = path.with_extension("tmp");
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// A session read back from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub token: String,
    pub refresh_token: Option<String>,
    pub user: User,
}

/// Typed access to the three session entries. Cheap to clone; clones share
/// the same backing storage.
#[derive(Clone)]
pub struct TokenStore {
    backend: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore").finish_non_exhaustive()
    }
}

impl TokenStore {
    pub fn new(backend: impl KeyValueStore + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    pub fn save(&self, pair: &TokenPair, user: &User) -> Result<(), StorageError> {
        self.backend.set(AUTH_TOKEN_KEY, &pair.access_token)?;
        match &pair.refresh_token {
            Some(refresh) => self.backend.set(REFRESH_TOKEN_KEY, refresh)?,
            None => self.backend.remove(REFRESH_TOKEN_KEY)?,
        }
        let user_json = serde_json::to_string(user)?;
        self.backend.set(USER_DATA_KEY, &user_json)
    }

    /// Read the persisted session, if it is complete.
    ///
    /// Storage failures and unparseable user data are logged and read as
    /// "no session".
    pub fn load(&self) -> Option<StoredSession> {
        let token = self.read(AUTH_TOKEN_KEY).filter(|t| !t.is_empty())?;
        let user_json = self.read(USER_DATA_KEY)?;
        let user = match serde_json::from_str::<User>(&user_json) {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unparseable stored user data");
                return None;
            }
        };
        Some(StoredSession {
            token,
            refresh_token: self.read(REFRESH_TOKEN_KEY).filter(|t| !t.is_empty()),
            user,
        })
    }

    /// Remove all three entries. Every removal is attempted; the first
    /// failure is returned.
    pub fn clear(&self) -> Result<(), StorageError> {
        let mut first_error = None;
        for key in [AUTH_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_DATA_KEY] {
            if let Err(e) = self.backend.remove(key) {
                tracing::warn!(key, error = %e, "Failed to remove stored session entry");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.read(AUTH_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read(REFRESH_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    /// Replace only the access token, leaving the user entry untouched.
    pub fn set_access_token(&self, token: &str) -> Result<(), StorageError> {
        self.backend.set(AUTH_TOKEN_KEY, token)
    }

    pub fn set_refresh_token(&self, token: &str) -> Result<(), StorageError> {
        self.backend.set(REFRESH_TOKEN_KEY, token)
    }

    /// Raw entry access, mainly for inspection.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.read(key)
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.backend.get(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to read stored session entry");
                None
            }
        }
    }
}
