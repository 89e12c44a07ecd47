//! Persisted session state. The backing store is a flat key/value map (the
//! same shape a browser's local storage has); `SessionStore` owns the key
//! names and guarantees the access token, refresh token and user are written
//! and cleared as one batch.

use crate::{
    error::{Error, Result},
    session::types::{TokenPair, User},
};
use serde_json::{Map, Value};
use std::{
    collections::HashMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::{debug, warn};

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const USER_KEY: &str = "user";

const SESSION_KEYS: [&str; 3] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY];

/// Key/value persistence with batch writes. Implementations must apply a
/// batch completely or not at all.
pub trait KeyValueStore: Send + Sync {
    /// # Errors
    /// Returns an error if the backing storage cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// # Errors
    /// Returns an error if the batch cannot be persisted; no entry is written in that case.
    fn set_all(&self, entries: &[(&str, String)]) -> Result<()>;

    /// # Errors
    /// Returns an error if the keys cannot be removed; no key is removed in that case.
    fn remove_all(&self, keys: &[&str]) -> Result<()>;
}

/// In-process store, used by tests and short-lived embeddings.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| Error::Storage("memory store lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set_all(&self, entries: &[(&str, String)]) -> Result<()> {
        let mut map = self.lock()?;
        for (key, value) in entries {
            map.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }

    fn remove_all(&self, keys: &[&str]) -> Result<()> {
        let mut map = self.lock()?;
        for key in keys {
            map.remove(*key);
        }
        Ok(())
    }
}

/// JSON object on disk. Each batch rewrites the whole file through a sibling
/// temp file and a rename, so readers never observe half a batch.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<Map<String, Value>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => {
                return Err(Error::Storage(format!(
                    "Failed to read {}: {err}",
                    self.path.display()
                )))
            }
        };

        if raw.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(Error::Storage(format!(
                "{} does not contain a JSON object",
                self.path.display()
            ))),
            Err(err) => Err(Error::Storage(format!(
                "Failed to parse {}: {err}",
                self.path.display()
            ))),
        }
    }

    fn write_map(&self, map: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| {
                    Error::Storage(format!("Failed to create {}: {err}", parent.display()))
                })?;
            }
        }

        let payload = serde_json::to_string_pretty(map)
            .map_err(|err| Error::Storage(format!("Failed to encode session: {err}")))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, payload)
            .map_err(|err| Error::Storage(format!("Failed to write {}: {err}", tmp.display())))?;
        fs::rename(&tmp, &self.path).map_err(|err| {
            Error::Storage(format!(
                "Failed to replace {}: {err}",
                self.path.display()
            ))
        })?;

        debug!(path = %self.path.display(), "session file written");

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.guard
            .lock()
            .map_err(|_| Error::Storage("file store lock poisoned".to_string()))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock()?;
        let map = self.read_map()?;
        Ok(map.get(key).and_then(Value::as_str).map(ToString::to_string))
    }

    fn set_all(&self, entries: &[(&str, String)]) -> Result<()> {
        let _guard = self.lock()?;
        let mut map = self.read_map()?;
        for (key, value) in entries {
            map.insert((*key).to_string(), Value::String(value.clone()));
        }
        self.write_map(&map)
    }

    fn remove_all(&self, keys: &[&str]) -> Result<()> {
        let _guard = self.lock()?;
        let mut map = match self.read_map() {
            Ok(map) => map,
            // An unreadable file cannot hold a usable session; start over.
            Err(err) => {
                warn!("discarding unreadable session file: {}", err);
                Map::new()
            }
        };
        for key in keys {
            map.remove(*key);
        }
        self.write_map(&map)
    }
}

/// Typed view over a `KeyValueStore` that knows the session keys.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self { inner }
    }

    /// # Errors
    /// Returns an error if the store cannot be read.
    pub fn access_token(&self) -> Result<Option<String>> {
        self.inner.get(ACCESS_TOKEN_KEY)
    }

    /// # Errors
    /// Returns an error if the store cannot be read.
    pub fn refresh_token(&self) -> Result<Option<String>> {
        self.inner.get(REFRESH_TOKEN_KEY)
    }

    /// # Errors
    /// Returns an error if the store cannot be read or the cached user is corrupt.
    pub fn user(&self) -> Result<Option<User>> {
        self.inner
            .get(USER_KEY)?
            .map(|raw| {
                serde_json::from_str::<User>(&raw)
                    .map_err(|err| Error::Storage(format!("Stored user is invalid: {err}")))
            })
            .transpose()
    }

    /// Writes tokens and user as a single batch.
    ///
    /// # Errors
    /// Returns an error if the user cannot be encoded or the batch cannot be written.
    pub fn persist(&self, tokens: &TokenPair, user: &User) -> Result<()> {
        let user = serde_json::to_string(user)
            .map_err(|err| Error::Serialization(format!("Failed to encode user: {err}")))?;

        self.inner.set_all(&[
            (ACCESS_TOKEN_KEY, tokens.access.token.clone()),
            (REFRESH_TOKEN_KEY, tokens.refresh.token.clone()),
            (USER_KEY, user),
        ])
    }

    /// Replaces both tokens after a refresh; the cached user is kept.
    ///
    /// # Errors
    /// Returns an error if the batch cannot be written.
    pub fn persist_tokens(&self, tokens: &TokenPair) -> Result<()> {
        self.inner.set_all(&[
            (ACCESS_TOKEN_KEY, tokens.access.token.clone()),
            (REFRESH_TOKEN_KEY, tokens.refresh.token.clone()),
        ])
    }

    /// # Errors
    /// Returns an error if the user cannot be encoded or written.
    pub fn persist_user(&self, user: &User) -> Result<()> {
        let user = serde_json::to_string(user)
            .map_err(|err| Error::Serialization(format!("Failed to encode user: {err}")))?;
        self.inner.set_all(&[(USER_KEY, user)])
    }

    /// # Errors
    /// Returns an error if the keys cannot be removed.
    pub fn clear(&self) -> Result<()> {
        self.inner.remove_all(&SESSION_KEYS)
    }

    /// True when any of the session keys is present.
    #[must_use]
    pub fn has_any(&self) -> bool {
        SESSION_KEYS
            .iter()
            .any(|key| matches!(self.inner.get(key), Ok(Some(_))))
    }
}
