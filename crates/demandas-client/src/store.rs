//! Local key-value persistence used as the offline fallback.
//!
//! Read-modify-write without locking across processes; the last writer wins.

use std::collections::HashMap;
use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const STORE_SCHEMA_VERSION: u32 = 1;

pub mod keys {
    pub const USUARIO: &str = "demandas.usuario";
    pub const CACHE: &str = "demandas.cache";
    pub const PUSH_SUBSCRIPTION: &str = "demandas.push_subscription";
    pub const ESTATISTICAS: &str = "demandas.estatisticas";
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store io failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("stored value under `{key}` has an unexpected shape: {message}")]
    Shape { key: String, message: String },
    #[error("value for `{key}` could not be encoded: {message}")]
    Encode { key: String, message: String },
}

pub trait KeyValueStore: Send + Sync + Debug {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

pub fn load_json<T>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>, StoreError>
where
    T: DeserializeOwned,
{
    let Some(value) = store.get(key)? else {
        return Ok(None);
    };
    serde_json::from_value(value)
        .map(Some)
        .map_err(|error| StoreError::Shape {
            key: key.to_string(),
            message: error.to_string(),
        })
}

pub fn save_json<T>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<(), StoreError>
where
    T: Serialize + ?Sized,
{
    let value = serde_json::to_value(value).map_err(|error| StoreError::Encode {
        key: key.to_string(),
        message: error.to_string(),
    })?;
    store.set(key, value)
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries().remove(key);
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    #[serde(default)]
    entries: Map<String, Value>,
}

/// All keys in one JSON document on disk.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<StoreDocument, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StoreDocument {
                    version: STORE_SCHEMA_VERSION,
                    entries: Map::new(),
                });
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        match serde_json::from_str::<StoreDocument>(&raw) {
            Ok(document) if document.version == STORE_SCHEMA_VERSION => Ok(document),
            Ok(document) => {
                tracing::warn!(
                    path = %self.path.display(),
                    version = document.version,
                    "local store has an unknown version; starting empty"
                );
                Ok(StoreDocument {
                    version: STORE_SCHEMA_VERSION,
                    entries: Map::new(),
                })
            }
            Err(error) => {
                tracing::warn!(
                    path = %self.path.display(),
                    reason = %error,
                    "local store is corrupt; starting empty"
                );
                Ok(StoreDocument {
                    version: STORE_SCHEMA_VERSION,
                    entries: Map::new(),
                })
            }
        }
    }

    fn write_document(&self, document: &StoreDocument) -> Result<(), StoreError> {
        let io_error = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let encoded =
            serde_json::to_vec_pretty(document).map_err(|error| StoreError::Encode {
                key: self.path.display().to_string(),
                message: error.to_string(),
            })?;

        let mut temp = self.path.clone().into_os_string();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);
        fs::write(&temp, encoded).map_err(io_error)?;
        fs::rename(&temp, &self.path).map_err(io_error)
    }

    fn update(&self, apply: impl FnOnce(&mut Map<String, Value>)) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut document = self.read_document()?;
        apply(&mut document.entries);
        self.write_document(&document)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.read_document()?.entries.remove(key))
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.update(|entries| {
            entries.insert(key.to_string(), value);
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}
