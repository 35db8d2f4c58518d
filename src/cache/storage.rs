//! Durable on-device key/value storage behind the local cache.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
    sync::Mutex,
};

use dashmap::DashMap;
use thiserror::Error;

/// Result alias for key/value storage operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Failures raised by a [`KeyValueStorage`]. The cache logs and swallows them.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Storage has been turned off (private mode, sandbox without a data dir).
    #[error("local storage is disabled")]
    Disabled,
    /// Writing would grow the backing file past its quota.
    #[error("local storage quota of {quota} bytes exceeded ({required} bytes required)")]
    QuotaExceeded { quota: u64, required: u64 },
    /// Reading or rewriting the backing file failed.
    #[error("local storage I/O failed on `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A stored value could not be decoded.
    #[error("corrupt value stored under `{key}`")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    /// A writer panicked while holding the entries lock.
    #[error("local storage lock poisoned")]
    Poisoned,
}

/// String key/value storage with the semantics of a browser's `localStorage`.
pub trait KeyValueStorage: Send + Sync {
    /// Value stored under `key`, `None` when absent.
    fn get_item(&self, key: &str) -> CacheResult<Option<String>>;
    /// Store `value` under `key`, replacing any previous value.
    fn set_item(&self, key: &str, value: &str) -> CacheResult<()>;
}

/// All keys in one JSON object file, rewritten atomically on every change.
pub struct FileStorage {
    path: PathBuf,
    quota: Option<u64>,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open (or lazily create) the storage file at `path`.
    ///
    /// A missing file starts empty. An unreadable or corrupt file is reported to
    /// the caller, which may choose to continue with [`FileStorage::empty`].
    pub fn open(path: impl Into<PathBuf>, quota: Option<u64>) -> CacheResult<Self> {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| CacheError::Corrupt {
                key: path.display().to_string(),
                source,
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(CacheError::Io { path, source }),
        };

        Ok(Self {
            path,
            quota,
            entries: Mutex::new(entries),
        })
    }

    /// Start from an empty map; the file is overwritten on the first write.
    pub fn empty(path: impl Into<PathBuf>, quota: Option<u64>) -> Self {
        Self {
            path: path.into(),
            quota,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> CacheResult<()> {
        let bytes = serde_json::to_vec_pretty(entries).map_err(|source| CacheError::Corrupt {
            key: self.path.display().to_string(),
            source,
        })?;

        if let Some(quota) = self.quota {
            let required = bytes.len() as u64;
            if required > quota {
                return Err(CacheError::QuotaExceeded { quota, required });
            }
        }

        atomic_write(&self.path, &bytes).map_err(|source| CacheError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Apply `change` and persist; the in-memory map is rolled back if the write fails.
    fn mutate(&self, change: impl FnOnce(&mut BTreeMap<String, String>)) -> CacheResult<()> {
        let mut guard = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        let mut next = guard.clone();
        change(&mut next);
        if next == *guard {
            return Ok(());
        }

        self.persist(&next)?;
        *guard = next;
        Ok(())
    }
}

impl KeyValueStorage for FileStorage {
    fn get_item(&self, key: &str) -> CacheResult<Option<String>> {
        let guard = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        Ok(guard.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> CacheResult<()> {
        self.mutate(|entries| {
            entries.insert(key.to_owned(), value.to_owned());
        })
    }
}

fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    if fs::rename(&tmp, path).is_err() {
        // rename over an existing file can fail on Windows
        fs::copy(&tmp, path)?;
        let _ = fs::remove_file(&tmp);
    }
    Ok(())
}

/// Volatile storage, used when no data directory is configured and in tests.
#[derive(Default)]
pub struct MemoryStorage {
    entries: DashMap<String, String>,
}

impl MemoryStorage {
    /// Empty storage.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.entries.get(key).map(|value| value.clone()))
    }

    fn set_item(&self, key: &str, value: &str) -> CacheResult<()> {
        self.entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

/// Storage that refuses every operation.
pub struct DisabledStorage;

impl KeyValueStorage for DisabledStorage {
    fn get_item(&self, _key: &str) -> CacheResult<Option<String>> {
        Err(CacheError::Disabled)
    }

    fn set_item(&self, _key: &str, _value: &str) -> CacheResult<()> {
        Err(CacheError::Disabled)
    }
}
