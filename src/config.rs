//! Application-level configuration loading.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the daemon looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "CAMBLASTER_CONFIG_PATH";

const DEFAULT_LOGIN_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_LEADERBOARD_SIZE: usize = 10;
const DEFAULT_SSE_CAPACITY: usize = 64;
const DEFAULT_CACHE_PATH: &str = "data/camblaster-cache.json";
/// Roughly what a browser grants a single origin.
const DEFAULT_CACHE_QUOTA_BYTES: u64 = 5 * 1024 * 1024;

/// Remote profile store the daemon connects to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local store; nothing survives a restart.
    Memory,
    /// MongoDB, configured through `MONGO_URI`.
    #[default]
    Mongo,
    /// CouchDB, configured through `COUCH_BASE_URL`.
    Couch,
}

impl StoreBackend {
    /// Name used in logs and the health response.
    pub fn as_str(self) -> &'static str {
        match self {
            StoreBackend::Memory => "memory",
            StoreBackend::Mongo => "mongo",
            StoreBackend::Couch => "couch",
        }
    }
}

/// Which remote store to connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Backend selected by `store.backend`.
    pub backend: StoreBackend,
}

/// Where the local cache lives and how large it may grow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// JSON file standing in for the browser's local storage.
    pub path: PathBuf,
    /// Maximum size of the file; `None` disables the check.
    pub quota_bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// How long sign-in waits for the remote store before falling back.
    pub login_timeout: Duration,
    /// Size of the leaderboard window shown on game over.
    pub leaderboard_size: usize,
    /// Capacity of the SSE broadcast channel.
    pub sse_capacity: usize,
    /// Local cache location and quota.
    pub cache: CacheConfig,
    /// Remote profile store selection.
    pub store: StoreConfig,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        backend = app_config.store.backend.as_str(),
                        "loaded config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Default, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    login_timeout_ms: Option<u64>,
    #[serde(default)]
    leaderboard_size: Option<usize>,
    #[serde(default)]
    sse_capacity: Option<usize>,
    #[serde(default)]
    cache: RawCache,
    #[serde(default)]
    store: RawStore,
}

#[derive(Debug, Default, Deserialize)]
struct RawCache {
    #[serde(default)]
    path: Option<PathBuf>,
    /// `0` turns the quota off.
    #[serde(default)]
    quota_bytes: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawStore {
    #[serde(default)]
    backend: StoreBackend,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let quota_bytes = match value.cache.quota_bytes {
            Some(0) => None,
            Some(quota) => Some(quota),
            None => Some(DEFAULT_CACHE_QUOTA_BYTES),
        };

        Self {
            login_timeout: Duration::from_millis(
                value.login_timeout_ms.unwrap_or(DEFAULT_LOGIN_TIMEOUT_MS),
            ),
            leaderboard_size: value
                .leaderboard_size
                .filter(|size| *size > 0)
                .unwrap_or(DEFAULT_LEADERBOARD_SIZE),
            sse_capacity: value
                .sse_capacity
                .filter(|capacity| *capacity > 0)
                .unwrap_or(DEFAULT_SSE_CAPACITY),
            cache: CacheConfig {
                path: value
                    .cache
                    .path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_PATH)),
                quota_bytes,
            },
            store: StoreConfig {
                backend: value.store.backend,
            },
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config: AppConfig = serde_json::from_str::<RawConfig>("{}").unwrap().into();

        assert_eq!(config, AppConfig::default());
        assert_eq!(config.login_timeout, Duration::from_secs(3));
        assert_eq!(config.leaderboard_size, 10);
        assert_eq!(config.store.backend, StoreBackend::Mongo);
        assert_eq!(config.cache.quota_bytes, Some(DEFAULT_CACHE_QUOTA_BYTES));
    }

    #[test]
    fn file_values_override_defaults() {
        let raw = r#"{
            "login_timeout_ms": 1500,
            "leaderboard_size": 25,
            "cache": { "path": "/tmp/cb.json", "quota_bytes": 0 },
            "store": { "backend": "couch" }
        }"#;
        let config: AppConfig = serde_json::from_str::<RawConfig>(raw).unwrap().into();

        assert_eq!(config.login_timeout, Duration::from_millis(1500));
        assert_eq!(config.leaderboard_size, 25);
        assert_eq!(config.cache.path, PathBuf::from("/tmp/cb.json"));
        assert_eq!(config.cache.quota_bytes, None);
        assert_eq!(config.store.backend, StoreBackend::Couch);
    }

    #[test]
    fn zero_sizes_fall_back() {
        let raw = r#"{ "leaderboard_size": 0, "sse_capacity": 0 }"#;
        let config: AppConfig = serde_json::from_str::<RawConfig>(raw).unwrap().into();

        assert_eq!(config.leaderboard_size, DEFAULT_LEADERBOARD_SIZE);
        assert_eq!(config.sse_capacity, DEFAULT_SSE_CAPACITY);
    }

    #[test]
    fn unknown_backend_is_a_parse_error() {
        assert!(serde_json::from_str::<RawConfig>(r#"{ "store": { "backend": "redis" } }"#).is_err());
    }
}
