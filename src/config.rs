//! Process-wide configuration. The only setting is the worker-thread count,
//! consumed once when the global pool is built.
//!
//! Sources, later overriding earlier: built-in defaults, the YAML or JSON file
//! named by `PARLOOP_CONFIG`, then `PARLOOP_WORKER_THREADS`.

use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::{OnceLock, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const CONFIG_PATH_ENV: &str = "PARLOOP_CONFIG";
pub const WORKER_THREADS_ENV: &str = "PARLOOP_WORKER_THREADS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Desired worker threads. Values of zero or below mean a single worker.
    pub num_worker_threads: i64,
}

impl Default for Config {
    fn default() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            num_worker_threads: i64::try_from(cores).unwrap_or(1),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Read(std::io::Error),
    ParseYaml(serde_yaml::Error),
    ParseJson(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read(err) => write!(f, "failed to read config file: {err}"),
            Self::ParseYaml(err) => write!(f, "failed to parse config YAML: {err}"),
            Self::ParseJson(err) => write!(f, "failed to parse config JSON: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Read(err) => Some(err),
            Self::ParseYaml(err) => Some(err),
            Self::ParseJson(err) => Some(err),
        }
    }
}

impl Config {
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(raw).map_err(ConfigError::ParseYaml)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(ConfigError::ParseJson)
    }

    /// Load from a file; `.yaml`/`.yml` is parsed as YAML, anything else as JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(ConfigError::Read)?;
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
        if is_yaml {
            Self::from_yaml_str(&raw)
        } else {
            Self::from_json_str(&raw)
        }
    }

    /// Defaults, then `PARLOOP_CONFIG`, then `PARLOOP_WORKER_THREADS`.
    /// Unusable sources are logged and skipped.
    pub fn from_env() -> Self {
        let mut config = match env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load(&path).unwrap_or_else(|err| {
                warn!(path = %path, error = %err, "ignoring config file");
                Self::default()
            }),
            Err(_) => Self::default(),
        };
        if let Ok(raw) = env::var(WORKER_THREADS_ENV) {
            config.apply_worker_threads_override(&raw);
        }
        config
    }

    fn apply_worker_threads_override(&mut self, raw: &str) {
        match raw.trim().parse::<i64>() {
            Ok(n) => self.num_worker_threads = n,
            Err(err) => warn!(
                value = raw,
                error = %err,
                "ignoring unparseable {WORKER_THREADS_ENV}"
            ),
        }
    }
}

fn global_cell() -> &'static RwLock<Config> {
    static GLOBAL: OnceLock<RwLock<Config>> = OnceLock::new();
    GLOBAL.get_or_init(|| RwLock::new(Config::from_env()))
}

/// Snapshot of the process-wide configuration.
pub fn global() -> Config {
    global_cell()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Replace the process-wide configuration. A global pool that already exists
/// keeps the worker count it was built with.
pub fn set_global(config: Config) {
    *global_cell()
        .write()
        .unwrap_or_else(PoisonError::into_inner) = config;
}
