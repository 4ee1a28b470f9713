//! Persistent daemon settings: the data directory and `daemon.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ServiceConfig;

pub const APP_NAME: &str = "arbor";
pub const CONFIG_FILE_NAME: &str = "daemon.toml";

/// Contents of `<data_dir>/daemon.toml`. Every field is optional; unset
/// fields keep the built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Listen address argument: a socket path, a port or `host:port`.
    pub listen_address: Option<String>,
    pub etc_dir: Option<PathBuf>,
    pub user_config: Option<PathBuf>,
    pub num_worker_threads: Option<usize>,
    pub unload_interval_secs: Option<u64>,
    pub unload_start_delay_secs: Option<u64>,
    pub unload_age_secs: Option<u64>,
    /// One of trace, debug, info, warn, error.
    pub log_level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub data_dir: PathBuf,
    pub config_path: PathBuf,
    pub config: AppConfig,
}

impl AppState {
    /// `custom` if given, otherwise `~/.arbor`.
    pub fn data_dir(custom: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom {
            return Ok(path);
        }
        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Resolve the data directory and read its `daemon.toml`, if present.
    pub fn load(custom: Option<PathBuf>) -> Result<Self, StateError> {
        let data_dir = Self::data_dir(custom)?;
        let config_path = data_dir.join(CONFIG_FILE_NAME);
        let config = match std::fs::read_to_string(&config_path) {
            Ok(contents) => toml::from_str(&contents).map_err(|source| StateError::Parse {
                path: config_path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
            Err(source) => {
                return Err(StateError::Io {
                    path: config_path,
                    source,
                })
            }
        };
        Ok(Self {
            data_dir,
            config_path,
            config,
        })
    }

    /// Create the data directory layout the daemon expects.
    pub fn ensure_layout(&self) -> Result<(), StateError> {
        let config = ServiceConfig::new(&self.data_dir);
        for dir in [
            self.data_dir.clone(),
            config.clients_dir(),
            config.storage_path(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|source| StateError::Io { path: dir, source })?;
        }
        Ok(())
    }

    /// Defaults overlaid with `daemon.toml`.
    pub fn service_config(&self) -> Result<ServiceConfig, StateError> {
        let mut service = ServiceConfig::new(&self.data_dir);
        let config = &self.config;

        service.listen_address = config.listen_address.clone();
        if let Some(dir) = &config.etc_dir {
            service.etc_dir = dir.clone();
        }
        if let Some(path) = &config.user_config {
            service.user_config_path = path.clone();
        }
        if let Some(threads) = config.num_worker_threads {
            service.num_worker_threads = threads;
        }
        if let Some(secs) = config.unload_interval_secs {
            service.unload_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = config.unload_start_delay_secs {
            service.unload_start_delay = Duration::from_secs(secs);
        }
        if let Some(secs) = config.unload_age_secs {
            service.unload_age = Duration::from_secs(secs);
        }
        if let Some(level) = &config.log_level {
            service.log_level = level
                .parse()
                .map_err(|_| StateError::InvalidLogLevel(level.clone()))?;
        }
        Ok(service)
    }

    pub fn config_file(&self) -> &Path {
        &self.config_path
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("could not determine home directory")]
    NoHomeDirectory,
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let state = AppState::load(Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(state.config, AppConfig::default());

        let service = state.service_config().unwrap();
        assert_eq!(service.data_dir, dir.path());
        assert_eq!(service.num_worker_threads, crate::service_config::DEFAULT_WORKER_THREADS);
        assert!(service.unload_interval.is_zero());
    }

    #[test]
    fn test_config_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "listen_address = \"7777\"\nnum_worker_threads = 3\nunload_interval_secs = 30\nlog_level = \"debug\"\n",
        )
        .unwrap();

        let service = AppState::load(Some(dir.path().to_path_buf()))
            .unwrap()
            .service_config()
            .unwrap();
        assert_eq!(service.listen_address.as_deref(), Some("7777"));
        assert_eq!(service.num_worker_threads, 3);
        assert_eq!(service.unload_interval, Duration::from_secs(30));
        assert_eq!(service.log_level, tracing::Level::DEBUG);
    }

    #[test]
    fn test_bad_config_is_reported() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "no_such_key = 1\n").unwrap();
        assert!(matches!(
            AppState::load(Some(dir.path().to_path_buf())),
            Err(StateError::Parse { .. })
        ));

        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "log_level = \"loud\"\n").unwrap();
        let state = AppState::load(Some(dir.path().to_path_buf())).unwrap();
        assert!(matches!(
            state.service_config(),
            Err(StateError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn test_ensure_layout_creates_directories() {
        let dir = TempDir::new().unwrap();
        let state = AppState::load(Some(dir.path().join("data"))).unwrap();
        state.ensure_layout().unwrap();
        assert!(dir.path().join("data/clients").is_dir());
        assert!(dir.path().join("data/storage").is_dir());
    }
}
