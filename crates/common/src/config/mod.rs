//! Configuration consumed by mounts.
//!
//! - [`ConfigSnapshot`]: immutable view of the global repository table, built
//!   from the system config directory and the user's config file.
//! - [`ClientConfig`]: per-mount configuration read from a client directory.
//! - [`ClientDirectoryMap`]: the mount point to client directory table used
//!   to remount everything at startup.

mod client;
mod directory_map;
mod global;

use std::path::PathBuf;

pub use client::{ClientConfig, CLIENT_CONFIG_FILE};
pub use directory_map::ClientDirectoryMap;
pub use global::{load_global_config, ConfigSnapshot, RepositoryConfig, CONFIG_D_DIR};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
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
    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path} has no [repository] section with either a name or a type and path")]
    MissingRepository { path: PathBuf },
    #[error("{path} refers to unknown repository \"{name}\"")]
    UnknownRepository { name: String, path: PathBuf },
    #[error("invalid mount point in {path}: {source}")]
    MountPath {
        path: PathBuf,
        #[source]
        source: crate::mount_path::MountPathError,
    },
}

fn read_optional(path: &std::path::Path) -> Result<Option<String>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
