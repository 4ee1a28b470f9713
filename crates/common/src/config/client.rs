use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{read_optional, ConfigError, ConfigSnapshot};
use crate::mount_path::MountPath;

/// File inside a client directory describing which repository it mounts.
pub const CLIENT_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Default, Deserialize)]
struct ClientFile {
    repository: Option<RepositorySection>,
}

#[derive(Debug, Default, Deserialize)]
struct RepositorySection {
    name: Option<String>,
    #[serde(rename = "type")]
    repo_type: Option<String>,
    path: Option<String>,
}

/// Resolved configuration for a single mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub mount_path: MountPath,
    pub client_dir: PathBuf,
    pub repository_name: Option<String>,
    pub repo_type: String,
    /// Origin identifier handed to the backing store (a path for local stores).
    pub repo_source: String,
}

impl ClientConfig {
    /// Read `<client_dir>/config.toml`.
    ///
    /// The `[repository]` table either names an entry of the global snapshot
    /// or carries `type` and `path` inline. Inline fields override the named
    /// entry.
    pub fn load(
        mount_path: &MountPath,
        client_dir: &Path,
        snapshot: &ConfigSnapshot,
    ) -> Result<Self, ConfigError> {
        let path = client_dir.join(CLIENT_CONFIG_FILE);
        let file: ClientFile = match read_optional(&path)? {
            Some(contents) => toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?,
            None => ClientFile::default(),
        };
        let section = file.repository.unwrap_or_default();

        let named = match &section.name {
            Some(name) => Some(snapshot.repository(name).ok_or_else(|| {
                ConfigError::UnknownRepository {
                    name: name.clone(),
                    path: path.clone(),
                }
            })?),
            None => None,
        };

        let repo_type = section
            .repo_type
            .or_else(|| named.map(|repo| repo.repo_type.clone()));
        let repo_source = section
            .path
            .or_else(|| named.map(|repo| repo.path.clone()));

        match (repo_type, repo_source) {
            (Some(repo_type), Some(repo_source)) => Ok(Self {
                mount_path: mount_path.clone(),
                client_dir: client_dir.to_path_buf(),
                repository_name: section.name,
                repo_type,
                repo_source,
            }),
            // The null store has no origin.
            (Some(repo_type), None) if repo_type == "null" => Ok(Self {
                mount_path: mount_path.clone(),
                client_dir: client_dir.to_path_buf(),
                repository_name: section.name,
                repo_type,
                repo_source: String::new(),
            }),
            _ => Err(ConfigError::MissingRepository { path }),
        }
    }
}
