use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{read_optional, ConfigError};
use crate::mount_path::MountPath;

/// Mount point to client directory name, as stored in `<data_dir>/config.json`.
///
/// Client directory names are relative to `<data_dir>/clients`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientDirectoryMap {
    entries: BTreeMap<MountPath, String>,
}

impl ClientDirectoryMap {
    /// A missing file is an empty map.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let Some(contents) = read_optional(path)? else {
            return Ok(Self::default());
        };

        let raw: BTreeMap<String, String> =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?;

        let mut entries = BTreeMap::new();
        for (mount_point, client_name) in raw {
            let mount_path = MountPath::new(&mount_point).map_err(|source| {
                ConfigError::MountPath {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
            entries.insert(mount_path, client_name);
        }
        Ok(Self { entries })
    }

    /// Mount paths paired with their absolute client directories.
    pub fn client_dirs(&self, clients_dir: &Path) -> Vec<(MountPath, PathBuf)> {
        self.entries
            .iter()
            .map(|(mount_path, name)| (mount_path.clone(), clients_dir.join(name)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
