use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{read_optional, ConfigError};

/// Directory under the system config dir holding drop-in `*.toml` files.
pub const CONFIG_D_DIR: &str = "config.d";

/// A named repository a client directory may refer to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    #[serde(rename = "type")]
    pub repo_type: String,
    pub path: String,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    repository: BTreeMap<String, RepositoryConfig>,
}

/// Immutable global configuration.
///
/// Snapshots are never mutated after construction; a reload builds a new
/// one and swaps it in wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSnapshot {
    /// Incremented by the holder on every reload.
    pub generation: u64,
    pub repositories: BTreeMap<String, RepositoryConfig>,
    /// Files that contributed to this snapshot, in load order.
    pub sources: Vec<PathBuf>,
}

impl ConfigSnapshot {
    pub fn repository(&self, name: &str) -> Option<&RepositoryConfig> {
        self.repositories.get(name)
    }

    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    fn merge_file(&mut self, path: &Path, contents: &str) -> Result<(), ConfigError> {
        let file: ConfigFile = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        self.repositories.extend(file.repository);
        self.sources.push(path.to_path_buf());
        Ok(())
    }
}

/// Load `<etc_dir>/config.d/*.toml` in file name order, then the user
/// config. Later files override repository entries of earlier ones and
/// missing files are skipped.
pub fn load_global_config(
    etc_dir: &Path,
    user_config: &Path,
) -> Result<ConfigSnapshot, ConfigError> {
    let mut snapshot = ConfigSnapshot::default();

    let drop_in_dir = etc_dir.join(CONFIG_D_DIR);
    let mut drop_ins = match std::fs::read_dir(&drop_in_dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
            .collect::<Vec<_>>(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(source) => {
            return Err(ConfigError::Io {
                path: drop_in_dir,
                source,
            })
        }
    };
    drop_ins.sort();

    for path in drop_ins.iter().map(PathBuf::as_path).chain([user_config]) {
        if let Some(contents) = read_optional(path)? {
            snapshot.merge_file(path, &contents)?;
        }
    }

    tracing::debug!(
        sources = snapshot.sources.len(),
        repositories = snapshot.repositories.len(),
        "loaded global config"
    );
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, contents: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_missing_files_yield_empty_snapshot() {
        let dir = TempDir::new().unwrap();
        let snapshot =
            load_global_config(&dir.path().join("etc"), &dir.path().join("userrc")).unwrap();
        assert!(snapshot.repositories.is_empty());
        assert!(snapshot.sources.is_empty());
    }

    #[test]
    fn test_user_config_overrides_drop_ins() {
        let dir = TempDir::new().unwrap();
        let etc = dir.path().join("etc");
        write(
            &etc.join(CONFIG_D_DIR).join("10-base.toml"),
            "[repository.main]\ntype = \"git\"\npath = \"/srv/main\"\n\n[repository.other]\ntype = \"null\"\npath = \"\"\n",
        );
        write(
            &etc.join(CONFIG_D_DIR).join("20-site.toml"),
            "[repository.main]\ntype = \"hg\"\npath = \"/srv/site\"\n",
        );
        write(&etc.join(CONFIG_D_DIR).join("ignored.txt"), "not toml");
        let user = dir.path().join("userrc");
        write(
            &user,
            "[repository.main]\ntype = \"hg\"\npath = \"/home/me/main\"\n",
        );

        let snapshot = load_global_config(&etc, &user).unwrap();
        assert_eq!(snapshot.sources.len(), 3);
        assert_eq!(
            snapshot.repository("main"),
            Some(&RepositoryConfig {
                repo_type: "hg".to_string(),
                path: "/home/me/main".to_string(),
            })
        );
        assert_eq!(snapshot.repository("other").unwrap().repo_type, "null");
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let user = dir.path().join("userrc");
        write(&user, "[repository.main\ntype = ");
        let err = load_global_config(&dir.path().join("etc"), &user).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
