use std::path::PathBuf;
use std::sync::Arc;

use common::config::{load_global_config, ConfigError, ConfigSnapshot};
use parking_lot::RwLock;

/// Current global configuration.
///
/// Readers clone the `Arc` and keep a consistent snapshot for as long as
/// they need it; a reload never mutates a published snapshot.
#[derive(Debug)]
pub struct ConfigHolder {
    etc_dir: PathBuf,
    user_config: PathBuf,
    current: RwLock<Arc<ConfigSnapshot>>,
}

impl ConfigHolder {
    pub fn new(etc_dir: PathBuf, user_config: PathBuf) -> Self {
        Self {
            etc_dir,
            user_config,
            current: RwLock::new(Arc::new(ConfigSnapshot::default())),
        }
    }

    pub fn current(&self) -> Arc<ConfigSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Re-read the config files and publish the result. On error the
    /// previous snapshot stays current.
    pub async fn reload(&self) -> Result<Arc<ConfigSnapshot>, ConfigError> {
        let etc_dir = self.etc_dir.clone();
        let user_config = self.user_config.clone();
        let loaded = tokio::task::spawn_blocking(move || load_global_config(&etc_dir, &user_config))
            .await
            .map_err(|e| ConfigError::Io {
                path: self.user_config.clone(),
                source: std::io::Error::other(e),
            })??;
        Ok(self.replace(loaded))
    }

    /// Publish `snapshot`, stamping it with the next generation.
    pub fn replace(&self, snapshot: ConfigSnapshot) -> Arc<ConfigSnapshot> {
        let mut current = self.current.write();
        let next = Arc::new(snapshot.with_generation(current.generation + 1));
        *current = Arc::clone(&next);
        tracing::debug!(
            generation = next.generation,
            repositories = next.repositories.len(),
            "config reloaded"
        );
        next
    }
}
