//! Active mounts keyed by mount path.

use std::collections::HashMap;
use std::sync::Arc;

use common::mount_path::MountPath;
use parking_lot::RwLock;

use super::mount::Mount;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("mount point \"{0}\" is already mounted")]
    AlreadyMounted(MountPath),
    #[error("mount point \"{0}\" is not known to this arbor instance")]
    NotMounted(MountPath),
}

/// Reads run concurrently; registration and removal are linearized by the
/// write lock.
#[derive(Debug, Default)]
pub struct MountRegistry {
    mounts: RwLock<HashMap<MountPath, Arc<Mount>>>,
}

impl MountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Never replaces an existing entry.
    pub fn register(&self, mount: Arc<Mount>) -> Result<(), RegistryError> {
        let mut mounts = self.mounts.write();
        let path = mount.path().clone();
        if mounts.contains_key(&path) {
            return Err(RegistryError::AlreadyMounted(path));
        }
        mounts.insert(path, mount);
        Ok(())
    }

    /// Remove the mount and fulfill its completion signal in the same
    /// critical section.
    pub fn unregister(&self, path: &MountPath) -> Result<Arc<Mount>, RegistryError> {
        let mut mounts = self.mounts.write();
        let mount = mounts
            .remove(path)
            .ok_or_else(|| RegistryError::NotMounted(path.clone()))?;
        mount.completion().fulfill();
        Ok(mount)
    }

    /// Point-in-time copy of the active mounts.
    pub fn list_active(&self) -> Vec<Arc<Mount>> {
        let mut mounts: Vec<_> = self.mounts.read().values().cloned().collect();
        mounts.sort_by(|a, b| a.path().cmp(b.path()));
        mounts
    }

    pub fn get(&self, path: &MountPath) -> Result<Arc<Mount>, RegistryError> {
        self.get_or_null(path)
            .ok_or_else(|| RegistryError::NotMounted(path.clone()))
    }

    pub fn get_or_null(&self, path: &MountPath) -> Option<Arc<Mount>> {
        self.mounts.read().get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.mounts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
