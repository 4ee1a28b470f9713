//! Per-mount view over a shared backing store and the local store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::backing::{BackingStore, BackingStoreKey};
use crate::error::{Result, StoreError};
use crate::local_store::LocalStore;
use crate::types::{ObjectId, Tree};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStoreStats {
    pub local_hits: u64,
    pub backing_fetches: u64,
}

/// Reads go to the local store first, then to the backing store, which
/// records what it imports in the local store.
#[derive(Debug)]
pub struct ObjectStore {
    /// `None` once shut down.
    backing: RwLock<Option<Arc<dyn BackingStore>>>,
    key: BackingStoreKey,
    local: Arc<LocalStore>,
    namespace: String,
    local_hits: AtomicU64,
    backing_fetches: AtomicU64,
}

impl ObjectStore {
    pub fn new(backing: Arc<dyn BackingStore>, local: Arc<LocalStore>) -> Self {
        let key = backing.key().clone();
        Self {
            namespace: key.namespace(),
            key,
            backing: RwLock::new(Some(backing)),
            local,
            local_hits: AtomicU64::new(0),
            backing_fetches: AtomicU64::new(0),
        }
    }

    pub fn key(&self) -> &BackingStoreKey {
        &self.key
    }

    /// The shared backing store, until shutdown releases it.
    pub fn backing_store(&self) -> Option<Arc<dyn BackingStore>> {
        self.backing.read().clone()
    }

    fn open_backing(&self) -> Result<Arc<dyn BackingStore>> {
        self.backing_store().ok_or(StoreError::Closed)
    }

    pub async fn root_id(&self) -> Result<ObjectId> {
        self.open_backing()?.root().await
    }

    pub async fn get_tree(&self, id: &ObjectId) -> Result<Arc<Tree>> {
        let backing = self.open_backing()?;
        if let Some(tree) = self.local.get_tree(&self.namespace, id).await? {
            self.local_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(tree);
        }
        self.backing_fetches.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(backing.get_tree(id).await?))
    }

    pub async fn get_blob(&self, id: &ObjectId) -> Result<Bytes> {
        let backing = self.open_backing()?;
        if let Some(data) = self.local.get_blob(&self.namespace, id).await? {
            self.local_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(data);
        }
        self.backing_fetches.fetch_add(1, Ordering::Relaxed);
        backing.get_blob(id).await
    }

    pub fn stats(&self) -> ObjectStoreStats {
        ObjectStoreStats {
            local_hits: self.local_hits.load(Ordering::Relaxed),
            backing_fetches: self.backing_fetches.load(Ordering::Relaxed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.backing.read().is_none()
    }

    /// Refuse further reads and drop this mount's reference to the backing
    /// store. Reads already in flight keep their own reference until they
    /// finish.
    pub async fn shutdown(&self) {
        if self.backing.write().take().is_some() {
            tracing::debug!(store = %self.key, "object store shut down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::{BackingStoreKey, StoreKind, WorkingCopyStore};
    use crate::local_store::LocalStoreConfig;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_second_read_hits_local_store() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("repo");
        std::fs::create_dir_all(repo.join(".hg")).unwrap();
        std::fs::write(repo.join("a.txt"), b"a").unwrap();

        let local = Arc::new(LocalStore::open(LocalStoreConfig::new(dir.path().join("store"))).unwrap());
        let backing = WorkingCopyStore::open(
            StoreKind::Hg,
            BackingStoreKey::new("hg", repo.to_string_lossy()),
            Arc::clone(&local),
        )
        .await
        .unwrap();
        let store = ObjectStore::new(Arc::new(backing), local);

        let root = store.root_id().await.unwrap();
        let first = store.get_tree(&root).await.unwrap();
        let second = store.get_tree(&root).await.unwrap();
        assert_eq!(first, second);

        let id = first.get("a.txt").unwrap().id.clone();
        assert_eq!(store.get_blob(&id).await.unwrap(), Bytes::from_static(b"a"));
        assert_eq!(store.get_blob(&id).await.unwrap(), Bytes::from_static(b"a"));

        assert_eq!(
            store.stats(),
            ObjectStoreStats {
                local_hits: 2,
                backing_fetches: 2,
            }
        );
    }

    #[tokio::test]
    async fn test_reads_fail_after_shutdown() {
        let dir = TempDir::new().unwrap();
        let local = Arc::new(LocalStore::open(LocalStoreConfig::new(dir.path())).unwrap());
        let backing = crate::backing::EmptyBackingStore::new(BackingStoreKey::new("null", ""));
        let store = ObjectStore::new(Arc::new(backing), local);

        let root = store.root_id().await.unwrap();
        assert!(store.get_tree(&root).await.unwrap().is_empty());

        let backing = Arc::downgrade(&store.backing_store().unwrap());
        store.shutdown().await;
        store.shutdown().await;
        assert!(store.is_closed());
        assert!(store.backing_store().is_none());
        assert!(backing.upgrade().is_none());
        assert!(matches!(store.get_tree(&root).await, Err(StoreError::Closed)));
    }
}
