//! Process-wide local object cache.
//!
//! Objects imported from backing stores are written under
//! `<path>/<namespace>/<hash of id>` and kept hot in a size-bounded
//! in-memory cache. Namespaces keep stores of different repositories apart.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use moka::sync::Cache;

use crate::error::{Result, StoreError};
use crate::types::{ObjectId, Tree};

#[derive(Debug, Clone)]
pub struct LocalStoreConfig {
    pub path: PathBuf,
    /// Upper bound on the bytes held by the in-memory cache.
    pub max_memory_bytes: u64,
    /// Evict in-memory entries not read for this long.
    pub time_to_idle: Duration,
}

impl LocalStoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_memory_bytes: 256 * 1024 * 1024,
            time_to_idle: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone)]
enum CachedObject {
    Blob(Bytes),
    Tree(Arc<Tree>),
}

impl CachedObject {
    fn weight(&self) -> u32 {
        let bytes = match self {
            CachedObject::Blob(data) => data.len(),
            CachedObject::Tree(tree) => tree
                .entries()
                .iter()
                .map(|e| e.name.len() + e.id.as_str().len() + 16)
                .sum(),
        };
        u32::try_from(bytes).unwrap_or(u32::MAX).max(1)
    }
}

pub struct LocalStore {
    root: PathBuf,
    memory: Cache<(String, ObjectId), CachedObject>,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("root", &self.root)
            .field("cached_entries", &self.memory.entry_count())
            .finish()
    }
}

impl LocalStore {
    pub fn open(config: LocalStoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.path).map_err(|e| StoreError::io(&config.path, e))?;

        let memory = Cache::builder()
            .max_capacity(config.max_memory_bytes)
            .weigher(|_key, value: &CachedObject| value.weight())
            .time_to_idle(config.time_to_idle)
            .build();

        tracing::info!(path = %config.path.display(), "opened local store");
        Ok(Self {
            root: config.path,
            memory,
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, namespace: &str, id: &ObjectId) -> PathBuf {
        let name = blake3::hash(id.as_str().as_bytes()).to_hex();
        self.root.join(namespace).join(name.as_str())
    }

    async fn read_file(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    async fn write_file(&self, path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }
        // Readers never see a partially written object.
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| StoreError::io(path, e))
    }

    pub async fn get_blob(&self, namespace: &str, id: &ObjectId) -> Result<Option<Bytes>> {
        let key = (namespace.to_string(), id.clone());
        if let Some(CachedObject::Blob(data)) = self.memory.get(&key) {
            return Ok(Some(data));
        }

        let Some(data) = self.read_file(&self.object_path(namespace, id)).await? else {
            return Ok(None);
        };
        let data = Bytes::from(data);
        self.memory.insert(key, CachedObject::Blob(data.clone()));
        Ok(Some(data))
    }

    pub async fn put_blob(&self, namespace: &str, id: &ObjectId, data: &Bytes) -> Result<()> {
        self.write_file(&self.object_path(namespace, id), data).await?;
        self.memory.insert(
            (namespace.to_string(), id.clone()),
            CachedObject::Blob(data.clone()),
        );
        Ok(())
    }

    pub async fn get_tree(&self, namespace: &str, id: &ObjectId) -> Result<Option<Arc<Tree>>> {
        let key = (namespace.to_string(), id.clone());
        if let Some(CachedObject::Tree(tree)) = self.memory.get(&key) {
            return Ok(Some(tree));
        }

        let Some(data) = self.read_file(&self.object_path(namespace, id)).await? else {
            return Ok(None);
        };
        let tree: Tree = serde_json::from_slice(&data).map_err(|source| StoreError::Decode {
            id: id.clone(),
            source,
        })?;
        let tree = Arc::new(tree);
        self.memory.insert(key, CachedObject::Tree(Arc::clone(&tree)));
        Ok(Some(tree))
    }

    pub async fn put_tree(&self, namespace: &str, id: &ObjectId, tree: &Tree) -> Result<()> {
        let data = serde_json::to_vec(tree).map_err(|source| StoreError::Decode {
            id: id.clone(),
            source,
        })?;
        self.write_file(&self.object_path(namespace, id), &data).await?;
        self.memory.insert(
            (namespace.to_string(), id.clone()),
            CachedObject::Tree(Arc::new(tree.clone())),
        );
        Ok(())
    }

    /// Number of objects currently held in memory.
    pub fn cached_entries(&self) -> u64 {
        self.memory.run_pending_tasks();
        self.memory.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntryKind, TreeEntry};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_blob_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let id = ObjectId::new("0:5:README");
        {
            let store = LocalStore::open(LocalStoreConfig::new(dir.path())).unwrap();
            store
                .put_blob("ns", &id, &Bytes::from_static(b"hello"))
                .await
                .unwrap();
            assert_eq!(store.cached_entries(), 1);
        }

        let store = LocalStore::open(LocalStoreConfig::new(dir.path())).unwrap();
        assert_eq!(store.cached_entries(), 0);
        assert_eq!(
            store.get_blob("ns", &id).await.unwrap(),
            Some(Bytes::from_static(b"hello"))
        );
        assert_eq!(store.cached_entries(), 1);
    }

    #[tokio::test]
    async fn test_namespaces_are_disjoint() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(LocalStoreConfig::new(dir.path())).unwrap();
        let id = ObjectId::new("same");
        store
            .put_blob("a", &id, &Bytes::from_static(b"a"))
            .await
            .unwrap();
        assert!(store.get_blob("b", &id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tree_round_trip_through_disk() {
        let dir = TempDir::new().unwrap();
        let id = ObjectId::new("root");
        let tree = Tree::new(vec![TreeEntry {
            name: "src".to_string(),
            kind: EntryKind::Directory,
            id: ObjectId::new("src"),
            size: 0,
        }]);
        {
            let store = LocalStore::open(LocalStoreConfig::new(dir.path())).unwrap();
            store.put_tree("ns", &id, &tree).await.unwrap();
        }
        let store = LocalStore::open(LocalStoreConfig::new(dir.path())).unwrap();
        assert_eq!(store.get_tree("ns", &id).await.unwrap().as_deref(), Some(&tree));
    }
}
