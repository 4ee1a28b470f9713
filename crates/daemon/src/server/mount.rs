//! A live mount: resolved config, object store, loaded inodes, lifecycle
//! stage and the completion signal unmount waiters block on.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use common::config::ClientConfig;
use common::mount_path::MountPath;
use object_store::{EntryKind, ObjectId, ObjectStore, StoreError, TreeEntry};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::completion::CompletionSignal;
use super::lifecycle::{transition, Effect, InvalidTransition, MountEvent, MountStage};
use crate::fuse::{DriverError, InodeSnapshot, InodeTable};

/// Receives the error of every driver unmount attempt that fails after the
/// subscriber's own request.
pub(crate) type UnmountFailures = watch::Receiver<Option<Arc<DriverError>>>;

/// File in a client directory listing paths with local modifications, which
/// are loaded eagerly when the mount comes up.
pub const MATERIALIZED_FILE: &str = "materialized.json";

/// Request to mount a client directory at a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountInfo {
    pub mount_point: String,
    pub client_dir: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum RehydrateError {
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
        source: serde_json::Error,
    },
    #[error("materialized path {0} no longer exists")]
    Missing(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Filesystem requests served since the last stats flush.
#[derive(Debug, Default)]
pub struct MountCounters {
    lookups: AtomicU64,
    readdirs: AtomicU64,
    reads: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
pub enum RequestKind {
    Lookup,
    Readdir,
    Read,
}

impl MountCounters {
    pub fn record(&self, kind: RequestKind) {
        let counter = match kind {
            RequestKind::Lookup => &self.lookups,
            RequestKind::Readdir => &self.readdirs,
            RequestKind::Read => &self.reads,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Take and reset the pending counts.
    pub fn drain(&self) -> [(&'static str, u64); 3] {
        [
            ("lookup", self.lookups.swap(0, Ordering::Relaxed)),
            ("readdir", self.readdirs.swap(0, Ordering::Relaxed)),
            ("read", self.reads.swap(0, Ordering::Relaxed)),
        ]
    }
}

#[derive(Debug)]
pub struct Mount {
    config: ClientConfig,
    object_store: Arc<ObjectStore>,
    inodes: Arc<InodeTable>,
    stage: Mutex<MountStage>,
    completion: CompletionSignal,
    unmount_failures: watch::Sender<Option<Arc<DriverError>>>,
    counters: MountCounters,
    created_at: DateTime<Utc>,
}

impl Mount {
    pub(crate) fn new(
        config: ClientConfig,
        object_store: Arc<ObjectStore>,
        root_id: ObjectId,
        stage: MountStage,
    ) -> Self {
        Self {
            config,
            object_store,
            inodes: Arc::new(InodeTable::new(root_id)),
            stage: Mutex::new(stage),
            completion: CompletionSignal::new(),
            unmount_failures: watch::channel(None).0,
            counters: MountCounters::default(),
            created_at: Utc::now(),
        }
    }

    pub fn path(&self) -> &MountPath {
        &self.config.mount_path
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn object_store(&self) -> &Arc<ObjectStore> {
        &self.object_store
    }

    pub fn inodes(&self) -> &Arc<InodeTable> {
        &self.inodes
    }

    pub fn completion(&self) -> &CompletionSignal {
        &self.completion
    }

    pub fn counters(&self) -> &MountCounters {
        &self.counters
    }

    /// When the mount request that built this mount arrived.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn stage(&self) -> MountStage {
        *self.stage.lock()
    }

    /// Advance the lifecycle under this mount's lock and return the effects
    /// the caller now owns.
    pub(crate) fn apply(&self, event: MountEvent) -> Result<Vec<Effect>, InvalidTransition> {
        let mut stage = self.stage.lock();
        self.advance(&mut stage, event)
    }

    fn advance(
        &self,
        stage: &mut MountStage,
        event: MountEvent,
    ) -> Result<Vec<Effect>, InvalidTransition> {
        let from = *stage;
        let next = transition(from, event)?;
        tracing::debug!(
            mount_point = %self.path(),
            %from,
            to = %next.next,
            ?event,
            "mount transition"
        );
        *stage = next.next;
        Ok(next.effects)
    }

    /// Record an unmount request. The returned receiver sees every driver
    /// unmount failure from here on, including for an attempt this request
    /// was coalesced into or deferred behind.
    pub(crate) fn request_unmount(
        &self,
    ) -> Result<(Vec<Effect>, UnmountFailures), InvalidTransition> {
        let mut stage = self.stage.lock();
        let failures = self.unmount_failures.subscribe();
        let effects = self.advance(&mut stage, MountEvent::UnmountRequested)?;
        Ok((effects, failures))
    }

    /// Revert a failed driver unmount and hand the error to every waiting
    /// requester. Returns `false` when the mount is stopping regardless, in
    /// which case requesters are left to the completion signal.
    pub(crate) fn unmount_failed(&self, error: Arc<DriverError>) -> bool {
        let mut stage = self.stage.lock();
        if self.advance(&mut stage, MountEvent::UnmountFailed).is_err() {
            return false;
        }
        self.unmount_failures.send_replace(Some(error));
        true
    }

    /// Unmount requests currently waiting on this mount.
    pub fn pending_unmounts(&self) -> usize {
        self.unmount_failures.receiver_count()
    }

    /// Load the inodes for every path listed in the client's materialized
    /// file. Returns how many paths were loaded.
    pub async fn rehydrate(&self) -> Result<usize, RehydrateError> {
        let path = self.config.client_dir.join(MATERIALIZED_FILE);
        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(source) => return Err(RehydrateError::Io { path, source }),
        };
        let paths: Vec<String> = serde_json::from_slice(&contents)
            .map_err(|source| RehydrateError::Parse { path, source })?;

        for relative in &paths {
            let mut ino = InodeTable::ROOT_INODE;
            for name in relative.split('/').filter(|part| !part.is_empty()) {
                ino = self
                    .lookup_child(ino, name)
                    .await?
                    .ok_or_else(|| RehydrateError::Missing(relative.clone()))?
                    .ino;
            }
        }
        Ok(paths.len())
    }

    async fn tree_entries(&self, dir: &InodeSnapshot) -> Result<Vec<TreeEntry>, StoreError> {
        if dir.kind != EntryKind::Directory {
            return Err(StoreError::WrongKind(dir.object_id.clone(), "tree"));
        }
        let tree = self.object_store.get_tree(&dir.object_id).await?;
        Ok(tree.entries().to_vec())
    }

    /// Resolve `name` under `parent`, loading it from the parent's tree when
    /// it is not loaded yet.
    pub async fn lookup_child(
        &self,
        parent: u64,
        name: &str,
    ) -> Result<Option<InodeSnapshot>, StoreError> {
        if let Some(child) = self.inodes.child(parent, name) {
            return Ok(Some(child));
        }
        let Some(dir) = self.inodes.get(parent) else {
            return Ok(None);
        };
        let entries = self.tree_entries(&dir).await?;
        Ok(entries
            .iter()
            .find(|entry| entry.name == name)
            .and_then(|entry| self.inodes.insert_child(parent, entry)))
    }

    /// Entries of directory `ino`, each loaded as an inode.
    pub async fn list_dir(&self, ino: u64) -> Result<Option<Vec<InodeSnapshot>>, StoreError> {
        let Some(dir) = self.inodes.get(ino) else {
            return Ok(None);
        };
        let entries = self.tree_entries(&dir).await?;
        Ok(Some(
            entries
                .iter()
                .filter_map(|entry| self.inodes.insert_child(ino, entry))
                .collect(),
        ))
    }

    /// Up to `size` bytes of file `ino` starting at `offset`.
    pub async fn read(&self, ino: u64, offset: u64, size: u32) -> Result<Option<Bytes>, StoreError> {
        let Some(file) = self.inodes.get(ino) else {
            return Ok(None);
        };
        if file.kind != EntryKind::File {
            return Err(StoreError::WrongKind(file.object_id, "blob"));
        }
        let data = self.object_store.get_blob(&file.object_id).await?;
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
        let end = start.saturating_add(size as usize).min(data.len());
        Ok(Some(data.slice(start..end)))
    }
}

#[cfg(test)]
pub(crate) async fn test_mount(path: &str) -> (tempfile::TempDir, Arc<Mount>) {
    use object_store::{BackingStoreKey, EmptyBackingStore, LocalStore, LocalStoreConfig};

    let dir = tempfile::TempDir::new().unwrap();
    let local = Arc::new(LocalStore::open(LocalStoreConfig::new(dir.path().join("store"))).unwrap());
    let backing = Arc::new(EmptyBackingStore::new(BackingStoreKey::new("null", "")));
    let object_store = Arc::new(ObjectStore::new(backing, local));
    let root = object_store.root_id().await.unwrap();
    let config = ClientConfig {
        mount_path: MountPath::new(path).unwrap(),
        client_dir: dir.path().join("client"),
        repository_name: None,
        repo_type: "null".to_string(),
        repo_source: String::new(),
    };
    let mount = Mount::new(config, object_store, root, MountStage::ObjectStoreBuilt);
    (dir, Arc::new(mount))
}
