//! Backing store serving the working copy of a local git or hg checkout.
//!
//! Object ids encode the relative path together with the modification time
//! and length observed when the id was handed out, so an edited file gets a
//! new id and stale local-store entries are simply never asked for again.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use bytes::Bytes;

use super::{BackingStore, BackingStoreKey, StoreKind};
use crate::error::{Result, StoreError};
use crate::local_store::LocalStore;
use crate::types::{EntryKind, ObjectId, Tree, TreeEntry};

#[derive(Debug)]
pub struct WorkingCopyStore {
    kind: StoreKind,
    key: BackingStoreKey,
    root: PathBuf,
    local: Arc<LocalStore>,
}

impl WorkingCopyStore {
    /// Resolve the origin to a canonical checkout root.
    pub async fn open(
        kind: StoreKind,
        key: BackingStoreKey,
        local: Arc<LocalStore>,
    ) -> Result<Self> {
        let root = tokio::fs::canonicalize(&key.origin)
            .await
            .map_err(|e| StoreError::io(&key.origin, e))?;

        if let Some(marker) = kind.metadata_dir() {
            let marker_path = root.join(marker);
            let present = tokio::fs::try_exists(&marker_path)
                .await
                .map_err(|e| StoreError::io(&marker_path, e))?;
            if !present {
                return Err(StoreError::NotARepository { path: root, kind });
            }
        }

        tracing::debug!(store = %key, root = %root.display(), "opened working copy");
        Ok(Self {
            kind,
            key,
            root,
            local,
        })
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, id: &ObjectId) -> Result<(String, PathBuf)> {
        let relative = decode_relative(id)?;
        let mut path = self.root.clone();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => path.push(part),
                _ => return Err(StoreError::MalformedId(id.to_string())),
            }
        }
        Ok((relative.to_string(), path))
    }

    fn is_metadata_dir(&self, relative: &str, name: &str) -> bool {
        relative.is_empty() && self.kind.metadata_dir() == Some(name)
    }
}

fn encode_id(relative: &str, metadata: &std::fs::Metadata) -> ObjectId {
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    ObjectId::new(format!("{mtime:x}:{:x}:{relative}", metadata.len()))
}

fn decode_relative(id: &ObjectId) -> Result<&str> {
    let mut parts = id.as_str().splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(_), Some(relative)) => Ok(relative),
        _ => Err(StoreError::MalformedId(id.to_string())),
    }
}

fn join_relative(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

#[async_trait]
impl BackingStore for WorkingCopyStore {
    fn key(&self) -> &BackingStoreKey {
        &self.key
    }

    async fn root(&self) -> Result<ObjectId> {
        let metadata = tokio::fs::metadata(&self.root)
            .await
            .map_err(|e| StoreError::io(&self.root, e))?;
        Ok(encode_id("", &metadata))
    }

    async fn get_tree(&self, id: &ObjectId) -> Result<Tree> {
        let (relative, path) = self.resolve(id)?;
        let mut dir = match tokio::fs::read_dir(&path).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.clone()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotADirectory => {
                return Err(StoreError::WrongKind(id.clone(), "tree"))
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&path, e))?
        {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::debug!(path = %entry.path().display(), "skipping non-utf8 entry");
                continue;
            };
            if self.is_metadata_dir(&relative, &name) {
                continue;
            }
            let metadata = match tokio::fs::symlink_metadata(entry.path()).await {
                Ok(metadata) => metadata,
                // Removed between listing and stat.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StoreError::io(entry.path(), e)),
            };
            let kind = if metadata.is_dir() {
                EntryKind::Directory
            } else if metadata.is_file() {
                EntryKind::File
            } else {
                continue;
            };
            let child = join_relative(&relative, &name);
            entries.push(TreeEntry {
                id: encode_id(&child, &metadata),
                size: if kind == EntryKind::File { metadata.len() } else { 0 },
                name,
                kind,
            });
        }

        let tree = Tree::new(entries);
        self.local.put_tree(&self.key.namespace(), id, &tree).await?;
        Ok(tree)
    }

    async fn get_blob(&self, id: &ObjectId) -> Result<Bytes> {
        let (_, path) = self.resolve(id)?;
        let data = match tokio::fs::read(&path).await {
            Ok(data) => Bytes::from(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.clone()))
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        self.local.put_blob(&self.key.namespace(), id, &data).await?;
        Ok(data)
    }
}
