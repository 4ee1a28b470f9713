//! Backing stores: where a mount's content originally comes from.

mod empty;
mod working_copy;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::local_store::LocalStore;
use crate::types::{ObjectId, Tree};

pub use empty::EmptyBackingStore;
pub use working_copy::WorkingCopyStore;

/// Repository types arbor knows how to back a mount with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Null,
    Git,
    Hg,
}

impl StoreKind {
    pub fn parse(store_type: &str) -> Result<Self> {
        match store_type {
            "null" => Ok(Self::Null),
            "git" => Ok(Self::Git),
            "hg" => Ok(Self::Hg),
            other => Err(StoreError::UnsupportedType(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Git => "git",
            Self::Hg => "hg",
        }
    }

    /// Directory whose presence marks the root of a checkout.
    pub(crate) fn metadata_dir(&self) -> Option<&'static str> {
        match self {
            Self::Null => None,
            Self::Git => Some(".git"),
            Self::Hg => Some(".hg"),
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a backing store: repository type plus origin, exactly as
/// configured.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BackingStoreKey {
    pub store_type: String,
    pub origin: String,
}

impl BackingStoreKey {
    pub fn new(store_type: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            store_type: store_type.into(),
            origin: origin.into(),
        }
    }

    /// Stable directory-safe name used to partition the local store.
    pub fn namespace(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.store_type.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.origin.as_bytes());
        hasher.finalize().to_hex()[..32].to_string()
    }
}

impl fmt::Display for BackingStoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.store_type, self.origin)
    }
}

#[async_trait]
pub trait BackingStore: Send + Sync + fmt::Debug {
    fn key(&self) -> &BackingStoreKey;

    /// Identifier of the root tree as of now.
    async fn root(&self) -> Result<ObjectId>;

    /// Import a tree. Stores that persist imports write them to the local
    /// store before returning.
    async fn get_tree(&self, id: &ObjectId) -> Result<Tree>;

    async fn get_blob(&self, id: &ObjectId) -> Result<Bytes>;
}

/// Builds backing stores for the daemon's store cache.
#[async_trait]
pub trait BackingStoreFactory: Send + Sync {
    /// Reject store types this factory can never build. Called before any
    /// cache state is touched.
    fn check_type(&self, store_type: &str) -> Result<()> {
        StoreKind::parse(store_type).map(|_| ())
    }

    async fn construct(
        &self,
        key: &BackingStoreKey,
        local: &Arc<LocalStore>,
    ) -> Result<Arc<dyn BackingStore>>;
}

/// Factory for the built-in `null`, `git` and `hg` store types.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultStoreFactory;

#[async_trait]
impl BackingStoreFactory for DefaultStoreFactory {
    async fn construct(
        &self,
        key: &BackingStoreKey,
        local: &Arc<LocalStore>,
    ) -> Result<Arc<dyn BackingStore>> {
        let store: Arc<dyn BackingStore> = match StoreKind::parse(&key.store_type)? {
            StoreKind::Null => Arc::new(EmptyBackingStore::new(key.clone())),
            kind @ (StoreKind::Git | StoreKind::Hg) => {
                Arc::new(WorkingCopyStore::open(kind, key.clone(), Arc::clone(local)).await?)
            }
        };
        tracing::info!(store = %key, "created backing store");
        Ok(store)
    }
}
