use async_trait::async_trait;
use bytes::Bytes;

use super::{BackingStore, BackingStoreKey};
use crate::error::{Result, StoreError};
use crate::types::{ObjectId, Tree};

const EMPTY_ROOT: &str = "empty-root";

/// Store for the `null` repository type: a single empty root tree.
#[derive(Debug)]
pub struct EmptyBackingStore {
    key: BackingStoreKey,
}

impl EmptyBackingStore {
    pub fn new(key: BackingStoreKey) -> Self {
        Self { key }
    }
}

#[async_trait]
impl BackingStore for EmptyBackingStore {
    fn key(&self) -> &BackingStoreKey {
        &self.key
    }

    async fn root(&self) -> Result<ObjectId> {
        Ok(ObjectId::new(EMPTY_ROOT))
    }

    async fn get_tree(&self, id: &ObjectId) -> Result<Tree> {
        if id.as_str() == EMPTY_ROOT {
            Ok(Tree::default())
        } else {
            Err(StoreError::NotFound(id.clone()))
        }
    }

    async fn get_blob(&self, id: &ObjectId) -> Result<Bytes> {
        Err(StoreError::NotFound(id.clone()))
    }
}
