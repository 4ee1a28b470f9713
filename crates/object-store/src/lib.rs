//! Content plumbing behind every arbor mount.
//!
//! A mount reads repository content through an [`ObjectStore`], which checks
//! the process-wide [`LocalStore`] first and falls back to the mount's
//! [`BackingStore`]. Backing stores are pluggable per repository type:
//!
//! - `null`: [`EmptyBackingStore`], a repository with an empty root tree
//! - `git` / `hg`: [`WorkingCopyStore`], serving a local checkout
//!
//! Stores are built through a [`BackingStoreFactory`] so the daemon can
//! cache and share them between mounts of the same repository.

mod backing;
mod error;
mod local_store;
mod object_store;
mod types;

pub use backing::{
    BackingStore, BackingStoreFactory, BackingStoreKey, DefaultStoreFactory, EmptyBackingStore,
    StoreKind, WorkingCopyStore,
};
pub use error::{Result, StoreError};
pub use local_store::{LocalStore, LocalStoreConfig};
pub use object_store::{ObjectStore, ObjectStoreStats};
pub use types::{EntryKind, ObjectId, Tree, TreeEntry};
