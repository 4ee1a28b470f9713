//! Filesystem driver integration.
//!
//! The mount orchestrator only talks to an [`FsDriver`]: it hands over a
//! registered mount, gets back a future that resolves when serving ends, and
//! asks the driver to unmount on request.
//!
//! - `FuserDriver`: kernel FUSE sessions via `fuser` (feature `fuse`)
//! - `ArborFs`: read-only `fuser::Filesystem` over a mount's inode table
//! - [`InodeTable`]: loaded inodes and their eviction bookkeeping

#[cfg(feature = "fuse")]
mod arbor_fs;
#[cfg(feature = "fuse")]
mod fuser_driver;
mod inode_table;

use std::sync::Arc;

use async_trait::async_trait;
use common::mount_path::MountPath;
use futures::future::BoxFuture;

use crate::server::Mount;

#[cfg(feature = "fuse")]
pub use arbor_fs::ArborFs;
#[cfg(feature = "fuse")]
pub use fuser_driver::FuserDriver;
pub use inode_table::{InodeGuard, InodeSnapshot, InodeTable};

/// Resolves when the driver stops serving a mount, for whatever reason.
pub type DriverCompletion = BoxFuture<'static, Result<(), DriverError>>;

/// Everything a driver may use while serving a mount.
#[derive(Debug, Clone)]
pub struct DriverContext {
    /// Runtime driving the orchestrator.
    pub control: tokio::runtime::Handle,
    /// Worker pool request handling runs on.
    pub workers: tokio::runtime::Handle,
    pub debug: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("failed to mount {path}: {source}")]
    Mount {
        path: MountPath,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to unmount {path}: {source}")]
    Unmount {
        path: MountPath,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} is not being served by this driver")]
    NotServing(MountPath),
    #[error("session for {path} ended with error: {source}")]
    Session {
        path: MountPath,
        #[source]
        source: std::io::Error,
    },
    #[error("driver task failed: {0}")]
    Task(String),
    #[error("filesystem driver support is not compiled into this build")]
    Unsupported,
}

#[async_trait]
pub trait FsDriver: Send + Sync {
    /// Start serving `mount`. Returns once the mount is live.
    async fn start_serving(
        &self,
        mount: Arc<Mount>,
        ctx: DriverContext,
    ) -> Result<DriverCompletion, DriverError>;

    /// Ask the kernel to detach `path`. The completion future returned by
    /// `start_serving` resolves once it has.
    async fn unmount(&self, path: &MountPath) -> Result<(), DriverError>;
}

/// Driver used when the daemon is built without FUSE support.
#[cfg(not(feature = "fuse"))]
#[derive(Debug, Default)]
pub struct UnsupportedDriver;

#[cfg(not(feature = "fuse"))]
#[async_trait]
impl FsDriver for UnsupportedDriver {
    async fn start_serving(
        &self,
        _mount: Arc<Mount>,
        _ctx: DriverContext,
    ) -> Result<DriverCompletion, DriverError> {
        Err(DriverError::Unsupported)
    }

    async fn unmount(&self, _path: &MountPath) -> Result<(), DriverError> {
        Err(DriverError::Unsupported)
    }
}

/// The driver this build mounts with.
pub fn default_driver() -> Arc<dyn FsDriver> {
    #[cfg(feature = "fuse")]
    {
        Arc::new(FuserDriver::default())
    }
    #[cfg(not(feature = "fuse"))]
    {
        Arc::new(UnsupportedDriver)
    }
}
