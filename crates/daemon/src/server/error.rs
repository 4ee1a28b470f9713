use std::sync::Arc;

use common::config::ConfigError;
use common::mount_path::{MountPath, MountPathError};
use object_store::StoreError;

use super::lifecycle::{InvalidTransition, MountStage};
use super::registry::RegistryError;
use crate::fuse::DriverError;

/// Why a mount pipeline stage failed.
#[derive(Debug, thiserror::Error)]
pub enum MountFailure {
    /// The mount's configuration can never work as written (unknown store
    /// type, origin that is not a checkout). Not retried.
    #[error("configuration error: {0}")]
    Configuration(#[source] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Lifecycle(#[from] InvalidTransition),
}

impl From<StoreError> for MountFailure {
    fn from(e: StoreError) -> Self {
        if e.is_configuration() {
            MountFailure::Configuration(e)
        } else {
            MountFailure::Store(e)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("mount point \"{path}\" failed while {activity}: {source}", activity = .stage.activity())]
    Mount {
        path: MountPath,
        stage: MountStage,
        #[source]
        source: MountFailure,
    },
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Shared because every caller waiting on the same attempt gets it.
    #[error("failed to unmount \"{path}\": {source}")]
    Unmount {
        path: MountPath,
        #[source]
        source: Arc<DriverError>,
    },
    #[error("mount point \"{path}\": {source}")]
    Lifecycle {
        path: MountPath,
        #[source]
        source: InvalidTransition,
    },
    #[error("{failed} mount(s) failed to unmount, first error: {first}")]
    UnmountAll {
        failed: usize,
        first: Box<ServerError>,
    },
    #[error(transparent)]
    InvalidPath(#[from] MountPathError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to open local store: {0}")]
    LocalStore(#[source] StoreError),
    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[source] std::io::Error),
    #[error("mount server must be built inside a tokio runtime")]
    NoRuntime,
    #[error("background task failed: {0}")]
    Task(String),
}

impl ServerError {
    pub fn mount_failure(&self) -> Option<&MountFailure> {
        match self {
            ServerError::Mount { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn is_not_mounted(&self) -> bool {
        matches!(
            self,
            ServerError::Registry(RegistryError::NotMounted(_))
                | ServerError::Mount {
                    source: MountFailure::Registry(RegistryError::NotMounted(_)),
                    ..
                }
        )
    }

    pub fn is_already_mounted(&self) -> bool {
        matches!(
            self,
            ServerError::Registry(RegistryError::AlreadyMounted(_))
                | ServerError::Mount {
                    source: MountFailure::Registry(RegistryError::AlreadyMounted(_)),
                    ..
                }
        )
    }

    /// Caller mistakes as opposed to daemon faults.
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidPath(_)
                | ServerError::Mount {
                    source: MountFailure::Configuration(_) | MountFailure::Config(_),
                    ..
                }
        )
    }
}
