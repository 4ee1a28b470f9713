//! Types shared between the arbor daemon, its object store and its clients.

pub mod config;
pub mod mount_path;
pub mod version;

pub mod prelude {
    pub use crate::config::{ClientConfig, ConfigError, ConfigSnapshot, RepositoryConfig};
    pub use crate::mount_path::{MountPath, MountPathError};
    pub use crate::version::BuildInfo;
}
