// Service modules (daemon functionality)
pub mod fuse;
pub mod http_server;
pub mod process;
pub mod server;
pub mod service_config;
pub mod service_state;

// App state (configuration, paths)
pub mod state;

pub use process::{spawn_service, spawn_service_with_driver, start_service, ShutdownHandle};
pub use server::{Mount, MountInfo, MountServer, MountStage, ServerError};
pub use service_config::Config as ServiceConfig;
pub use service_state::State as ServiceState;
pub use state::{AppConfig, AppState, StateError};

/// Daemon-specific build info that uses the daemon's BUILD_FEATURES.
///
/// This is needed because `common::version::BuildInfo::new()` reads
/// BUILD_FEATURES from common's compile environment, not daemon's.
pub fn build_info() -> common::version::BuildInfo {
    let mut info = common::version::BuildInfo::new();
    info.build_features = option_env!("BUILD_FEATURES").unwrap_or("none").to_string();
    info
}
