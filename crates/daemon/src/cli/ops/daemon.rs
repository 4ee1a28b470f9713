use std::path::PathBuf;

use clap::Args;

use crate::cli::op::{Op, OpContext};
use arbor_daemon::{start_service, AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Daemon {
    /// Listen address: a socket path, a port or host:port
    #[arg(long)]
    pub listen: Option<String>,

    /// Directory holding system-wide config.d/*.toml
    #[arg(long)]
    pub etc_dir: Option<PathBuf>,

    /// Per-user config file (defaults to ~/.arborrc)
    #[arg(long)]
    pub user_config: Option<PathBuf>,

    /// Threads serving filesystem requests
    #[arg(long)]
    pub num_threads: Option<usize>,

    /// Seconds between inode unload passes, 0 disables them
    #[arg(long)]
    pub unload_interval: Option<u64>,

    /// Log level: trace, debug, info, warn or error
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log to stderr only
    #[arg(long)]
    pub no_log_file: bool,

    /// Pass debug options to the filesystem driver
    #[arg(long)]
    pub debug: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("daemon failed: {0:#}")]
    Service(anyhow::Error),
}

#[async_trait::async_trait]
impl Op for Daemon {
    type Error = DaemonError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        state.ensure_layout()?;

        let mut config = state.service_config()?;
        if let Some(listen) = &self.listen {
            config.listen_address = Some(listen.clone());
        }
        if let Some(dir) = &self.etc_dir {
            config.etc_dir = dir.clone();
        }
        if let Some(path) = &self.user_config {
            config.user_config_path = path.clone();
        }
        if let Some(threads) = self.num_threads {
            config.num_worker_threads = threads;
        }
        if let Some(secs) = self.unload_interval {
            config.unload_interval = std::time::Duration::from_secs(secs);
        }
        if let Some(level) = &self.log_level {
            config.log_level = level
                .parse()
                .map_err(|_| StateError::InvalidLogLevel(level.clone()))?;
        }
        config.log_to_file = !self.no_log_file;
        config.debug = self.debug;

        start_service(&config)
            .await
            .map_err(DaemonError::Service)?;

        Ok("daemon stopped".to_string())
    }
}

impl std::fmt::Display for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "daemon")
    }
}
