//! Periodic background work: stats flushing and idle inode unloading.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use super::MountServer;
use crate::ServiceConfig;

pub const STATS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceConfig {
    pub stats_interval: Duration,
    /// Zero disables unloading.
    pub unload_interval: Duration,
    pub unload_start_delay: Duration,
    pub unload_age: Duration,
}

impl From<&ServiceConfig> for MaintenanceConfig {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            stats_interval: STATS_INTERVAL,
            unload_interval: config.unload_interval,
            unload_start_delay: config.unload_start_delay,
            unload_age: config.unload_age,
        }
    }
}

/// Run the maintenance timers on the current runtime until `shutdown`
/// becomes true.
pub fn spawn(
    server: Arc<MountServer>,
    config: MaintenanceConfig,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = Instant::now();
        let mut next_flush = start + config.stats_interval;
        let mut next_unload =
            (!config.unload_interval.is_zero()).then(|| start + config.unload_start_delay);

        loop {
            let unload_due = async {
                match next_unload {
                    Some(deadline) => sleep_until(deadline).await,
                    None => pending().await,
                }
            };

            tokio::select! {
                _ = async {
                    // A dropped sender means the service is gone too.
                    let _ = shutdown.wait_for(|stop| *stop).await;
                } => break,
                _ = sleep_until(next_flush) => {
                    server.flush_stats();
                    // Stores still read by in-flight requests at teardown.
                    server.backing_stores().prune();
                    next_flush += config.stats_interval;
                }
                _ = unload_due => {
                    server.unload_inodes(config.unload_age);
                    // Measured from the end of the pass.
                    next_unload = Some(Instant::now() + config.unload_interval);
                }
            }
        }
        tracing::debug!("maintenance task stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::stats::{STATS_FLUSHES, UNLOAD_PASSES};
    use tempfile::TempDir;

    fn server(dir: &TempDir) -> Arc<MountServer> {
        let mut config = ServiceConfig::new(dir.path());
        config.etc_dir = dir.path().join("etc");
        config.user_config_path = dir.path().join("arborrc");
        config.num_worker_threads = 1;
        MountServer::builder(config).build().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_flushes_every_interval_until_shutdown() {
        let dir = TempDir::new().unwrap();
        let server = server(&dir);
        let (tx, rx) = watch::channel(false);
        let config = MaintenanceConfig {
            stats_interval: Duration::from_secs(1),
            unload_interval: Duration::ZERO,
            unload_start_delay: Duration::from_secs(600),
            unload_age: Duration::from_secs(3600),
        };
        let task = spawn(Arc::clone(&server), config, rx);

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(server.stats().get(STATS_FLUSHES), Some(3));
        assert_eq!(server.stats().get(UNLOAD_PASSES), None);

        tx.send_replace(true);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unload_waits_for_start_delay() {
        let dir = TempDir::new().unwrap();
        let server = server(&dir);
        let (tx, rx) = watch::channel(false);
        let config = MaintenanceConfig {
            stats_interval: Duration::from_secs(3600),
            unload_interval: Duration::from_secs(60),
            unload_start_delay: Duration::from_secs(600),
            unload_age: Duration::from_secs(3600),
        };
        let task = spawn(Arc::clone(&server), config, rx);

        tokio::time::sleep(Duration::from_secs(599)).await;
        assert_eq!(server.stats().get(UNLOAD_PASSES), None);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(server.stats().get(UNLOAD_PASSES), Some(1));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(server.stats().get(UNLOAD_PASSES), Some(2));

        tx.send_replace(true);
        task.await.unwrap();
    }
}
