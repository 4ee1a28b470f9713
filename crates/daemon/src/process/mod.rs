//! Daemon process lifecycle: lock, listen, serve, and shut down cleanly.

mod address;
mod lock;
mod logging;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::fuse::{default_driver, FsDriver};
use crate::http_server;
use crate::server::maintenance::{self, MaintenanceConfig};
use crate::server::MountServer;
use crate::{ServiceConfig, ServiceState};

pub use address::{AddressError, ListenAddress, Listener};
pub use lock::{LockError, ProcessLock};

/// Handle on a running service.
pub struct ShutdownHandle {
    server: Arc<MountServer>,
    address: ListenAddress,
    task: JoinHandle<anyhow::Result<()>>,
}

impl ShutdownHandle {
    pub fn server(&self) -> &Arc<MountServer> {
        &self.server
    }

    pub fn address(&self) -> &ListenAddress {
        &self.address
    }

    /// Stop serving, unmount everything and wait for the service to exit.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.server.stop();
        self.wait().await
    }

    /// Wait for the service to exit on its own (signal or `stop`).
    pub async fn wait(self) -> anyhow::Result<()> {
        self.task.await.context("service task panicked")?
    }
}

/// Run the service in the foreground until it is stopped by a signal.
pub async fn start_service(config: &ServiceConfig) -> anyhow::Result<()> {
    spawn_service(config).await?.wait().await
}

/// Start the service with the filesystem driver this build supports.
pub async fn spawn_service(config: &ServiceConfig) -> anyhow::Result<ShutdownHandle> {
    spawn_service_with_driver(config, default_driver()).await
}

/// Start the service and return once it is accepting requests.
pub async fn spawn_service_with_driver(
    config: &ServiceConfig,
    driver: Arc<dyn FsDriver>,
) -> anyhow::Result<ShutdownHandle> {
    let log_guard = logging::init(config);

    let lock = ProcessLock::acquire(&config.data_dir)?;
    for dir in [config.clients_dir(), config.storage_path()] {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let server = MountServer::builder(config.clone()).driver(driver).build()?;
    let maintenance = maintenance::spawn(
        Arc::clone(&server),
        MaintenanceConfig::from(config),
        server.stop_signal(),
    );

    if let Err(e) = server.reload_config().await {
        tracing::warn!(error = %e, "failed to load global config, continuing with defaults");
    }
    server.remount_all().await;

    let address = ListenAddress::resolve(config.listen_address.as_deref(), &config.data_dir);
    address.prepare()?;
    let listener = address.bind().await?;
    tracing::info!(address = %address, pid = std::process::id(), "arbor daemon listening");

    tokio::spawn(watch_signals(Arc::clone(&server)));

    let state = ServiceState::new(Arc::clone(&server));
    let task_server = Arc::clone(&server);
    let task_address = address.clone();
    let task = tokio::spawn(async move {
        let stop = wait_for_stop(task_server.stop_signal());
        let served = http_server::serve(listener, state, stop).await;
        if let Err(e) = &served {
            tracing::error!(error = %e, "http server failed");
            task_server.stop();
        }

        let shutdown = task_server.shutdown().await;
        if let Err(e) = maintenance.await {
            tracing::warn!(error = %e, "maintenance task failed");
        }
        if let ListenAddress::Unix(path) = &task_address {
            let _ = std::fs::remove_file(path);
        }
        tracing::info!("arbor daemon stopped");
        drop(lock);
        drop(log_guard);

        served.context("http server failed")?;
        shutdown.context("failed to unmount all mounts")
    });

    Ok(ShutdownHandle {
        server,
        address,
        task,
    })
}

async fn wait_for_stop(mut stop: watch::Receiver<bool>) {
    // A dropped sender means the server is gone.
    let _ = stop.wait_for(|stop| *stop).await;
}

/// Translate SIGINT and SIGTERM into `stop()`.
async fn watch_signals(server: Arc<MountServer>) {
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("received interrupt"),
        _ = terminate => tracing::info!("received terminate"),
        _ = wait_for_stop(server.stop_signal()) => return,
    }
    server.stop();
}
