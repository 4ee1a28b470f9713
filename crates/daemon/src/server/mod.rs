//! Mount orchestration.
//!
//! [`MountServer`] owns every live mount and drives each one through the
//! lifecycle in [`lifecycle`]: load config, resolve the backing store, build
//! the object store, register, start the filesystem driver, and later stop
//! and tear down exactly once however the stop was triggered.

mod backing_stores;
mod completion;
mod config_holder;
pub mod error;
pub mod lifecycle;
pub mod maintenance;
mod mount;
pub mod registry;
pub mod stats;
mod worker_pool;

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::config::{ClientConfig, ClientDirectoryMap, ConfigError, ConfigSnapshot};
use common::mount_path::MountPath;
use futures::future::join_all;
use object_store::{
    BackingStoreFactory, BackingStoreKey, DefaultStoreFactory, LocalStore, LocalStoreConfig,
    ObjectStore,
};
use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::fuse::{default_driver, DriverCompletion, DriverContext, DriverError, FsDriver};
use crate::ServiceConfig;

pub use backing_stores::BackingStoreCache;
pub use completion::{CompletionSignal, CompletionWaiter};
pub use config_holder::ConfigHolder;
pub use error::{MountFailure, ServerError};
pub use lifecycle::{Effect, MountEvent, MountStage};
pub use mount::{Mount, MountCounters, MountInfo, RehydrateError, RequestKind, MATERIALIZED_FILE};
pub use registry::{MountRegistry, RegistryError};
pub use stats::ServiceStats;
pub use worker_pool::WorkerPool;

/// Stage tracking for a mount that is not registered yet.
struct Pipeline {
    path: MountPath,
    stage: MountStage,
}

impl Pipeline {
    fn advance(&mut self, event: MountEvent) -> Result<Vec<Effect>, ServerError> {
        let next = lifecycle::transition(self.stage, event).map_err(|source| {
            ServerError::Lifecycle {
                path: self.path.clone(),
                source,
            }
        })?;
        self.stage = next.next;
        Ok(next.effects)
    }

    fn fail(&mut self, source: impl Into<MountFailure>) -> ServerError {
        let stage = self.stage;
        if let Ok(next) = lifecycle::transition(stage, MountEvent::StageFailed) {
            self.stage = next.next;
        }
        ServerError::Mount {
            path: self.path.clone(),
            stage,
            source: source.into(),
        }
    }
}

async fn next_unmount_failure(
    failures: &mut mount::UnmountFailures,
) -> Option<Arc<DriverError>> {
    failures.changed().await.ok()?;
    failures.borrow_and_update().clone()
}

pub struct MountServerBuilder {
    config: ServiceConfig,
    driver: Option<Arc<dyn FsDriver>>,
    factory: Option<Arc<dyn BackingStoreFactory>>,
}

impl MountServerBuilder {
    pub fn driver(mut self, driver: Arc<dyn FsDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn store_factory(mut self, factory: Arc<dyn BackingStoreFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Must be called from inside the control runtime.
    pub fn build(self) -> Result<Arc<MountServer>, ServerError> {
        let control = Handle::try_current().map_err(|_| ServerError::NoRuntime)?;
        let local = LocalStore::open(LocalStoreConfig::new(self.config.storage_path()))
            .map_err(ServerError::LocalStore)?;
        let workers =
            WorkerPool::new(self.config.num_worker_threads).map_err(ServerError::WorkerPool)?;
        let factory = self
            .factory
            .unwrap_or_else(|| Arc::new(DefaultStoreFactory));
        let (stop_tx, _) = watch::channel(false);

        let stats = ServiceStats::new();
        stats.set(stats::PERIODIC_UNLOAD_COUNTER, 0);

        Ok(Arc::new(MountServer {
            config_holder: ConfigHolder::new(
                self.config.etc_dir.clone(),
                self.config.user_config_path.clone(),
            ),
            stores: BackingStoreCache::new(factory, Arc::new(local)),
            registry: MountRegistry::new(),
            driver: self.driver.unwrap_or_else(default_driver),
            workers,
            stats,
            control,
            stop_tx,
            config: self.config,
        }))
    }
}

pub struct MountServer {
    config: ServiceConfig,
    config_holder: ConfigHolder,
    stores: BackingStoreCache,
    registry: MountRegistry,
    driver: Arc<dyn FsDriver>,
    workers: WorkerPool,
    stats: ServiceStats,
    control: Handle,
    stop_tx: watch::Sender<bool>,
}

impl fmt::Debug for MountServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountServer")
            .field("data_dir", &self.config.data_dir)
            .field("mounts", &self.registry.len())
            .field("stores", &self.stores)
            .finish_non_exhaustive()
    }
}

impl MountServer {
    pub fn builder(config: ServiceConfig) -> MountServerBuilder {
        MountServerBuilder {
            config,
            driver: None,
            factory: None,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn stats(&self) -> &ServiceStats {
        &self.stats
    }

    pub fn backing_stores(&self) -> &BackingStoreCache {
        &self.stores
    }

    pub fn mount_count(&self) -> usize {
        self.registry.len()
    }

    pub fn current_config(&self) -> Arc<ConfigSnapshot> {
        self.config_holder.current()
    }

    pub async fn reload_config(&self) -> Result<Arc<ConfigSnapshot>, ServerError> {
        Ok(self.config_holder.reload().await?)
    }

    async fn load_client_config(
        &self,
        path: &MountPath,
        client_dir: &Path,
    ) -> Result<ClientConfig, ConfigError> {
        let snapshot = self.config_holder.reload().await?;
        let path = path.clone();
        let client_dir = client_dir.to_path_buf();
        let config_path = client_dir.clone();
        tokio::task::spawn_blocking(move || ClientConfig::load(&path, &client_dir, &snapshot))
            .await
            .map_err(|e| ConfigError::Io {
                path: config_path,
                source: std::io::Error::other(e),
            })?
    }

    /// Bring up a mount. Returns once the driver is serving it, or with the
    /// error of the stage that failed.
    pub async fn mount(self: &Arc<Self>, info: MountInfo) -> Result<Arc<Mount>, ServerError> {
        let path = MountPath::new(&info.mount_point)?;
        tracing::info!(
            mount_point = %path,
            client_dir = %info.client_dir.display(),
            "mount requested"
        );
        let mut pipeline = Pipeline {
            path: path.clone(),
            stage: MountStage::Requested,
        };

        let config = match self.load_client_config(&path, &info.client_dir).await {
            Ok(config) => config,
            Err(e) => return Err(pipeline.fail(e)),
        };
        pipeline.advance(MountEvent::ConfigLoaded)?;

        let key = BackingStoreKey::new(config.repo_type.clone(), config.repo_source.clone());
        let backing = match self.stores.get(&key).await {
            Ok(backing) => backing,
            Err(e) => return Err(pipeline.fail(e)),
        };
        pipeline.advance(MountEvent::StoreResolved)?;

        let object_store = Arc::new(ObjectStore::new(
            backing,
            Arc::clone(self.stores.local_store()),
        ));
        let root = match object_store.root_id().await {
            Ok(root) => root,
            Err(e) => return Err(pipeline.fail(e)),
        };
        let mount = Arc::new(Mount::new(config, object_store, root, pipeline.stage));
        let rehydrated = mount.rehydrate().await;

        let effects = mount
            .apply(MountEvent::ObjectStoreBuilt {
                rehydrated: rehydrated.is_ok(),
            })
            .map_err(|source| ServerError::Lifecycle {
                path: path.clone(),
                source,
            })?;
        for effect in effects {
            match effect {
                Effect::WarnRehydrateFailed => {
                    if let Err(e) = &rehydrated {
                        tracing::warn!(mount_point = %path, error = %e, "failed to rehydrate mount state");
                    }
                }
                Effect::Register => self.register(&mount)?,
                other => tracing::warn!(mount_point = %path, effect = ?other, "unexpected effect"),
            }
        }

        self.start_driver(&mount).await?;
        tracing::info!(mount_point = %path, "mount point \"{}\" ready", path);
        Ok(mount)
    }

    fn register(&self, mount: &Arc<Mount>) -> Result<(), ServerError> {
        let stage = mount.stage();
        if let Err(e) = self.registry.register(Arc::clone(mount)) {
            let _ = mount.apply(MountEvent::StageFailed);
            return Err(ServerError::Mount {
                path: mount.path().clone(),
                stage,
                source: e.into(),
            });
        }
        Ok(())
    }

    async fn start_driver(self: &Arc<Self>, mount: &Arc<Mount>) -> Result<(), ServerError> {
        let effects = mount
            .apply(MountEvent::Registered)
            .map_err(|source| ServerError::Lifecycle {
                path: mount.path().clone(),
                source,
            })?;
        for effect in effects {
            match effect {
                Effect::StartDriver => self.run_driver(mount).await?,
                other => {
                    tracing::warn!(mount_point = %mount.path(), effect = ?other, "unexpected effect")
                }
            }
        }
        Ok(())
    }

    async fn run_driver(self: &Arc<Self>, mount: &Arc<Mount>) -> Result<(), ServerError> {
        let path = mount.path().clone();
        let lifecycle_error = |source| ServerError::Lifecycle {
            path: path.clone(),
            source,
        };
        let ctx = DriverContext {
            control: self.control.clone(),
            workers: self.workers.handle().clone(),
            debug: self.config.debug,
        };

        match self.driver.start_serving(Arc::clone(mount), ctx).await {
            Ok(completion) => {
                let effects = mount
                    .apply(MountEvent::DriverStarted)
                    .map_err(lifecycle_error)?;
                let tail = Arc::clone(self).run_started(Arc::clone(mount), effects, completion);
                self.workers
                    .spawn(tail)
                    .await
                    .map_err(|e| ServerError::Task(e.to_string()))
            }
            Err(source) => {
                tracing::error!(mount_point = %path, error = %source, "failed to start filesystem driver");
                let stage = mount.stage();
                let effects = mount
                    .apply(MountEvent::DriverFailed)
                    .map_err(lifecycle_error)?;
                if effects.contains(&Effect::Teardown) {
                    self.teardown(mount).await;
                }
                Err(ServerError::Mount {
                    path,
                    stage,
                    source: source.into(),
                })
            }
        }
    }

    /// Post-start effects, run on the worker pool.
    async fn run_started(
        self: Arc<Self>,
        mount: Arc<Mount>,
        effects: Vec<Effect>,
        completion: DriverCompletion,
    ) {
        let mut completion = Some(completion);
        for effect in effects {
            match effect {
                Effect::WatchCompletion => {
                    if let Some(completion) = completion.take() {
                        let server = Arc::clone(&self);
                        let mount = Arc::clone(&mount);
                        self.control.spawn(async move {
                            let result = completion.await;
                            server.driver_finished(mount, result).await;
                        });
                    }
                }
                Effect::RegisterStats => self.stats.register_mount(Arc::clone(&mount)),
                Effect::UnmountDriver => {
                    tracing::info!(mount_point = %mount.path(), "issuing unmount requested during start");
                    if let Err(e) = self.driver.unmount(mount.path()).await {
                        tracing::error!(mount_point = %mount.path(), error = %e, "deferred unmount failed");
                        mount.unmount_failed(Arc::new(e));
                    }
                }
                other => {
                    tracing::warn!(mount_point = %mount.path(), effect = ?other, "unexpected effect")
                }
            }
        }
    }

    async fn driver_finished(&self, mount: Arc<Mount>, result: Result<(), DriverError>) {
        match &result {
            Ok(()) => tracing::debug!(mount_point = %mount.path(), "driver stopped serving"),
            Err(e) => tracing::error!(mount_point = %mount.path(), error = %e, "driver stopped with error"),
        }
        match mount.apply(MountEvent::DriverExited) {
            Ok(effects) if effects.contains(&Effect::Teardown) => self.teardown(&mount).await,
            Ok(_) => {}
            Err(e) => tracing::warn!(mount_point = %mount.path(), error = %e, "ignoring driver exit"),
        }
    }

    /// Runs once per mount, for whichever stop trigger got the teardown effect.
    async fn teardown(&self, mount: &Arc<Mount>) {
        let path = mount.path();
        self.stats.unregister_mount(path);
        mount.object_store().shutdown().await;
        let pruned = self.stores.prune();
        if pruned > 0 {
            tracing::debug!(mount_point = %path, pruned, "released unused backing stores");
        }
        self.stats.add(stats::MOUNTS_STOPPED, 1);
        if let Err(e) = mount.apply(MountEvent::TeardownComplete) {
            tracing::warn!(mount_point = %path, error = %e, "unexpected teardown state");
        }
        if self.registry.unregister(path).is_err() {
            mount.completion().fulfill();
        }
        tracing::info!(mount_point = %path, "mount point \"{}\" stopped", path);
    }

    /// Unmount `mount_point` and wait until it is fully torn down.
    pub async fn unmount(&self, mount_point: &str) -> Result<(), ServerError> {
        let path = MountPath::new(mount_point)?;
        self.unmount_path(&path).await
    }

    async fn unmount_path(&self, path: &MountPath) -> Result<(), ServerError> {
        let mount = self.registry.get(path)?;
        let waiter = mount.completion().waiter();
        tracing::info!(mount_point = %path, "unmount requested");

        let (effects, mut failures) = match mount.request_unmount() {
            Ok(requested) => requested,
            // Torn down between the lookup and the request.
            Err(_) if mount.completion().is_fulfilled() || mount.stage() == MountStage::Done =>
            {
                waiter.wait().await;
                return Ok(());
            }
            Err(source) => {
                return Err(ServerError::Lifecycle {
                    path: path.clone(),
                    source,
                })
            }
        };

        if effects.contains(&Effect::UnmountDriver) {
            if let Err(e) = self.driver.unmount(path).await {
                let source = Arc::new(e);
                if mount.unmount_failed(Arc::clone(&source)) {
                    return Err(ServerError::Unmount {
                        path: path.clone(),
                        source,
                    });
                }
                tracing::warn!(mount_point = %path, error = %source, "unmount failed while the mount was already stopping");
            }
        }

        // Requests that were deferred or coalesced into another attempt
        // learn its outcome here.
        tokio::select! {
            biased;
            _ = waiter.wait() => Ok(()),
            Some(source) = next_unmount_failure(&mut failures) => Err(ServerError::Unmount {
                path: path.clone(),
                source,
            }),
        }
    }

    /// Unmount everything, waiting for every mount before reporting the
    /// first failure.
    pub async fn unmount_all(&self) -> Result<(), ServerError> {
        let mounts = self.registry.list_active();
        let results = join_all(mounts.iter().map(|mount| self.unmount_path(mount.path()))).await;

        let mut failures: Vec<ServerError> = results
            .into_iter()
            .filter_map(Result::err)
            .filter(|e| !e.is_not_mounted())
            .collect();
        if failures.is_empty() {
            return Ok(());
        }
        for failure in &failures {
            tracing::error!(error = %failure, "unmount failed");
        }
        Err(ServerError::UnmountAll {
            failed: failures.len(),
            first: Box::new(failures.remove(0)),
        })
    }

    pub fn get_mount_points(&self) -> Vec<Arc<Mount>> {
        self.registry.list_active()
    }

    pub fn get_mount(&self, mount_point: &str) -> Result<Arc<Mount>, ServerError> {
        let path = MountPath::new(mount_point)?;
        Ok(self.registry.get(&path)?)
    }

    pub fn get_mount_or_null(&self, mount_point: &str) -> Option<Arc<Mount>> {
        let path = MountPath::new(mount_point).ok()?;
        self.registry.get_or_null(&path)
    }

    /// Mount everything listed in the client directory map. Returns the
    /// number of mounts that came up.
    pub async fn remount_all(self: &Arc<Self>) -> usize {
        let map_path = self.config.directory_map_path();
        let load_path = map_path.clone();
        let map = match tokio::task::spawn_blocking(move || ClientDirectoryMap::load(&load_path)).await
        {
            Ok(Ok(map)) => map,
            Ok(Err(e)) => {
                tracing::error!(path = %map_path.display(), error = %e, "skipping remount");
                return 0;
            }
            Err(e) => {
                tracing::error!(error = %e, "skipping remount");
                return 0;
            }
        };

        let mut mounted = 0;
        for (path, client_dir) in map.client_dirs(&self.config.clients_dir()) {
            let info = MountInfo {
                mount_point: path.to_string(),
                client_dir,
            };
            match self.mount(info).await {
                Ok(_) => mounted += 1,
                Err(e) => tracing::error!(mount_point = %path, error = %e, "failed to remount"),
            }
        }
        tracing::info!(mounted, configured = map.len(), "remounted client directories");
        mounted
    }

    /// Evict idle inodes from every mount.
    pub fn unload_inodes(&self, age: Duration) -> usize {
        let now = Instant::now();
        let unloaded: usize = self
            .registry
            .list_active()
            .iter()
            .map(|mount| mount.inodes().unload_children_older_than(age, now))
            .sum();
        self.stats.add(stats::PERIODIC_UNLOAD_COUNTER, unloaded as i64);
        self.stats.add(stats::UNLOAD_PASSES, 1);
        if unloaded > 0 {
            tracing::info!(unloaded, "unloaded idle inodes");
        }
        unloaded
    }

    pub fn flush_stats(&self) {
        self.stats.flush();
    }

    /// Stop accepting requests. Idempotent.
    pub fn stop(&self) {
        if !self.stop_tx.send_replace(true) {
            tracing::info!("stop requested");
        }
    }

    pub fn stop_signal(&self) -> watch::Receiver<bool> {
        self.stop_tx.subscribe()
    }

    pub fn is_stopping(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Drive every active mount through unmount.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        tracing::info!(mounts = self.registry.len(), "shutting down mounts");
        self.unmount_all().await
    }
}
