//! In-process filesystem driver and fixtures shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use common::mount_path::MountPath;
use futures::FutureExt;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::{oneshot, Notify};

use arbor_daemon::fuse::{DriverCompletion, DriverContext, DriverError, FsDriver};
use arbor_daemon::{Mount, MountInfo, ServiceConfig};

/// Serves nothing; tracks which mounts it was asked to serve and lets tests
/// fail or hold starts and unmounts, or end sessions.
#[derive(Default)]
pub struct FakeDriver {
    sessions: Mutex<HashMap<MountPath, oneshot::Sender<Result<(), DriverError>>>>,
    fail_start: Mutex<HashSet<MountPath>>,
    fail_unmount: Mutex<HashSet<MountPath>>,
    gate: Mutex<Option<Arc<Notify>>>,
    pub entered: Notify,
    unmount_gate: Mutex<Option<Arc<Notify>>>,
    pub unmount_entered: Notify,
    started: Mutex<Vec<MountPath>>,
    unmounted: Mutex<Vec<MountPath>>,
}

impl FakeDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_start(&self, path: &str) {
        self.fail_start.lock().insert(MountPath::new(path).unwrap());
    }

    pub fn fail_unmount(&self, path: &str, fail: bool) {
        let path = MountPath::new(path).unwrap();
        let mut set = self.fail_unmount.lock();
        if fail {
            set.insert(path);
        } else {
            set.remove(&path);
        }
    }

    /// Hold every following `start_serving` until the returned notify fires.
    pub fn hold_starts(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    /// Hold the next `unmount` until the returned notify fires.
    pub fn hold_next_unmount(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.unmount_gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    /// End the session for `path` as if the kernel detached it.
    pub fn end_session(&self, path: &str) -> bool {
        let path = MountPath::new(path).unwrap();
        match self.sessions.lock().remove(&path) {
            Some(tx) => tx.send(Ok(())).is_ok(),
            None => false,
        }
    }

    pub fn serving(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn started(&self) -> Vec<MountPath> {
        self.started.lock().clone()
    }

    pub fn unmounted(&self) -> Vec<MountPath> {
        self.unmounted.lock().clone()
    }
}

#[async_trait]
impl FsDriver for FakeDriver {
    async fn start_serving(
        &self,
        mount: Arc<Mount>,
        _ctx: DriverContext,
    ) -> Result<DriverCompletion, DriverError> {
        let path = mount.path().clone();
        self.entered.notify_one();

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.fail_start.lock().contains(&path) {
            return Err(DriverError::Mount {
                path,
                source: std::io::Error::other("mount refused"),
            });
        }

        let (tx, rx) = oneshot::channel();
        self.sessions.lock().insert(path.clone(), tx);
        self.started.lock().push(path);
        Ok(rx
            .map(|result| result.unwrap_or(Ok(())))
            .boxed())
    }

    async fn unmount(&self, path: &MountPath) -> Result<(), DriverError> {
        self.unmount_entered.notify_one();
        let gate = self.unmount_gate.lock().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.fail_unmount.lock().contains(path) {
            return Err(DriverError::Unmount {
                path: path.clone(),
                source: std::io::Error::other("device busy"),
            });
        }
        let tx = self
            .sessions
            .lock()
            .remove(path)
            .ok_or_else(|| DriverError::NotServing(path.clone()))?;
        self.unmounted.lock().push(path.clone());
        let _ = tx.send(Ok(()));
        Ok(())
    }
}

/// A data directory laid out for one daemon.
pub struct Fixture {
    pub dir: TempDir,
    pub config: ServiceConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = ServiceConfig::new(dir.path().join("data"));
        config.etc_dir = dir.path().join("etc");
        config.user_config_path = dir.path().join("arborrc");
        config.num_worker_threads = 2;
        config.log_to_file = false;
        Self { dir, config }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// A client directory whose config.toml names `repo_type` and `origin`.
    pub fn client_dir(&self, name: &str, repo_type: &str, origin: &str) -> PathBuf {
        let dir = self.dir.path().join("clients").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("config.toml"),
            format!(
                "[repository]\ntype = \"{}\"\npath = \"{}\"\n",
                repo_type, origin
            ),
        )
        .unwrap();
        dir
    }

    /// A working copy checkout of `kind` ("git" or "hg") with one file.
    pub fn checkout(&self, name: &str, kind: &str) -> PathBuf {
        let root = self.dir.path().join(name);
        std::fs::create_dir_all(root.join(format!(".{}", kind))).unwrap();
        std::fs::write(root.join("README"), b"hello\n").unwrap();
        root
    }

    pub fn mount_info(&self, mount_point: &str, client_dir: PathBuf) -> MountInfo {
        MountInfo {
            mount_point: mount_point.to_string(),
            client_dir,
        }
    }
}
