//! Service counters.
//!
//! Mounts count their filesystem requests locally; the maintenance task
//! periodically folds those pending counts into the service-wide totals
//! served by the stats endpoint.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use common::mount_path::MountPath;
use parking_lot::{Mutex, RwLock};

use super::mount::Mount;

/// Inodes evicted by periodic unload passes since startup.
pub const PERIODIC_UNLOAD_COUNTER: &str = "arbor.periodic_unload_count";
pub const UNLOAD_PASSES: &str = "arbor.unload_passes";
pub const MOUNTS_STOPPED: &str = "arbor.mounts_stopped";
pub const STATS_FLUSHES: &str = "arbor.stats_flushes";
/// Gauge of inodes loaded across all mounts, refreshed on flush.
pub const INODES_LOADED: &str = "arbor.inodes_loaded";

#[derive(Debug, Default)]
pub struct ServiceStats {
    counters: RwLock<BTreeMap<String, i64>>,
    mounts: Mutex<HashMap<MountPath, Arc<Mount>>>,
}

impl ServiceStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_mount(&self, mount: Arc<Mount>) {
        self.mounts.lock().insert(mount.path().clone(), mount);
    }

    /// Folds the mount's outstanding counts into the totals before dropping it.
    pub fn unregister_mount(&self, path: &MountPath) {
        if let Some(mount) = self.mounts.lock().remove(path) {
            self.absorb(&mount);
        }
    }

    pub fn add(&self, name: &str, delta: i64) {
        *self.counters.write().entry(name.to_string()).or_insert(0) += delta;
    }

    pub fn set(&self, name: &str, value: i64) {
        self.counters.write().insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.counters.read().get(name).copied()
    }

    fn absorb(&self, mount: &Mount) {
        for (kind, count) in mount.counters().drain() {
            if count > 0 {
                self.add(&format!("arbor.fs.{kind}"), count as i64);
            }
        }
    }

    /// Drain every registered mount's pending request counts into the totals.
    pub fn flush(&self) {
        let mounts: Vec<_> = self.mounts.lock().values().cloned().collect();
        let mut loaded = 0;
        for mount in &mounts {
            self.absorb(mount);
            loaded += mount.inodes().len();
        }
        self.set(INODES_LOADED, loaded as i64);
        self.add(STATS_FLUSHES, 1);
    }

    pub fn snapshot(&self) -> BTreeMap<String, i64> {
        self.counters.read().clone()
    }
}
