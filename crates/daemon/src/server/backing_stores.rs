//! Shared backing store instances keyed by (type, origin).
//!
//! The map lock is only held to find or create a key's slot. Construction
//! happens under the slot's async lock, so concurrent requests for one key
//! build a single instance while other keys proceed. Slots hold weak
//! references: a store lives as long as some mount's object store uses it.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use object_store::{BackingStore, BackingStoreFactory, BackingStoreKey, LocalStore, StoreError};
use parking_lot::Mutex;

type Slot = Arc<tokio::sync::Mutex<Option<Weak<dyn BackingStore>>>>;

pub struct BackingStoreCache {
    factory: Arc<dyn BackingStoreFactory>,
    local: Arc<LocalStore>,
    slots: Mutex<HashMap<BackingStoreKey, Slot>>,
}

impl std::fmt::Debug for BackingStoreCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackingStoreCache")
            .field("slots", &self.len())
            .finish_non_exhaustive()
    }
}

impl BackingStoreCache {
    pub fn new(factory: Arc<dyn BackingStoreFactory>, local: Arc<LocalStore>) -> Self {
        Self {
            factory,
            local,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn local_store(&self) -> &Arc<LocalStore> {
        &self.local
    }

    /// Existing live store for `key`, or a newly constructed one.
    pub async fn get(&self, key: &BackingStoreKey) -> Result<Arc<dyn BackingStore>, StoreError> {
        self.factory.check_type(&key.store_type)?;

        let slot = Arc::clone(self.slots.lock().entry(key.clone()).or_default());
        let mut current = slot.lock().await;

        if let Some(store) = current.as_ref().and_then(Weak::upgrade) {
            return Ok(store);
        }

        match self.factory.construct(key, &self.local).await {
            Ok(store) => {
                *current = Some(Arc::downgrade(&store));
                Ok(store)
            }
            Err(e) => {
                drop(current);
                self.remove_if_unused(key, &slot);
                tracing::warn!(store = %key, error = %e, "failed to create backing store");
                Err(e)
            }
        }
    }

    /// Drop `slot` unless another caller is waiting on it or it still holds
    /// a live store.
    fn remove_if_unused(&self, key: &BackingStoreKey, slot: &Slot) {
        let mut slots = self.slots.lock();
        let Some(existing) = slots.get(key) else {
            return;
        };
        // One reference from the map and one from the caller.
        if !Arc::ptr_eq(existing, slot) || Arc::strong_count(slot) != 2 {
            return;
        }
        if slot_is_dead(slot) {
            slots.remove(key);
        }
    }

    /// Number of keys whose store is still in use.
    pub fn live_count(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| {
                slot.try_lock()
                    .map(|current| current.as_ref().is_some_and(|w| w.strong_count() > 0))
                    .unwrap_or(false)
            })
            .count()
    }

    /// Forget slots whose store has been dropped.
    pub fn prune(&self) -> usize {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|_, slot| Arc::strong_count(slot) > 1 || !slot_is_dead(slot));
        before - slots.len()
    }

    /// Number of slots, live or not.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn slot_is_dead(slot: &Slot) -> bool {
    slot.try_lock()
        .map(|current| current.as_ref().and_then(Weak::upgrade).is_none())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use object_store::{EmptyBackingStore, LocalStoreConfig};
    use tempfile::TempDir;

    #[derive(Default)]
    struct CountingFactory {
        constructed: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl BackingStoreFactory for CountingFactory {
        async fn construct(
            &self,
            key: &BackingStoreKey,
            _local: &Arc<LocalStore>,
        ) -> Result<Arc<dyn BackingStore>, StoreError> {
            self.constructed.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail {
                return Err(StoreError::NotARepository {
                    path: key.origin.clone().into(),
                    kind: object_store::StoreKind::Hg,
                });
            }
            Ok(Arc::new(EmptyBackingStore::new(key.clone())))
        }
    }

    fn cache(factory: Arc<CountingFactory>) -> (TempDir, BackingStoreCache) {
        let dir = TempDir::new().unwrap();
        let local = Arc::new(LocalStore::open(LocalStoreConfig::new(dir.path())).unwrap());
        (dir, BackingStoreCache::new(factory, local))
    }

    fn same_store(a: &Arc<dyn BackingStore>, b: &Arc<dyn BackingStore>) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_gets_construct_once() {
        let factory = Arc::new(CountingFactory::default());
        let (_dir, cache) = cache(Arc::clone(&factory));
        let cache = Arc::new(cache);
        let key = BackingStoreKey::new("hg", "/repo");

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let key = key.clone();
                tokio::spawn(async move { cache.get(&key).await.unwrap() })
            })
            .collect();
        let stores: Vec<_> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert_eq!(factory.constructed.load(Ordering::SeqCst), 1);
        assert!(stores.iter().all(|s| same_store(s, &stores[0])));
        assert_eq!(cache.live_count(), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_get_distinct_stores() {
        let factory = Arc::new(CountingFactory::default());
        let (_dir, cache) = cache(Arc::clone(&factory));

        let a = cache.get(&BackingStoreKey::new("hg", "/a")).await.unwrap();
        let b = cache.get(&BackingStoreKey::new("git", "/a")).await.unwrap();
        assert!(!same_store(&a, &b));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_unsupported_type_leaves_no_slot() {
        let factory = Arc::new(CountingFactory::default());
        let (_dir, cache) = cache(Arc::clone(&factory));

        let err = cache
            .get(&BackingStoreKey::new("foo", "/repo"))
            .await
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("foo"));
        assert!(cache.is_empty());
        assert_eq!(factory.constructed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_construction_leaves_no_slot() {
        let factory = Arc::new(CountingFactory {
            fail: true,
            ..Default::default()
        });
        let (_dir, cache) = cache(Arc::clone(&factory));

        assert!(cache.get(&BackingStoreKey::new("hg", "/repo")).await.is_err());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_store_lives_while_referenced() {
        let factory = Arc::new(CountingFactory::default());
        let (_dir, cache) = cache(Arc::clone(&factory));
        let key = BackingStoreKey::new("hg", "/repo");

        let first = cache.get(&key).await.unwrap();
        let second = cache.get(&key).await.unwrap();
        drop(first);
        let third = cache.get(&key).await.unwrap();
        assert!(same_store(&second, &third));
        assert_eq!(factory.constructed.load(Ordering::SeqCst), 1);

        drop(second);
        drop(third);
        assert_eq!(cache.live_count(), 0);
        assert_eq!(cache.prune(), 1);
        assert!(cache.is_empty());

        let _again = cache.get(&key).await.unwrap();
        assert_eq!(factory.constructed.load(Ordering::SeqCst), 2);
    }
}
