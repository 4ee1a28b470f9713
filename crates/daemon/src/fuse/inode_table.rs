//! In-memory inode table for a mount.
//!
//! Every filesystem entry the kernel or a request has touched is loaded as an
//! inode with its parent link, object id and bookkeeping used for eviction:
//! the kernel lookup count, the number of in-flight requests pinning it and
//! the time it was last accessed.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use object_store::{EntryKind, ObjectId, TreeEntry};
use parking_lot::Mutex;

/// Copy of an inode's attributes, detached from the table lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InodeSnapshot {
    pub ino: u64,
    pub parent: u64,
    pub name: String,
    pub kind: EntryKind,
    pub object_id: ObjectId,
    pub size: u64,
}

#[derive(Debug)]
struct Inode {
    parent: u64,
    name: String,
    kind: EntryKind,
    object_id: ObjectId,
    size: u64,
    last_access: Instant,
    /// Outstanding kernel references (lookup minus forget).
    lookups: u64,
    /// In-flight requests currently using this inode.
    pins: u32,
    children: BTreeMap<String, u64>,
}

impl Inode {
    fn snapshot(&self, ino: u64) -> InodeSnapshot {
        InodeSnapshot {
            ino,
            parent: self.parent,
            name: self.name.clone(),
            kind: self.kind,
            object_id: self.object_id.clone(),
            size: self.size,
        }
    }
}

#[derive(Debug)]
struct Inner {
    inodes: HashMap<u64, Inode>,
    /// Next available inode number (starts at 2, as 1 is reserved for root)
    next_inode: u64,
}

impl Inner {
    fn evictable(&self, ino: u64, age: Duration, now: Instant) -> bool {
        self.inodes.get(&ino).is_some_and(|inode| {
            inode.children.is_empty()
                && inode.lookups == 0
                && inode.pins == 0
                && now.saturating_duration_since(inode.last_access) >= age
        })
    }

    /// Post-order walk so a directory emptied during this pass is itself
    /// considered.
    fn unload_under(&mut self, ino: u64, age: Duration, now: Instant) -> usize {
        let children: Vec<(String, u64)> = match self.inodes.get(&ino) {
            Some(inode) => inode
                .children
                .iter()
                .map(|(name, child)| (name.clone(), *child))
                .collect(),
            None => return 0,
        };

        let mut unloaded = 0;
        for (name, child) in children {
            unloaded += self.unload_under(child, age, now);
            if self.evictable(child, age, now) {
                self.inodes.remove(&child);
                if let Some(parent) = self.inodes.get_mut(&ino) {
                    parent.children.remove(&name);
                }
                unloaded += 1;
            }
        }
        unloaded
    }
}

#[derive(Debug)]
pub struct InodeTable {
    inner: Mutex<Inner>,
}

impl InodeTable {
    /// Root inode number (always 1 in FUSE)
    pub const ROOT_INODE: u64 = 1;

    /// Create a new inode table with the root tree pre-registered.
    pub fn new(root_id: ObjectId) -> Self {
        let root = Inode {
            parent: Self::ROOT_INODE,
            name: String::new(),
            kind: EntryKind::Directory,
            object_id: root_id,
            size: 0,
            last_access: Instant::now(),
            lookups: 0,
            pins: 0,
            children: BTreeMap::new(),
        };

        Self {
            inner: Mutex::new(Inner {
                inodes: HashMap::from([(Self::ROOT_INODE, root)]),
                next_inode: 2,
            }),
        }
    }

    pub fn get(&self, ino: u64) -> Option<InodeSnapshot> {
        let mut inner = self.inner.lock();
        let inode = inner.inodes.get_mut(&ino)?;
        inode.last_access = Instant::now();
        Some(inode.snapshot(ino))
    }

    /// Loaded child of `parent` named `name`, if any.
    pub fn child(&self, parent: u64, name: &str) -> Option<InodeSnapshot> {
        let mut inner = self.inner.lock();
        let ino = *inner.inodes.get(&parent)?.children.get(name)?;
        let inode = inner.inodes.get_mut(&ino)?;
        inode.last_access = Instant::now();
        Some(inode.snapshot(ino))
    }

    /// Get or load the child described by `entry`. Returns `None` when the
    /// parent is not loaded.
    pub fn insert_child(&self, parent: u64, entry: &TreeEntry) -> Option<InodeSnapshot> {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        if let Some(&ino) = inner.inodes.get(&parent)?.children.get(&entry.name) {
            if let Some(inode) = inner.inodes.get_mut(&ino) {
                // The checkout may have changed since the inode was loaded.
                inode.object_id = entry.id.clone();
                inode.size = entry.size;
                inode.last_access = now;
                return Some(inode.snapshot(ino));
            }
        }

        let ino = inner.next_inode;
        inner.next_inode += 1;
        let inode = Inode {
            parent,
            name: entry.name.clone(),
            kind: entry.kind,
            object_id: entry.id.clone(),
            size: entry.size,
            last_access: now,
            lookups: 0,
            pins: 0,
            children: BTreeMap::new(),
        };
        let snapshot = inode.snapshot(ino);
        inner.inodes.insert(ino, inode);
        if let Some(parent) = inner.inodes.get_mut(&parent) {
            parent.children.insert(entry.name.clone(), ino);
        }
        Some(snapshot)
    }

    /// Record a kernel lookup reference.
    pub fn remember(&self, ino: u64) {
        if let Some(inode) = self.inner.lock().inodes.get_mut(&ino) {
            inode.lookups += 1;
            inode.last_access = Instant::now();
        }
    }

    /// Drop `nlookup` kernel references.
    pub fn forget(&self, ino: u64, nlookup: u64) {
        if let Some(inode) = self.inner.lock().inodes.get_mut(&ino) {
            inode.lookups = inode.lookups.saturating_sub(nlookup);
        }
    }

    /// Keep `ino` loaded until the returned guard is dropped.
    pub fn pin(self: &Arc<Self>, ino: u64) -> Option<InodeGuard> {
        let mut inner = self.inner.lock();
        let inode = inner.inodes.get_mut(&ino)?;
        inode.pins += 1;
        inode.last_access = Instant::now();
        Some(InodeGuard {
            table: Arc::clone(self),
            ino,
        })
    }

    fn unpin(&self, ino: u64) {
        if let Some(inode) = self.inner.lock().inodes.get_mut(&ino) {
            inode.pins = inode.pins.saturating_sub(1);
        }
    }

    /// Evict loaded leaves with no kernel references and no in-flight
    /// requests that have not been accessed for at least `age`. The root is
    /// never evicted. Returns the number of inodes unloaded.
    pub fn unload_children_older_than(&self, age: Duration, now: Instant) -> usize {
        self.inner.lock().unload_under(Self::ROOT_INODE, age, now)
    }

    /// Number of loaded inodes, root included.
    pub fn len(&self) -> usize {
        self.inner.lock().inodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Pin on an inode held for the duration of a request.
#[derive(Debug)]
pub struct InodeGuard {
    table: Arc<InodeTable>,
    ino: u64,
}

impl InodeGuard {
    pub fn ino(&self) -> u64 {
        self.ino
    }
}

impl Drop for InodeGuard {
    fn drop(&mut self) {
        self.table.unpin(self.ino);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    fn entry(name: &str, kind: EntryKind) -> TreeEntry {
        TreeEntry {
            name: name.to_string(),
            kind,
            id: ObjectId::new(format!("id-{name}")),
            size: 3,
        }
    }

    fn table() -> Arc<InodeTable> {
        Arc::new(InodeTable::new(ObjectId::new("root")))
    }

    #[test]
    fn test_root_inode() {
        let table = table();
        let root = table.get(InodeTable::ROOT_INODE).unwrap();
        assert_eq!(root.kind, EntryKind::Directory);
        assert_eq!(root.object_id, ObjectId::new("root"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_insert_child_is_idempotent() {
        let table = table();
        let a = table
            .insert_child(InodeTable::ROOT_INODE, &entry("a", EntryKind::File))
            .unwrap();
        let again = table
            .insert_child(InodeTable::ROOT_INODE, &entry("a", EntryKind::File))
            .unwrap();
        let b = table
            .insert_child(InodeTable::ROOT_INODE, &entry("b", EntryKind::File))
            .unwrap();

        assert_eq!(a.ino, again.ino);
        assert_ne!(a.ino, b.ino);
        assert_ne!(a.ino, InodeTable::ROOT_INODE);
        assert_eq!(table.child(InodeTable::ROOT_INODE, "b").unwrap().ino, b.ino);
        assert!(table.insert_child(999, &entry("x", EntryKind::File)).is_none());
    }

    #[test]
    fn test_unload_respects_age_threshold() {
        let table = table();
        table.insert_child(InodeTable::ROOT_INODE, &entry("a", EntryKind::File));

        let now = Instant::now();
        assert_eq!(table.unload_children_older_than(HOUR, now), 0);
        assert_eq!(table.len(), 2);

        assert_eq!(table.unload_children_older_than(HOUR, now + 2 * HOUR), 1);
        assert_eq!(table.len(), 1);
        assert!(table.child(InodeTable::ROOT_INODE, "a").is_none());
    }

    #[test]
    fn test_unload_skips_referenced_and_pinned() {
        let table = table();
        let referenced = table
            .insert_child(InodeTable::ROOT_INODE, &entry("referenced", EntryKind::File))
            .unwrap();
        let pinned = table
            .insert_child(InodeTable::ROOT_INODE, &entry("pinned", EntryKind::File))
            .unwrap();
        table.insert_child(InodeTable::ROOT_INODE, &entry("idle", EntryKind::File));

        table.remember(referenced.ino);
        let guard = table.pin(pinned.ino).unwrap();

        let later = Instant::now() + 2 * HOUR;
        assert_eq!(table.unload_children_older_than(HOUR, later), 1);
        assert!(table.child(InodeTable::ROOT_INODE, "referenced").is_some());
        assert!(table.child(InodeTable::ROOT_INODE, "pinned").is_some());

        drop(guard);
        table.forget(referenced.ino, 1);
        let even_later = Instant::now() + 4 * HOUR;
        assert_eq!(table.unload_children_older_than(HOUR, even_later), 2);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_unload_only_evicts_leaves() {
        let table = table();
        let dir = table
            .insert_child(InodeTable::ROOT_INODE, &entry("dir", EntryKind::Directory))
            .unwrap();
        let kept = table.insert_child(dir.ino, &entry("kept", EntryKind::File)).unwrap();
        table.insert_child(dir.ino, &entry("idle", EntryKind::File));
        table.remember(kept.ino);

        let later = Instant::now() + 2 * HOUR;
        assert_eq!(table.unload_children_older_than(HOUR, later), 1);
        // Still has a referenced child.
        assert!(table.child(InodeTable::ROOT_INODE, "dir").is_some());

        table.forget(kept.ino, 1);
        // The emptied directory goes in the same pass as its last child.
        assert_eq!(table.unload_children_older_than(HOUR, later), 2);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_root_never_unloaded() {
        let table = table();
        let far = Instant::now() + 1000 * HOUR;
        assert_eq!(table.unload_children_older_than(Duration::ZERO, far), 0);
        assert!(table.get(InodeTable::ROOT_INODE).is_some());
    }
}
