//! Read-only FUSE filesystem over a mount's inode table.
//!
//! Kernel callbacks arrive on the session thread. Anything that may touch
//! the object store is handed to the worker pool with the inode pinned, so
//! unloading never drops an inode a request is still using.

use std::ffi::OsStr;
use std::os::raw::c_int;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyData, ReplyDirectory,
    ReplyEntry, ReplyOpen, Request,
};
use object_store::{EntryKind, StoreError};
use tokio::runtime::Handle;
use tracing::debug;

use super::{InodeSnapshot, InodeTable};
use crate::server::{Mount, RequestKind};

const TTL: Duration = Duration::from_secs(1);
const BLOCK_SIZE: u32 = 4096;

pub struct ArborFs {
    mount: Arc<Mount>,
    workers: Handle,
    uid: u32,
    gid: u32,
    mounted_at: SystemTime,
}

impl ArborFs {
    pub fn new(mount: Arc<Mount>, workers: Handle) -> Self {
        // SAFETY: getuid and getgid have no preconditions and cannot fail.
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        Self {
            mount,
            workers,
            uid,
            gid,
            mounted_at: SystemTime::now(),
        }
    }

    fn attr(&self, inode: &InodeSnapshot) -> FileAttr {
        file_attr(inode, self.uid, self.gid, self.mounted_at)
    }
}

fn file_type(kind: EntryKind) -> FileType {
    match kind {
        EntryKind::File => FileType::RegularFile,
        EntryKind::Directory => FileType::Directory,
    }
}

fn file_attr(inode: &InodeSnapshot, uid: u32, gid: u32, time: SystemTime) -> FileAttr {
    let (perm, nlink) = match inode.kind {
        EntryKind::Directory => (0o555, 2),
        EntryKind::File => (0o444, 1),
    };
    FileAttr {
        ino: inode.ino,
        size: inode.size,
        blocks: inode.size.div_ceil(512),
        atime: time,
        mtime: time,
        ctime: time,
        crtime: time,
        kind: file_type(inode.kind),
        perm,
        nlink,
        uid,
        gid,
        rdev: 0,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}

fn errno(e: &StoreError) -> c_int {
    match e {
        StoreError::NotFound(_) => libc::ENOENT,
        StoreError::WrongKind(_, "tree") => libc::ENOTDIR,
        StoreError::WrongKind(_, _) => libc::EISDIR,
        _ => libc::EIO,
    }
}

/// `.` and `..` followed by the directory's children, as readdir reports them.
fn dir_entries(dir: &InodeSnapshot, children: Vec<InodeSnapshot>) -> Vec<(u64, FileType, String)> {
    let mut entries = Vec::with_capacity(children.len() + 2);
    entries.push((dir.ino, FileType::Directory, ".".to_string()));
    entries.push((dir.parent, FileType::Directory, "..".to_string()));
    entries.extend(
        children
            .into_iter()
            .map(|child| (child.ino, file_type(child.kind), child.name)),
    );
    entries
}

impl Filesystem for ArborFs {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        tracing::info!(mount_point = %self.mount.path(), "filesystem session initialized");
        Ok(())
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name.to_str().map(str::to_string) else {
            reply.error(libc::ENOENT);
            return;
        };
        debug!(parent, name = %name, "lookup");
        self.mount.counters().record(RequestKind::Lookup);

        let Some(pin) = self.mount.inodes().pin(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let mount = Arc::clone(&self.mount);
        let (uid, gid, time) = (self.uid, self.gid, self.mounted_at);
        self.workers.spawn(async move {
            let _pin = pin;
            match mount.lookup_child(parent, &name).await {
                Ok(Some(child)) => {
                    mount.inodes().remember(child.ino);
                    reply.entry(&TTL, &file_attr(&child, uid, gid, time), 0);
                }
                Ok(None) => reply.error(libc::ENOENT),
                Err(e) => {
                    debug!(parent, name = %name, error = %e, "lookup failed");
                    reply.error(errno(&e));
                }
            }
        });
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        self.mount.inodes().forget(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.mount.inodes().get(ino) {
            Some(inode) => reply.attr(&TTL, &self.attr(&inode)),
            None => reply.error(libc::ENOENT),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        if flags & libc::O_ACCMODE != libc::O_RDONLY {
            reply.error(libc::EROFS);
            return;
        }
        match self.mount.inodes().get(ino) {
            Some(inode) if inode.kind == EntryKind::File => reply.opened(0, 0),
            Some(_) => reply.error(libc::EISDIR),
            None => reply.error(libc::ENOENT),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        debug!(ino, offset, size, "read");
        self.mount.counters().record(RequestKind::Read);
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };
        let Some(pin) = self.mount.inodes().pin(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let mount = Arc::clone(&self.mount);
        self.workers.spawn(async move {
            let _pin = pin;
            match mount.read(ino, offset, size).await {
                Ok(Some(data)) => reply.data(&data),
                Ok(None) => reply.error(libc::ENOENT),
                Err(e) => {
                    debug!(ino, error = %e, "read failed");
                    reply.error(errno(&e));
                }
            }
        });
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        debug!(ino, offset, "readdir");
        self.mount.counters().record(RequestKind::Readdir);
        let Some(dir) = self.mount.inodes().get(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(pin) = self.mount.inodes().pin(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let mount = Arc::clone(&self.mount);
        self.workers.spawn(async move {
            let _pin = pin;
            let children = match mount.list_dir(ino).await {
                Ok(Some(children)) => children,
                Ok(None) => return reply.error(libc::ENOENT),
                Err(e) => return reply.error(errno(&e)),
            };
            let skip = usize::try_from(offset).unwrap_or(0);
            for (i, (child_ino, kind, name)) in
                dir_entries(&dir, children).into_iter().enumerate().skip(skip)
            {
                // Offset of the next entry; true means the buffer is full.
                if reply.add(child_ino, (i + 1) as i64, kind, name) {
                    break;
                }
            }
            reply.ok();
        });
    }
}

impl std::fmt::Debug for ArborFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArborFs")
            .field("mount_point", self.mount.path())
            .field("root", &InodeTable::ROOT_INODE)
            .finish_non_exhaustive()
    }
}
