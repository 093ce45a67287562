//! The `fuser::Filesystem` dispatcher.
//!
//! Every callback here does the same three things: resolve the kernel's
//! inode to a path via the inode bridge (§4.6), hand the path to the
//! `CacheManager` on the private Tokio runtime, and translate the result
//! back into a `fuser` reply. No coherence decisions are made in this
//! module — that is entirely the cache manager's job.

mod inode;

use std::ffi::OsStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, ReplyWrite, Request, TimeOrNow,
};

use remote_fs_common::error::FsError;
use remote_fs_common::wire::{EntryKind, FileStat, TimespecPair};

use crate::cache::CacheManager;
use inode::{InodeTable, ROOT_INODE};

fn errno_of(err: &FsError) -> i32 {
    -err.to_errno()
}

fn stat_to_attr(ino: u64, stat: &FileStat, uid: u32, gid: u32) -> FileAttr {
    let kind = match stat.kind {
        EntryKind::File => FileType::RegularFile,
        EntryKind::Directory => FileType::Directory,
    };
    FileAttr {
        ino,
        size: stat.size,
        blocks: stat.size.div_ceil(512),
        atime: stat.atime(),
        mtime: stat.mtime(),
        ctime: stat.mtime(),
        crtime: stat.mtime(),
        kind,
        perm: stat.perm,
        nlink: 1,
        uid,
        gid,
        rdev: 0,
        blksize: 512,
        flags: 0,
    }
}

fn root_attr(uid: u32, gid: u32) -> FileAttr {
    FileAttr {
        ino: ROOT_INODE,
        size: 0,
        blocks: 0,
        atime: SystemTime::UNIX_EPOCH,
        mtime: SystemTime::UNIX_EPOCH,
        ctime: SystemTime::UNIX_EPOCH,
        crtime: SystemTime::UNIX_EPOCH,
        kind: FileType::Directory,
        perm: 0o755,
        nlink: 2,
        uid,
        gid,
        rdev: 0,
        blksize: 512,
        flags: 0,
    }
}

fn resolve_times(existing: &FileStat, atime: Option<TimeOrNow>, mtime: Option<TimeOrNow>) -> TimespecPair {
    let a = match atime {
        Some(TimeOrNow::SpecificTime(t)) => t,
        Some(TimeOrNow::Now) => SystemTime::now(),
        None => existing.atime(),
    };
    let m = match mtime {
        Some(TimeOrNow::SpecificTime(t)) => t,
        Some(TimeOrNow::Now) => SystemTime::now(),
        None => existing.mtime(),
    };
    TimespecPair::from_systemtimes(a, m)
}

pub struct RemoteFs {
    manager: Arc<CacheManager>,
    runtime: Arc<tokio::runtime::Runtime>,
    inodes: Mutex<InodeTable>,
    attr_ttl: Duration,
    entry_ttl: Duration,
}

impl RemoteFs {
    pub fn new(
        manager: Arc<CacheManager>,
        runtime: Arc<tokio::runtime::Runtime>,
        attr_ttl: Duration,
        entry_ttl: Duration,
    ) -> Self {
        RemoteFs { manager, runtime, inodes: Mutex::new(InodeTable::new()), attr_ttl, entry_ttl }
    }

    fn path_for(&self, ino: u64) -> Option<String> {
        self.inodes.lock().unwrap().path_of(ino)
    }

    fn ensure_ino(&self, path: String) -> u64 {
        self.inodes.lock().unwrap().ensure(path)
    }
}

impl Filesystem for RemoteFs {
    fn lookup(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };
        let path = {
            let inodes = self.inodes.lock().unwrap();
            inodes.compose_child(parent, name)
        };
        let Some(path) = path else {
            reply.error(libc::ENOENT);
            return;
        };

        match self.runtime.block_on(self.manager.getattr(&path)) {
            Ok(stat) => {
                let ino = self.ensure_ino(path);
                reply.entry(&self.entry_ttl, &stat_to_attr(ino, &stat, req.uid(), req.gid()), 0);
            }
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn getattr(&mut self, req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        if ino == ROOT_INODE {
            reply.attr(&self.attr_ttl, &root_attr(req.uid(), req.gid()));
            return;
        }
        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.runtime.block_on(self.manager.getattr(&path)) {
            Ok(stat) => reply.attr(&self.attr_ttl, &stat_to_attr(ino, &stat, req.uid(), req.gid())),
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        if let Some(size) = size {
            if let Err(e) = self.runtime.block_on(self.manager.truncate(&path, size as i64)) {
                reply.error(errno_of(&e));
                return;
            }
        }

        if atime.is_some() || mtime.is_some() {
            let existing = match self.runtime.block_on(self.manager.getattr(&path)) {
                Ok(stat) => stat,
                Err(e) => {
                    reply.error(errno_of(&e));
                    return;
                }
            };
            let times = resolve_times(&existing, atime, mtime);
            if let Err(e) = self.runtime.block_on(self.manager.utimens(&path, times)) {
                reply.error(errno_of(&e));
                return;
            }
        }

        match self.runtime.block_on(self.manager.getattr(&path)) {
            Ok(stat) => reply.attr(&self.attr_ttl, &stat_to_attr(ino, &stat, req.uid(), req.gid())),
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn mknod(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        rdev: u32,
        reply: ReplyEntry,
    ) {
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };
        let path = {
            let inodes = self.inodes.lock().unwrap();
            inodes.compose_child(parent, name)
        };
        let Some(path) = path else {
            reply.error(libc::ENOENT);
            return;
        };

        if let Err(e) = self.runtime.block_on(self.manager.mknod(&path, mode, rdev as u64)) {
            reply.error(errno_of(&e));
            return;
        }
        match self.runtime.block_on(self.manager.getattr(&path)) {
            Ok(stat) => {
                let ino = self.ensure_ino(path);
                reply.entry(&self.entry_ttl, &stat_to_attr(ino, &stat, req.uid(), req.gid()), 0);
            }
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.runtime.block_on(self.manager.open(&path, flags)) {
            Ok(()) => reply.opened(ino, 0),
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.runtime.block_on(self.manager.release(&path)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    #[allow(clippy::too_many_arguments)]
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
        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.runtime.block_on(self.manager.read(&path, size, offset)) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.runtime.block_on(self.manager.write(&path, data, offset)) {
            Ok(n) => reply.written(n as u32),
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn fsync(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.runtime.block_on(self.manager.fsync(&path)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    /// Directory enumeration is a Non-goal: every directory reports only
    /// `.`/`..`, never the paths the inode bridge happens to know about.
    fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let entries = [(ino, FileType::Directory, "."), (ino, FileType::Directory, "..")];
        for (i, (ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
            if reply.add(ino, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }
}
