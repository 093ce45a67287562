//! Server-wide shared state: the persisted file tree, the open-handle
//! table, the write-owner gate and the per-path lock table.

use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::arbitrator::PathLockTable;

/// Maps opaque handles back to open file descriptors.
///
/// The original stashes the real fd directly in `fi->fh`, which crosses an
/// RPC boundary that is really just a function call in the same process
/// tree. Over an HTTP/bincode boundary the fd itself cannot travel, so this
/// table hands out a `u64` key instead and keeps the real `File` server-side.
pub struct OpenHandleTable {
    next: AtomicU64,
    open: Mutex<std::collections::HashMap<u64, File>>,
}

impl OpenHandleTable {
    pub fn new() -> Self {
        OpenHandleTable {
            next: AtomicU64::new(1),
            open: Mutex::new(std::collections::HashMap::new()),
        }
    }

    pub fn insert(&self, file: File) -> u64 {
        let handle = self.next.fetch_add(1, Ordering::Relaxed);
        self.open.lock().unwrap().insert(handle, file);
        handle
    }

    pub fn with_file<T>(&self, handle: u64, f: impl FnOnce(&File) -> T) -> Option<T> {
        self.open.lock().unwrap().get(&handle).map(f)
    }

    pub fn remove(&self, handle: u64) -> Option<File> {
        self.open.lock().unwrap().remove(&handle)
    }
}

/// Tracks which paths currently have a writer open, gating concurrent
/// write-mode opens the way the original's `fileUtil.serverFilePresent`
/// check does for `watdfs_open`.
pub struct WriteOwnerSet {
    owners: Mutex<HashSet<String>>,
}

impl WriteOwnerSet {
    pub fn new() -> Self {
        WriteOwnerSet { owners: Mutex::new(HashSet::new()) }
    }

    pub fn try_claim(&self, path: &str) -> bool {
        self.owners.lock().unwrap().insert(path.to_string())
    }

    pub fn release(&self, path: &str) {
        self.owners.lock().unwrap().remove(path);
    }
}

pub struct ServerState {
    pub persist_dir: PathBuf,
    pub handles: OpenHandleTable,
    pub write_owners: WriteOwnerSet,
    pub locks: PathLockTable,
}

impl ServerState {
    pub fn new(persist_dir: PathBuf) -> Self {
        ServerState {
            persist_dir,
            handles: OpenHandleTable::new(),
            write_owners: WriteOwnerSet::new(),
            locks: PathLockTable::new(),
        }
    }

    /// Resolves a client-relative path against the persist directory, the
    /// way the original's `FileUtil::getAbsolutePath` does.
    pub fn resolve(&self, short_path: &str) -> PathBuf {
        let trimmed = short_path.trim_start_matches('/');
        self.persist_dir.join(trimmed)
    }

    pub fn resolve_ref<'a>(&self, short_path: &'a str) -> (PathBuf, &'a str) {
        (self.resolve(short_path), short_path)
    }
}

pub fn ensure_persist_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}
