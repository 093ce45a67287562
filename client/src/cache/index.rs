//! CacheIndex: the path-keyed map of open [`FileHandle`]s (SPEC_FULL.md §3).
//!
//! The mutex covers only the map operation itself, per §5's "Shared
//! resources" rule — no RPC or local file I/O ever runs while this lock is
//! held. Callers that need to touch the underlying `File` clone the file
//! descriptor out with [`std::fs::File::try_clone`] (cheap: it's a `dup`),
//! release the map lock, and do I/O on the clone. Because every read/write
//! on the cache file is positional (`FileExt::read_at`/`write_at`), multiple
//! live descriptors for the same file never race on a shared cursor.

use std::collections::HashMap;
use std::fs::File;
use std::sync::Mutex;
use std::time::SystemTime;

use remote_fs_common::error::FsError;
use remote_fs_common::wire::OpenRecord;

use super::handle::FileHandle;

/// A consistent snapshot of a [`FileHandle`] taken under the index mutex:
/// a duplicated file descriptor plus the scalar fields needed to decide
/// freshness and to drive the next RPC.
pub struct HandleSnapshot {
    pub local: File,
    pub record: OpenRecord,
    pub last_validated: SystemTime,
}

pub struct CacheIndex {
    map: Mutex<HashMap<String, FileHandle>>,
}

impl CacheIndex {
    pub fn new() -> Self {
        CacheIndex { map: Mutex::new(HashMap::new()) }
    }

    pub fn is_open(&self, path: &str) -> bool {
        self.map.lock().unwrap().contains_key(path)
    }

    /// Registers a new handle. Fails with [`FsError::ProtocolViolation`]
    /// (the spec's *already-open*) if the path already has one — §3's "at
    /// most one entry per path" invariant.
    pub fn insert(&self, path: String, handle: FileHandle) -> Result<(), FsError> {
        let mut map = self.map.lock().unwrap();
        if map.contains_key(&path) {
            return Err(FsError::ProtocolViolation(format!("{path} already open")));
        }
        map.insert(path, handle);
        Ok(())
    }

    pub fn remove(&self, path: &str) -> Option<FileHandle> {
        self.map.lock().unwrap().remove(path)
    }

    pub fn snapshot(&self, path: &str) -> std::io::Result<Option<HandleSnapshot>> {
        let map = self.map.lock().unwrap();
        match map.get(path) {
            Some(h) => Ok(Some(HandleSnapshot {
                local: h.local.try_clone()?,
                record: h.open_record(),
                last_validated: h.last_validated,
            })),
            None => Ok(None),
        }
    }

    pub fn wants_write(&self, path: &str) -> Option<bool> {
        self.map.lock().unwrap().get(path).map(|h| h.wants_write())
    }

    pub fn touch(&self, path: &str, at: SystemTime) {
        if let Some(h) = self.map.lock().unwrap().get_mut(path) {
            h.mark_validated(at);
        }
    }

    /// Swaps in a freshly-downloaded local cache file and marks the handle
    /// validated at `at`, used after [`super::manager::CacheManager`]'s
    /// download step rewrites the cache file.
    pub fn replace_local(&self, path: &str, file: File, at: SystemTime) {
        if let Some(h) = self.map.lock().unwrap().get_mut(path) {
            h.local = file;
            h.mark_validated(at);
        }
    }

    pub fn len(&self) -> usize {
        self.map.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_duplicate_insert_is_already_open() {
        let idx = CacheIndex::new();
        let f = tempfile::tempfile().unwrap();
        idx.insert("/a".into(), FileHandle::new(f, 1, libc::O_RDONLY, libc::O_RDONLY)).unwrap();
        let f2 = tempfile::tempfile().unwrap();
        let err = idx
            .insert("/a".into(), FileHandle::new(f2, 2, libc::O_RDONLY, libc::O_RDONLY))
            .unwrap_err();
        assert!(matches!(err, FsError::ProtocolViolation(_)));
    }

    #[test]
    fn remove_drops_the_only_entry_for_a_path() {
        let idx = CacheIndex::new();
        let f = tempfile::tempfile().unwrap();
        idx.insert("/a".into(), FileHandle::new(f, 1, libc::O_RDONLY, libc::O_RDONLY)).unwrap();
        assert!(idx.is_open("/a"));
        assert!(idx.remove("/a").is_some());
        assert!(!idx.is_open("/a"));
    }
}
