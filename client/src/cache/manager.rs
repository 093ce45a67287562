//! `CacheManager`: the public contract every `fuser::Filesystem` callback
//! goes through (SPEC_FULL.md §4.1), plus the download/upload transfer
//! protocol (§4.5) that backs it.

use std::os::unix::fs::{FileExt, MetadataExt, OpenOptionsExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use remote_fs_common::error::FsError;
use remote_fs_common::wire::{EntryKind, FileStat, LockMode, OpenRecord, TimespecPair};

use crate::rpc_client::RpcClient;

use super::handle::FileHandle;
use super::index::CacheIndex;
use super::lock_guard::ServerLockGuard;

/// The three call sites that open a path only for the duration of a single
/// operation (§9 "transient open-op-release"), sharing one private helper
/// instead of each re-implementing the open/act/release dance.
enum TransientOp {
    Getattr,
    Truncate(i64),
    Utimens(TimespecPair),
}

pub struct CacheManager {
    rpc: Arc<RpcClient>,
    cache_dir: PathBuf,
    cache_interval: Duration,
    index: CacheIndex,
}

impl CacheManager {
    pub fn new(cache_dir: PathBuf, cache_interval: Duration, server_url: String) -> Self {
        CacheManager {
            rpc: Arc::new(RpcClient::new(server_url)),
            cache_dir,
            cache_interval,
            index: CacheIndex::new(),
        }
    }

    fn cache_path(&self, path: &str) -> PathBuf {
        self.cache_dir.join(path.trim_start_matches('/'))
    }

    pub fn open_count(&self) -> usize {
        self.index.len()
    }

    // ---- public contract (SPEC_FULL.md §4.1) -----------------------------

    /// If the path is open in read mode, revalidates it first (§4.1
    /// "Freshness evaluation"). If it isn't open at all, performs a
    /// transient open-read-release cycle. Either way the returned stat is
    /// drawn from the local cache file's metadata, never straight off the
    /// wire, matching "the client only ever believes its own cache file".
    pub async fn getattr(&self, path: &str) -> Result<FileStat, FsError> {
        if !self.index.is_open(path) {
            return self.with_transient_handle(path, TransientOp::Getattr).await;
        }
        if self.index.wants_write(path) == Some(false) {
            self.ensure_fresh(path).await?;
        }
        self.stat_local(path)
    }

    /// Forwards to the server, then creates a matching empty entry in the
    /// local cache directory so a later open can succeed offline of any
    /// server round trip's timing. The new path is not retained open.
    pub async fn mknod(&self, path: &str, mode: u32, dev: u64) -> Result<(), FsError> {
        self.rpc.mknod(path, mode, dev).await?;

        let local_path = self.cache_path(path);
        if let Some(parent) = local_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode((mode & 0o7777) | 0o600)
            .open(&local_path)?;
        Ok(())
    }

    /// Fails with *already-open* if a handle for `path` exists; otherwise
    /// runs the full download transfer (§4.5) and registers the resulting
    /// `FileHandle`.
    pub async fn open(&self, path: &str, flags: i32) -> Result<(), FsError> {
        if self.index.is_open(path) {
            return Err(FsError::ProtocolViolation(format!("{path} already open")));
        }
        self.download_new(path, flags).await
    }

    /// Write-mode release uploads first; read-mode release just drops the
    /// handle and tells the server to forget it.
    pub async fn release(&self, path: &str) -> Result<(), FsError> {
        match self.index.wants_write(path) {
            Some(true) => self.upload(path, true).await,
            Some(false) => {
                if let Some(handle) = self.index.remove(path) {
                    self.rpc.release(path, handle.open_record()).await?;
                }
                Ok(())
            }
            None => Err(FsError::ProtocolViolation(format!("{path} not open"))),
        }
    }

    /// Revalidates a read-mode handle before serving (§4.1), then reads
    /// positionally out of the local cache file.
    pub async fn read(&self, path: &str, size: u32, offset: i64) -> Result<Vec<u8>, FsError> {
        let is_write = self
            .index
            .wants_write(path)
            .ok_or_else(|| FsError::ProtocolViolation(format!("{path} not open")))?;
        if !is_write {
            self.ensure_fresh(path).await?;
        }
        let snap = self
            .index
            .snapshot(path)?
            .ok_or_else(|| FsError::ProtocolViolation(format!("{path} not open")))?;

        let mut buf = vec![0u8; size as usize];
        let n = snap.local.read_at(&mut buf, offset.max(0) as u64)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Writes positionally into the local cache file. The staleness check
    /// runs *after* the local write, not before: §9 Design Notes resolves
    /// this as intentional, since the write must land locally regardless,
    /// and a write-back is triggered rather than skipped once the window
    /// has expired.
    pub async fn write(&self, path: &str, data: &[u8], offset: i64) -> Result<usize, FsError> {
        let snap = self
            .index
            .snapshot(path)?
            .ok_or_else(|| FsError::ProtocolViolation(format!("{path} not open")))?;
        snap.local.write_all_at(data, offset.max(0) as u64)?;

        let now = SystemTime::now();
        let within_window =
            now.duration_since(snap.last_validated).map(|d| d < self.cache_interval).unwrap_or(true);
        if !within_window {
            self.upload(path, false).await?;
        }
        Ok(data.len())
    }

    /// Requires a handle open for writing. With no handle open at all it
    /// runs a transient open-in-write-mode cycle; with a read-only handle
    /// already open it fails rather than silently escalating the mode.
    pub async fn truncate(&self, path: &str, size: i64) -> Result<(), FsError> {
        match self.index.wants_write(path) {
            None => {
                self.with_transient_handle(path, TransientOp::Truncate(size)).await?;
                Ok(())
            }
            Some(true) => self.truncate_open(path, size).await,
            Some(false) => Err(FsError::ProtocolViolation(format!("{path} is read-only"))),
        }
    }

    async fn truncate_open(&self, path: &str, size: i64) -> Result<(), FsError> {
        let snap = self
            .index
            .snapshot(path)?
            .ok_or_else(|| FsError::ProtocolViolation(format!("{path} not open")))?;
        snap.local.set_len(size.max(0) as u64)?;
        self.rpc.truncate(path, size).await
    }

    /// Requires a handle already open for writing; uploads immediately,
    /// then asks the server to sync its own file to disk, so `fsync(2)`'s
    /// durability guarantee extends past "the server has the bytes" to
    /// "the server's kernel has them on disk".
    pub async fn fsync(&self, path: &str) -> Result<(), FsError> {
        match self.index.wants_write(path) {
            Some(true) => {
                self.upload(path, false).await?;
                let snap = self
                    .index
                    .snapshot(path)?
                    .ok_or_else(|| FsError::ProtocolViolation(format!("{path} not open")))?;
                self.rpc.fsync(path, snap.record).await
            }
            Some(false) => Err(FsError::ProtocolViolation(format!("{path} is read-only"))),
            None => Err(FsError::ProtocolViolation(format!("{path} not open"))),
        }
    }

    /// Same transient/persistent handle policy as `truncate`.
    pub async fn utimens(&self, path: &str, times: TimespecPair) -> Result<(), FsError> {
        match self.index.wants_write(path) {
            None => {
                self.with_transient_handle(path, TransientOp::Utimens(times)).await?;
                Ok(())
            }
            Some(true) => self.utimens_open(path, times).await,
            Some(false) => Err(FsError::ProtocolViolation(format!("{path} is read-only"))),
        }
    }

    async fn utimens_open(&self, path: &str, times: TimespecPair) -> Result<(), FsError> {
        let local_path = self.cache_path(path);
        let atime = filetime::FileTime::from_unix_time(times.atime_secs, times.atime_nanos);
        let mtime = filetime::FileTime::from_unix_time(times.mtime_secs, times.mtime_nanos);
        filetime::set_file_times(&local_path, atime, mtime)?;
        self.rpc.utimens(path, times).await
    }

    // ---- transient open-op-release (§9) -----------------------------------

    async fn with_transient_handle(&self, path: &str, op: TransientOp) -> Result<FileStat, FsError> {
        let flags = match op {
            TransientOp::Getattr => libc::O_RDONLY,
            TransientOp::Truncate(_) | TransientOp::Utimens(_) => libc::O_RDWR,
        };
        self.open(path, flags).await?;

        let op_result = match op {
            TransientOp::Getattr => Ok(()),
            TransientOp::Truncate(size) => self.truncate_open(path, size).await,
            TransientOp::Utimens(times) => self.utimens_open(path, times).await,
        };
        let stat_result = self.stat_local(path);
        let release_result = self.release(path).await;

        op_result?;
        release_result?;
        stat_result
    }

    fn stat_local(&self, path: &str) -> Result<FileStat, FsError> {
        let snap = self
            .index
            .snapshot(path)?
            .ok_or_else(|| FsError::ProtocolViolation(format!("{path} not open")))?;
        let meta = snap.local.metadata()?;
        let kind = if meta.is_dir() { EntryKind::Directory } else { EntryKind::File };
        FileStat::from_metadata(kind, &meta).map_err(FsError::from)
    }

    // ---- freshness evaluation (§4.1) --------------------------------------

    /// Rule 1 (validity window) short-circuits; otherwise rule 2 (mtime
    /// equality) is checked with one `getattr` round trip, and only a real
    /// mismatch triggers a full re-download.
    async fn ensure_fresh(&self, path: &str) -> Result<(), FsError> {
        let snap = self
            .index
            .snapshot(path)?
            .ok_or_else(|| FsError::ProtocolViolation(format!("{path} not open")))?;
        let now = SystemTime::now();
        let within_window =
            now.duration_since(snap.last_validated).map(|d| d < self.cache_interval).unwrap_or(true);
        if within_window {
            return Ok(());
        }

        let server_stat = self.rpc.getattr(path).await?;
        let local_meta = snap.local.metadata()?;
        if local_meta.mtime() == server_stat.mtime_secs {
            self.index.touch(path, now);
            return Ok(());
        }

        self.download_refresh(path).await
    }

    // ---- transfer protocol (§4.5) -----------------------------------------

    /// Steps 2, 4, 5, 6 of the download protocol, shared by both a brand
    /// new open and a refresh-in-place of an already-open handle: fetch the
    /// server's stat, (re)create the local cache file, pull the full
    /// contents if non-empty, then stamp the cache file's times to match.
    async fn fetch_and_write(&self, path: &str, record: OpenRecord) -> Result<(std::fs::File, FileStat), FsError> {
        let stat = self.rpc.getattr(path).await?;

        let local_path = self.cache_path(path);
        if let Some(parent) = local_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .mode((stat.perm as u32) | 0o600)
            .open(&local_path)?;

        if stat.size > 0 {
            let data = self.rpc.read_chunked(path, record, stat.size, 0).await?;
            file.write_all_at(&data, 0)?;
        }

        let atime = filetime::FileTime::from_unix_time(stat.atime_secs, stat.atime_nanos);
        let mtime = filetime::FileTime::from_unix_time(stat.mtime_secs, stat.mtime_nanos);
        filetime::set_file_times(&local_path, atime, mtime)?;

        Ok((file, stat))
    }

    /// Full download for a path with no existing client-side handle: claim
    /// the server's read lock, open on the server (upgrading a write-only
    /// request to read-write so the download itself can read the file
    /// back), pull the contents, and register the new handle.
    async fn download_new(&self, path: &str, flags: i32) -> Result<(), FsError> {
        let guard = ServerLockGuard::acquire(self.rpc.clone(), path, LockMode::Read).await?;

        let open_flags = if (flags & libc::O_ACCMODE) == libc::O_WRONLY {
            (flags & !libc::O_ACCMODE) | libc::O_RDWR
        } else {
            flags
        };
        let server_record = self.rpc.open(path, open_flags).await?;

        // From here on, the server has already registered this handle (and,
        // for a write-mode open, claimed the fleet-wide WriteOwnerSet entry
        // for the path) — any failure before the handle is registered
        // locally must undo that with an explicit server-side release, or
        // the claim leaks until the server restarts.
        let file = match self.fetch_and_write(path, server_record).await {
            Ok((file, _stat)) => file,
            Err(e) => {
                let _ = self.rpc.release(path, server_record).await;
                return Err(e);
            }
        };

        if let Err(e) = self.index.insert(
            path.to_string(),
            FileHandle::new(file, server_record.server_fh, flags, server_record.flags),
        ) {
            let _ = self.rpc.release(path, server_record).await;
            return Err(e);
        }
        guard.release().await
    }

    /// Re-pulls the contents of an already-open path without touching its
    /// server-side open session, used when `ensure_fresh` finds the mtimes
    /// have diverged.
    async fn download_refresh(&self, path: &str) -> Result<(), FsError> {
        let snap = self
            .index
            .snapshot(path)?
            .ok_or_else(|| FsError::ProtocolViolation(format!("{path} not open")))?;
        let guard = ServerLockGuard::acquire(self.rpc.clone(), path, LockMode::Read).await?;
        let (file, _stat) = self.fetch_and_write(path, snap.record).await?;
        self.index.replace_local(path, file, SystemTime::now());
        guard.release().await
    }

    /// Upload protocol (§4.5): sync the local cache file, snapshot its
    /// metadata and contents, truncate the server copy to zero, claim the
    /// server's write lock for the bulk transfer, push the contents,
    /// release the lock, then push the local mtimes so the server and
    /// cache agree again. `close` additionally tears down both sides'
    /// open session.
    async fn upload(&self, path: &str, close: bool) -> Result<(), FsError> {
        let snap = self
            .index
            .snapshot(path)?
            .ok_or_else(|| FsError::ProtocolViolation(format!("{path} not open")))?;
        snap.local.sync_all()?;
        let meta = snap.local.metadata()?;

        let local_path = self.cache_path(path);
        let data = std::fs::read(&local_path)?;

        self.rpc.truncate(path, 0).await?;

        let guard = ServerLockGuard::acquire(self.rpc.clone(), path, LockMode::Write).await?;
        let written = self.rpc.write_chunked(path, snap.record, &data, 0).await?;
        guard.release().await?;
        if (written as usize) < data.len() {
            return Err(FsError::SystemFailure(libc::EIO));
        }

        let times = TimespecPair::from_systemtimes(
            meta.accessed().unwrap_or_else(|_| SystemTime::now()),
            meta.modified().unwrap_or_else(|_| SystemTime::now()),
        );
        self.rpc.utimens(path, times).await?;
        self.index.touch(path, SystemTime::now());

        if close {
            if let Some(handle) = self.index.remove(path) {
                self.rpc.release(path, handle.open_record()).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_path_strips_leading_slash() {
        let mgr = CacheManager::new(
            PathBuf::from("/tmp/cache"),
            Duration::from_secs(5),
            "http://127.0.0.1:1".into(),
        );
        assert_eq!(mgr.cache_path("/a/b.txt"), PathBuf::from("/tmp/cache/a/b.txt"));
    }

    #[test]
    fn starts_with_no_open_handles() {
        let mgr = CacheManager::new(
            PathBuf::from("/tmp/cache"),
            Duration::from_secs(5),
            "http://127.0.0.1:1".into(),
        );
        assert_eq!(mgr.open_count(), 0);
    }
}
