//! The per-open-file client-side record (SPEC_FULL.md §3 "FileHandle").

use std::fs::File;
use std::time::SystemTime;

use remote_fs_common::wire::OpenRecord;

/// Exactly one of these exists per open path per client session (§3's
/// invariant), held inside the [`super::CacheIndex`].
pub struct FileHandle {
    /// Handle into the local cache file.
    pub local: File,
    /// Opaque handle the server handed back from its own `open`.
    pub remote_fh: u64,
    /// Access mode preserved from the original host request. Used for all
    /// *local* decisions (upload-on-release, read-vs-write gating).
    pub flags: i32,
    /// Access mode actually sent to the server's `open`. Differs from
    /// `flags` only for a write-only open, which is upgraded to read-write
    /// server-side so the download step can read the file back (§4.5 step
    /// 3). Carried separately so `release`/`fsync` present the server with
    /// the same mode it used to claim the `WriteOwnerSet` entry.
    pub remote_flags: i32,
    /// Wall-clock time of the last known-fresh moment (`Tc`).
    pub last_validated: SystemTime,
}

impl FileHandle {
    pub fn new(local: File, remote_fh: u64, flags: i32, remote_flags: i32) -> Self {
        FileHandle { local, remote_fh, flags, remote_flags, last_validated: SystemTime::now() }
    }

    pub fn open_record(&self) -> OpenRecord {
        OpenRecord { flags: self.remote_flags, server_fh: self.remote_fh }
    }

    pub fn wants_write(&self) -> bool {
        wants_write(self.flags)
    }

    pub fn mark_validated(&mut self, at: SystemTime) {
        self.last_validated = at;
    }
}

pub fn wants_write(flags: i32) -> bool {
    (flags & libc::O_ACCMODE) == libc::O_WRONLY || (flags & libc::O_ACCMODE) == libc::O_RDWR
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn handle_with(local: File, flags: i32) -> FileHandle {
        FileHandle::new(local, 1, flags, flags)
    }

    #[test]
    fn wants_write_detects_rdwr_and_wronly() {
        let f = tempfile::tempfile().unwrap();
        assert!(handle_with(f, libc::O_WRONLY).wants_write());
        let f2 = tempfile::tempfile().unwrap();
        assert!(handle_with(f2, libc::O_RDWR).wants_write());
        let f3 = tempfile::tempfile().unwrap();
        assert!(!handle_with(f3, libc::O_RDONLY).wants_write());
    }

    #[test]
    fn mark_validated_updates_tc() {
        let f = tempfile::tempfile().unwrap();
        let mut h = handle_with(f, libc::O_RDONLY);
        let past = SystemTime::now() - Duration::from_secs(100);
        h.mark_validated(past);
        assert_eq!(h.last_validated, past);
    }
}
