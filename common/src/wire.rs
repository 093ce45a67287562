//! Fixed-width structs exchanged as opaque byte arrays.
//!
//! The original design exchanges `struct stat`, `struct fuse_file_info` and
//! `struct timespec[2]` as raw `sizeof`-width byte arrays, trusting both ends
//! to agree on layout. A `bincode`-encoded `#[derive(Serialize)]` struct of
//! plain data fields has exactly that property — fixed, position-dependent,
//! no self-describing tags — so it stands in for the C structs here.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Whether the underlying path is a regular file or a directory.
///
/// Not present in the original's `struct stat` (which encodes it in
/// `st_mode`) but broken out here because the client's inode bridge (§4.6)
/// needs it directly to answer `fuser::Filesystem::lookup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    File,
    Directory,
}

/// The server's view of a path's metadata — the wire equivalent of `struct
/// stat`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FileStat {
    pub kind: EntryKind,
    pub size: u64,
    pub perm: u16,
    pub atime_secs: i64,
    pub atime_nanos: u32,
    pub mtime_secs: i64,
    pub mtime_nanos: u32,
}

impl FileStat {
    pub fn mtime(&self) -> SystemTime {
        UNIX_EPOCH + Duration::new(self.mtime_secs.max(0) as u64, self.mtime_nanos)
    }

    pub fn atime(&self) -> SystemTime {
        UNIX_EPOCH + Duration::new(self.atime_secs.max(0) as u64, self.atime_nanos)
    }

    pub fn from_metadata(kind: EntryKind, meta: &std::fs::Metadata) -> std::io::Result<Self> {
        use std::os::unix::fs::MetadataExt;
        Ok(FileStat {
            kind,
            size: meta.len(),
            perm: (meta.mode() & 0o7777) as u16,
            atime_secs: meta.atime(),
            atime_nanos: meta.atime_nsec() as u32,
            mtime_secs: meta.mtime(),
            mtime_nanos: meta.mtime_nsec() as u32,
        })
    }
}

/// The wire equivalent of `struct fuse_file_info`: the parts of an open
/// session that travel between client and server. `server_fh` is the
/// `OpenHandleTable` key (see SPEC_FULL.md §3) rather than a raw OS
/// descriptor, since a raw fd cannot be serialized across the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OpenRecord {
    pub flags: i32,
    pub server_fh: u64,
}

/// The wire equivalent of `struct timespec[2]` (atime, mtime) as used by
/// `utimens`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimespecPair {
    pub atime_secs: i64,
    pub atime_nanos: u32,
    pub mtime_secs: i64,
    pub mtime_nanos: u32,
}

impl TimespecPair {
    pub fn from_systemtimes(atime: SystemTime, mtime: SystemTime) -> Self {
        let a = atime.duration_since(UNIX_EPOCH).unwrap_or_default();
        let m = mtime.duration_since(UNIX_EPOCH).unwrap_or_default();
        TimespecPair {
            atime_secs: a.as_secs() as i64,
            atime_nanos: a.subsec_nanos(),
            mtime_secs: m.as_secs() as i64,
            mtime_nanos: m.subsec_nanos(),
        }
    }

    pub fn atime(&self) -> SystemTime {
        UNIX_EPOCH + Duration::new(self.atime_secs.max(0) as u64, self.atime_nanos)
    }

    pub fn mtime(&self) -> SystemTime {
        UNIX_EPOCH + Duration::new(self.mtime_secs.max(0) as u64, self.mtime_nanos)
    }
}

/// Reader/writer lock mode requested by the `lock`/`unlock` procedures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockMode {
    Read = 0,
    Write = 1,
}
