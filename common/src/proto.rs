//! Per-procedure request/response envelopes.
//!
//! Every remote procedure in SPEC_FULL.md §6 takes one logical path plus
//! zero or more additional parameters, and returns a trailing status int (0
//! or `-errno`). Here that convention is expressed directly as struct
//! fields rather than a `void**` argument vector, but each request still
//! carries an [`ArgSpec`] vector describing its shape (`arg_spec()`), built
//! and validated by the client before every call — see `argspec.rs` for why
//! this is still load-bearing rather than vestigial.

use crate::argspec::{ArgSpec, ElementType, MAX_ARRAY_LEN};
use crate::wire::{FileStat, LockMode, OpenRecord, TimespecPair};
use serde::{Deserialize, Serialize};

fn path_arg(path: &str) -> ArgSpec {
    ArgSpec::new(true, false, true, ElementType::Char, (path.len() + 1) as u16)
}

fn status_arg() -> ArgSpec {
    ArgSpec::new(false, true, false, ElementType::Int, 0)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetattrRequest {
    pub path: String,
}

impl GetattrRequest {
    pub fn arg_spec(&self) -> Vec<ArgSpec> {
        vec![
            path_arg(&self.path),
            ArgSpec::new(false, true, true, ElementType::Char, 1),
            status_arg(),
            ArgSpec::sentinel(),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetattrResponse {
    pub stat: Option<FileStat>,
    pub status: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MknodRequest {
    pub path: String,
    pub mode: u32,
    pub dev: u64,
}

impl MknodRequest {
    pub fn arg_spec(&self) -> Vec<ArgSpec> {
        vec![
            path_arg(&self.path),
            ArgSpec::new(true, false, false, ElementType::Int, 0),
            ArgSpec::new(true, false, false, ElementType::Long, 0),
            status_arg(),
            ArgSpec::sentinel(),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MknodResponse {
    pub status: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRequest {
    pub path: String,
    pub flags: i32,
}

impl OpenRequest {
    pub fn arg_spec(&self) -> Vec<ArgSpec> {
        vec![
            path_arg(&self.path),
            ArgSpec::new(true, true, true, ElementType::Char, 1),
            status_arg(),
            ArgSpec::sentinel(),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenResponse {
    pub record: Option<OpenRecord>,
    pub status: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseRequest {
    pub path: String,
    pub record: OpenRecord,
}

impl ReleaseRequest {
    pub fn arg_spec(&self) -> Vec<ArgSpec> {
        vec![
            path_arg(&self.path),
            ArgSpec::new(true, false, true, ElementType::Char, 1),
            status_arg(),
            ArgSpec::sentinel(),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseResponse {
    pub status: i32,
}

/// One window of a chunked read, never wider than [`MAX_ARRAY_LEN`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadRequest {
    pub path: String,
    pub record: OpenRecord,
    pub size: u32,
    pub offset: i64,
}

impl ReadRequest {
    pub fn arg_spec(&self) -> Vec<ArgSpec> {
        debug_assert!(self.size as usize <= MAX_ARRAY_LEN);
        vec![
            path_arg(&self.path),
            ArgSpec::new(false, true, true, ElementType::Char, self.size.max(1) as u16),
            ArgSpec::new(true, false, false, ElementType::Long, 0),
            ArgSpec::new(true, false, false, ElementType::Long, 0),
            ArgSpec::new(true, false, true, ElementType::Char, 1),
            status_arg(),
            ArgSpec::sentinel(),
        ]
    }
}

/// `status` carries bytes read on success, `-errno` on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResponse {
    pub data: Vec<u8>,
    pub status: i32,
}

/// One window of a chunked write, never wider than [`MAX_ARRAY_LEN`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteRequest {
    pub path: String,
    pub record: OpenRecord,
    pub data: Vec<u8>,
    pub offset: i64,
}

impl WriteRequest {
    pub fn arg_spec(&self) -> Vec<ArgSpec> {
        debug_assert!(self.data.len() <= MAX_ARRAY_LEN);
        vec![
            path_arg(&self.path),
            ArgSpec::new(true, false, true, ElementType::Char, self.data.len().max(1) as u16),
            ArgSpec::new(true, false, false, ElementType::Long, 0),
            ArgSpec::new(true, false, false, ElementType::Long, 0),
            ArgSpec::new(true, false, true, ElementType::Char, 1),
            status_arg(),
            ArgSpec::sentinel(),
        ]
    }
}

/// `status` carries bytes written on success, `-errno` on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteResponse {
    pub status: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruncateRequest {
    pub path: String,
    pub newsize: i64,
}

impl TruncateRequest {
    pub fn arg_spec(&self) -> Vec<ArgSpec> {
        vec![
            path_arg(&self.path),
            ArgSpec::new(true, false, false, ElementType::Long, 0),
            status_arg(),
            ArgSpec::sentinel(),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruncateResponse {
    pub status: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsyncRequest {
    pub path: String,
    pub record: OpenRecord,
}

impl FsyncRequest {
    pub fn arg_spec(&self) -> Vec<ArgSpec> {
        vec![
            path_arg(&self.path),
            ArgSpec::new(true, false, true, ElementType::Char, 1),
            status_arg(),
            ArgSpec::sentinel(),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsyncResponse {
    pub status: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UtimensRequest {
    pub path: String,
    pub times: TimespecPair,
}

impl UtimensRequest {
    pub fn arg_spec(&self) -> Vec<ArgSpec> {
        vec![
            path_arg(&self.path),
            ArgSpec::new(true, false, true, ElementType::Char, 1),
            status_arg(),
            ArgSpec::sentinel(),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UtimensResponse {
    pub status: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRequest {
    pub path: String,
    pub mode: LockMode,
}

impl LockRequest {
    pub fn arg_spec(&self) -> Vec<ArgSpec> {
        vec![
            path_arg(&self.path),
            ArgSpec::new(true, false, false, ElementType::Int, 0),
            status_arg(),
            ArgSpec::sentinel(),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockResponse {
    pub status: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockRequest {
    pub path: String,
    pub mode: LockMode,
}

impl UnlockRequest {
    pub fn arg_spec(&self) -> Vec<ArgSpec> {
        vec![
            path_arg(&self.path),
            ArgSpec::new(true, false, false, ElementType::Int, 0),
            status_arg(),
            ArgSpec::sentinel(),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockResponse {
    pub status: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_request_arg_spec_has_seven_slots_including_sentinel() {
        let req = ReadRequest {
            path: "/a".into(),
            record: OpenRecord { flags: 0, server_fh: 1 },
            size: 128,
            offset: 0,
        };
        let spec = req.arg_spec();
        assert_eq!(spec.len(), 7);
        assert_eq!(spec.last().unwrap().raw(), crate::argspec::ARG_SENTINEL);
        crate::argspec::debug_validate(&spec);
    }

    #[test]
    fn write_request_rejects_oversize_chunk_in_debug() {
        let req = WriteRequest {
            path: "/a".into(),
            record: OpenRecord { flags: 0, server_fh: 1 },
            data: vec![0u8; MAX_ARRAY_LEN],
            offset: 0,
        };
        // At exactly the ceiling this must not panic.
        crate::argspec::debug_validate(&req.arg_spec());
    }
}
