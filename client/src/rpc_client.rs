//! The client side of the RPC argument codec and the chunked bulk-transfer
//! loop (SPEC_FULL.md §4.3, §4.4).
//!
//! Every method here mirrors one `watdfs_cli_*` call in the original design:
//! build the request, call `arg_spec()` to get (and validate, in debug
//! builds) the descriptor vector the spec requires every procedure to carry,
//! send it over the wire, and collapse the response's `status` field back
//! into a `Result`. A transport failure — connection refused, timeout,
//! undecodable body — is surfaced as [`FsError::TransportFailure`], which
//! the cache manager maps to `-EINVAL` at the FUSE boundary, exactly as
//! SPEC_FULL.md §4.3's call convention specifies.

use serde::{de::DeserializeOwned, Serialize};

use remote_fs_common::argspec::{debug_validate, MAX_ARRAY_LEN};
use remote_fs_common::error::FsError;
use remote_fs_common::proto::{
    FsyncRequest, FsyncResponse, GetattrRequest, GetattrResponse, LockRequest, LockResponse,
    MknodRequest, MknodResponse, OpenRequest, OpenResponse, ReadRequest, ReadResponse,
    ReleaseRequest, ReleaseResponse, TruncateRequest, TruncateResponse, UnlockRequest,
    UnlockResponse, UtimensRequest, UtimensResponse, WriteRequest, WriteResponse,
};
use remote_fs_common::wire::{FileStat, LockMode, OpenRecord, TimespecPair};

/// Thin wrapper around a `reqwest::Client` and the server's base URL.
///
/// Stands in for the RPC library's `rpcCall`/`rpcInit` primitives the spec
/// treats as an external collaborator (§1): `init` is `RpcClient::new`,
/// `call` is `RpcClient::call`, and there is no separate `destroy` since the
/// underlying `reqwest::Client` tears down its connection pool on drop.
#[derive(Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    base_url: String,
}

impl RpcClient {
    pub fn new(base_url: String) -> Self {
        RpcClient { http: reqwest::Client::new(), base_url }
    }

    async fn call<Req, Resp>(&self, procedure: &str, req: &Req) -> Result<Resp, FsError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let body = bincode::serialize(req)
            .map_err(|e| FsError::TransportFailure(format!("encode {procedure}: {e}")))?;
        let resp = self
            .http
            .post(format!("{}/rpc/{}", self.base_url, procedure))
            .body(body)
            .send()
            .await
            .map_err(|e| FsError::TransportFailure(format!("{procedure}: {e}")))?;
        if !resp.status().is_success() {
            return Err(FsError::TransportFailure(format!(
                "{procedure}: server returned {}",
                resp.status()
            )));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| FsError::TransportFailure(format!("{procedure} body: {e}")))?;
        bincode::deserialize(&bytes)
            .map_err(|e| FsError::TransportFailure(format!("{procedure} decode: {e}")))
    }

    pub async fn getattr(&self, path: &str) -> Result<FileStat, FsError> {
        let req = GetattrRequest { path: path.to_string() };
        debug_validate(&req.arg_spec());
        let resp: GetattrResponse = self.call("getattr", &req).await?;
        if resp.status < 0 {
            return Err(FsError::from_errno(resp.status));
        }
        resp.stat.ok_or_else(|| FsError::TransportFailure("getattr: missing stat".into()))
    }

    pub async fn mknod(&self, path: &str, mode: u32, dev: u64) -> Result<(), FsError> {
        let req = MknodRequest { path: path.to_string(), mode, dev };
        debug_validate(&req.arg_spec());
        let resp: MknodResponse = self.call("mknod", &req).await?;
        if resp.status < 0 {
            return Err(FsError::from_errno(resp.status));
        }
        Ok(())
    }

    pub async fn open(&self, path: &str, flags: i32) -> Result<OpenRecord, FsError> {
        let req = OpenRequest { path: path.to_string(), flags };
        debug_validate(&req.arg_spec());
        let resp: OpenResponse = self.call("open", &req).await?;
        if resp.status < 0 {
            return Err(FsError::from_errno(resp.status));
        }
        resp.record.ok_or_else(|| FsError::TransportFailure("open: missing record".into()))
    }

    pub async fn release(&self, path: &str, record: OpenRecord) -> Result<(), FsError> {
        let req = ReleaseRequest { path: path.to_string(), record };
        debug_validate(&req.arg_spec());
        let resp: ReleaseResponse = self.call("release", &req).await?;
        if resp.status < 0 {
            return Err(FsError::from_errno(resp.status));
        }
        Ok(())
    }

    /// Chunked read loop (§4.4). Rebuilds the request from scratch every
    /// iteration rather than mutating one long-lived descriptor, so a
    /// partial failure never leaves a stale offset/length pair behind (the
    /// hazard SPEC_FULL.md §9 Open Question (i) flags in the original).
    ///
    /// Returns the bytes actually read. A short read (fewer bytes than
    /// requested) ends the loop and is treated as end-of-file, matching the
    /// spec's read-loop description. A failure after at least one
    /// successful chunk returns the bytes accumulated so far instead of an
    /// error, since the spec's partial-failure rule reports the bytes
    /// actually transferred.
    pub async fn read_chunked(
        &self,
        path: &str,
        record: OpenRecord,
        size: u64,
        offset: i64,
    ) -> Result<Vec<u8>, FsError> {
        let mut out = Vec::with_capacity(size.min(1 << 20) as usize);
        let mut remaining = size;
        let mut cur_offset = offset;

        while remaining > 0 {
            let window = remaining.min(MAX_ARRAY_LEN as u64) as u32;
            let req = ReadRequest { path: path.to_string(), record, size: window, offset: cur_offset };
            debug_validate(&req.arg_spec());

            let resp: ReadResponse = match self.call("read", &req).await {
                Ok(r) => r,
                Err(e) => {
                    return if out.is_empty() { Err(e) } else { Ok(out) };
                }
            };
            if resp.status < 0 {
                return if out.is_empty() { Err(FsError::from_errno(resp.status)) } else { Ok(out) };
            }

            let n = (resp.status as usize).min(resp.data.len());
            out.extend_from_slice(&resp.data[..n]);

            if n as u64 == 0 || (n as u32) < window {
                break; // short read: end of file
            }
            remaining -= n as u64;
            cur_offset += n as i64;
        }
        Ok(out)
    }

    /// Chunked write loop (§4.4), symmetric to [`RpcClient::read_chunked`].
    /// Returns the total bytes actually written.
    pub async fn write_chunked(
        &self,
        path: &str,
        record: OpenRecord,
        data: &[u8],
        offset: i64,
    ) -> Result<i64, FsError> {
        let mut written_total: i64 = 0;
        let mut cur_offset = offset;
        let mut cursor = 0usize;

        while cursor < data.len() {
            let end = (cursor + MAX_ARRAY_LEN).min(data.len());
            let chunk = &data[cursor..end];
            let req = WriteRequest {
                path: path.to_string(),
                record,
                data: chunk.to_vec(),
                offset: cur_offset,
            };
            debug_validate(&req.arg_spec());

            let resp: WriteResponse = match self.call("write", &req).await {
                Ok(r) => r,
                Err(e) => {
                    return if written_total == 0 { Err(e) } else { Ok(written_total) };
                }
            };
            if resp.status < 0 {
                return if written_total == 0 {
                    Err(FsError::from_errno(resp.status))
                } else {
                    Ok(written_total)
                };
            }

            let n = resp.status as usize;
            written_total += n as i64;
            if n < chunk.len() {
                break; // short write
            }
            cursor = end;
            cur_offset += n as i64;
        }
        Ok(written_total)
    }

    pub async fn truncate(&self, path: &str, newsize: i64) -> Result<(), FsError> {
        let req = TruncateRequest { path: path.to_string(), newsize };
        debug_validate(&req.arg_spec());
        let resp: TruncateResponse = self.call("truncate", &req).await?;
        if resp.status < 0 {
            return Err(FsError::from_errno(resp.status));
        }
        Ok(())
    }

    pub async fn fsync(&self, path: &str, record: OpenRecord) -> Result<(), FsError> {
        let req = FsyncRequest { path: path.to_string(), record };
        debug_validate(&req.arg_spec());
        let resp: FsyncResponse = self.call("fsync", &req).await?;
        if resp.status < 0 {
            return Err(FsError::from_errno(resp.status));
        }
        Ok(())
    }

    pub async fn utimens(&self, path: &str, times: TimespecPair) -> Result<(), FsError> {
        let req = UtimensRequest { path: path.to_string(), times };
        debug_validate(&req.arg_spec());
        let resp: UtimensResponse = self.call("utimens", &req).await?;
        if resp.status < 0 {
            return Err(FsError::from_errno(resp.status));
        }
        Ok(())
    }

    pub async fn lock(&self, path: &str, mode: LockMode) -> Result<(), FsError> {
        let req = LockRequest { path: path.to_string(), mode };
        debug_validate(&req.arg_spec());
        let resp: LockResponse = self.call("lock", &req).await?;
        if resp.status < 0 {
            return Err(FsError::from_errno(resp.status));
        }
        Ok(())
    }

    pub async fn unlock(&self, path: &str, mode: LockMode) -> Result<(), FsError> {
        let req = UnlockRequest { path: path.to_string(), mode };
        debug_validate(&req.arg_spec());
        let resp: UnlockResponse = self.call("unlock", &req).await?;
        if resp.status < 0 {
            return Err(FsError::from_errno(resp.status));
        }
        Ok(())
    }
}
