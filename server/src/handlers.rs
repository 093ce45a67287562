//! RPC procedure handlers.
//!
//! Each handler is grounded directly on the matching `watdfs_*` procedure in
//! `watdfs_server.cc`: same syscall, same `-errno` convention in the
//! returned status, same open-mode gating. What changes is the argument
//! vector: instead of `void **args` holding raw pointers into a shared
//! address space, each handler takes a typed request struct sent as a
//! `bincode`-encoded body, matching the fixed-width-struct philosophy
//! documented in `remote_fs_common::wire`.

use std::os::unix::fs::FileExt;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{de::DeserializeOwned, Serialize};

use remote_fs_common::proto::{
    FsyncRequest, FsyncResponse, GetattrRequest, GetattrResponse, LockRequest, LockResponse,
    MknodRequest, MknodResponse, OpenRequest, OpenResponse, ReadRequest, ReadResponse,
    ReleaseRequest, ReleaseResponse, TruncateRequest, TruncateResponse, UnlockRequest,
    UnlockResponse, UtimensRequest, UtimensResponse, WriteRequest, WriteResponse,
};
use remote_fs_common::wire::{EntryKind, FileStat, OpenRecord};

use crate::state::ServerState;

const BODY_LIMIT: usize = 16 * 1024 * 1024;

async fn read_body<T: DeserializeOwned>(body: Body) -> Result<T, StatusCode> {
    let bytes = to_bytes(body, BODY_LIMIT)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;
    bincode::deserialize(&bytes).map_err(|_| StatusCode::BAD_REQUEST)
}

fn bincode_ok<T: Serialize>(value: &T) -> Response {
    match bincode::serialize(value) {
        Ok(bytes) => (StatusCode::OK, bytes).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// `O_WRONLY`/`O_RDWR` detection, mirroring `processAccessType` in
/// `watdfs_server.cc`.
fn wants_write(flags: i32) -> bool {
    (flags & libc::O_ACCMODE) == libc::O_WRONLY || (flags & libc::O_ACCMODE) == libc::O_RDWR
}

pub async fn getattr(State(state): State<Arc<ServerState>>, body: Body) -> Response {
    let req: GetattrRequest = match read_body(body).await {
        Ok(r) => r,
        Err(code) => return code.into_response(),
    };

    let full_path = state.resolve(&req.path);
    let result = tokio::task::spawn_blocking(move || std::fs::metadata(&full_path))
        .await
        .expect("blocking task panicked");

    let (stat, status) = match result {
        Ok(meta) => {
            let kind = if meta.is_dir() { EntryKind::Directory } else { EntryKind::File };
            match FileStat::from_metadata(kind, &meta) {
                Ok(stat) => (Some(stat), 0),
                Err(e) => (None, -e.raw_os_error().unwrap_or(libc::EIO)),
            }
        }
        Err(e) => (None, -e.raw_os_error().unwrap_or(libc::EIO)),
    };

    bincode_ok(&GetattrResponse { stat, status })
}

pub async fn mknod(State(state): State<Arc<ServerState>>, body: Body) -> Response {
    let req: MknodRequest = match read_body(body).await {
        Ok(r) => r,
        Err(code) => return code.into_response(),
    };

    let full_path = state.resolve(&req.path);
    let status = tokio::task::spawn_blocking(move || {
        let c_path = match std::ffi::CString::new(full_path.as_os_str().as_encoded_bytes()) {
            Ok(c) => c,
            Err(_) => return -libc::EINVAL,
        };
        let sys_ret = unsafe { libc::mknod(c_path.as_ptr(), req.mode, req.dev as libc::dev_t) };
        if sys_ret < 0 {
            -std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO)
        } else {
            0
        }
    })
    .await
    .expect("blocking task panicked");

    bincode_ok(&MknodResponse { status })
}

pub async fn open(State(state): State<Arc<ServerState>>, body: Body) -> Response {
    let req: OpenRequest = match read_body(body).await {
        Ok(r) => r,
        Err(code) => return code.into_response(),
    };

    if wants_write(req.flags) && !state.write_owners.try_claim(&req.path) {
        return bincode_ok(&OpenResponse { record: None, status: -libc::EACCES });
    }

    let full_path = state.resolve(&req.path);
    let flags = req.flags;
    let opened = tokio::task::spawn_blocking(move || {
        use std::fs::OpenOptions;
        let mut opts = OpenOptions::new();
        opts.read(true);
        if wants_write(flags) {
            opts.write(true);
        }
        std::os::unix::fs::OpenOptionsExt::custom_flags(&mut opts, flags & !libc::O_ACCMODE);
        opts.open(&full_path)
    })
    .await
    .expect("blocking task panicked");

    match opened {
        Ok(file) => {
            let handle = state.handles.insert(file);
            bincode_ok(&OpenResponse {
                record: Some(OpenRecord { flags: req.flags, server_fh: handle }),
                status: 0,
            })
        }
        Err(e) => {
            if wants_write(req.flags) {
                state.write_owners.release(&req.path);
            }
            bincode_ok(&OpenResponse {
                record: None,
                status: -e.raw_os_error().unwrap_or(libc::EIO),
            })
        }
    }
}

pub async fn release(State(state): State<Arc<ServerState>>, body: Body) -> Response {
    let req: ReleaseRequest = match read_body(body).await {
        Ok(r) => r,
        Err(code) => return code.into_response(),
    };

    let removed = state.handles.remove(req.record.server_fh);
    let status = if removed.is_some() { 0 } else { -libc::EBADF };

    if wants_write(req.record.flags) {
        state.write_owners.release(&req.path);
    }

    bincode_ok(&ReleaseResponse { status })
}

pub async fn read(State(state): State<Arc<ServerState>>, body: Body) -> Response {
    let req: ReadRequest = match read_body(body).await {
        Ok(r) => r,
        Err(code) => return code.into_response(),
    };

    let state2 = state.clone();
    let result = tokio::task::spawn_blocking(move || {
        let mut buf = vec![0u8; req.size as usize];
        let read = state2.handles.with_file(req.record.server_fh, |f| {
            f.read_at(&mut buf, req.offset as u64)
        });
        match read {
            Some(Ok(n)) => {
                buf.truncate(n);
                (buf, n as i32)
            }
            Some(Err(e)) => (Vec::new(), -e.raw_os_error().unwrap_or(libc::EIO)),
            None => (Vec::new(), -libc::EBADF),
        }
    })
    .await
    .expect("blocking task panicked");

    bincode_ok(&ReadResponse { data: result.0, status: result.1 })
}

pub async fn write(State(state): State<Arc<ServerState>>, body: Body) -> Response {
    let req: WriteRequest = match read_body(body).await {
        Ok(r) => r,
        Err(code) => return code.into_response(),
    };

    let state2 = state.clone();
    let status = tokio::task::spawn_blocking(move || {
        let written = state2
            .handles
            .with_file(req.record.server_fh, |f| f.write_at(&req.data, req.offset as u64));
        match written {
            Some(Ok(n)) => n as i32,
            Some(Err(e)) => -e.raw_os_error().unwrap_or(libc::EIO),
            None => -libc::EBADF,
        }
    })
    .await
    .expect("blocking task panicked");

    bincode_ok(&WriteResponse { status })
}

pub async fn truncate(State(state): State<Arc<ServerState>>, body: Body) -> Response {
    let req: TruncateRequest = match read_body(body).await {
        Ok(r) => r,
        Err(code) => return code.into_response(),
    };

    let full_path = state.resolve(&req.path);
    let newsize = req.newsize;
    let status = tokio::task::spawn_blocking(move || {
        match std::fs::metadata(&full_path).and_then(|_| {
            let file = std::fs::OpenOptions::new().write(true).open(&full_path)?;
            file.set_len(newsize.max(0) as u64)
        }) {
            Ok(()) => 0,
            Err(e) => -e.raw_os_error().unwrap_or(libc::EIO),
        }
    })
    .await
    .expect("blocking task panicked");

    bincode_ok(&TruncateResponse { status })
}

pub async fn fsync(State(state): State<Arc<ServerState>>, body: Body) -> Response {
    let req: FsyncRequest = match read_body(body).await {
        Ok(r) => r,
        Err(code) => return code.into_response(),
    };

    let status = tokio::task::spawn_blocking(move || {
        let synced = state.handles.with_file(req.record.server_fh, |f| f.sync_all());
        match synced {
            Some(Ok(())) => 0,
            Some(Err(e)) => -e.raw_os_error().unwrap_or(libc::EIO),
            None => -libc::EBADF,
        }
    })
    .await
    .expect("blocking task panicked");

    bincode_ok(&FsyncResponse { status })
}

pub async fn utimens(State(state): State<Arc<ServerState>>, body: Body) -> Response {
    let req: UtimensRequest = match read_body(body).await {
        Ok(r) => r,
        Err(code) => return code.into_response(),
    };

    let full_path = state.resolve(&req.path);
    let times = req.times;
    let status = tokio::task::spawn_blocking(move || {
        let atime = filetime::FileTime::from_unix_time(times.atime_secs, times.atime_nanos);
        let mtime = filetime::FileTime::from_unix_time(times.mtime_secs, times.mtime_nanos);
        match filetime::set_file_times(&full_path, atime, mtime) {
            Ok(()) => 0,
            Err(e) => -e.raw_os_error().unwrap_or(libc::EIO),
        }
    })
    .await
    .expect("blocking task panicked");

    bincode_ok(&UtimensResponse { status })
}

pub async fn lock_path(State(state): State<Arc<ServerState>>, body: Body) -> Response {
    let req: LockRequest = match read_body(body).await {
        Ok(r) => r,
        Err(code) => return code.into_response(),
    };

    state.locks.acquire(&req.path, req.mode).await;
    bincode_ok(&LockResponse { status: 0 })
}

pub async fn unlock_path(State(state): State<Arc<ServerState>>, body: Body) -> Response {
    let req: UnlockRequest = match read_body(body).await {
        Ok(r) => r,
        Err(code) => return code.into_response(),
    };

    let status = if state.locks.release(&req.path, req.mode).await { 0 } else { -1 };
    bincode_ok(&UnlockResponse { status })
}
