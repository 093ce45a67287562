//! `ServerLockGuard`: the RAII wrapper around a server-side lock/unlock
//! round trip (SPEC_FULL.md §4.1, §9 "Resource scoping").
//!
//! A transfer acquires the server's per-path reader/writer lock with one RPC
//! (`lock`) and must release it with another (`unlock`) on every exit path,
//! including failures after a partial transfer. Wrapping the acquire in a
//! guard whose `Drop` fires the release means a `?`-propagating async
//! function can `return` early anywhere after acquiring and never leak the
//! lock. Because `Drop` cannot `.await`, the release itself is spawned as a
//! detached task on the runtime handle captured at acquire time — a
//! best-effort fire-and-forget, matching the spec's "lock/unlock" protocol
//! fidelity (§4.2) rather than holding up the caller for a round trip whose
//! result nobody is waiting on.

use std::sync::Arc;

use remote_fs_common::wire::LockMode;

use crate::rpc_client::RpcClient;

pub struct ServerLockGuard {
    rpc: Arc<RpcClient>,
    path: String,
    mode: LockMode,
    handle: tokio::runtime::Handle,
    released: bool,
}

impl ServerLockGuard {
    pub async fn acquire(
        rpc: Arc<RpcClient>,
        path: &str,
        mode: LockMode,
    ) -> Result<Self, remote_fs_common::error::FsError> {
        rpc.lock(path, mode).await?;
        Ok(ServerLockGuard {
            rpc,
            path: path.to_string(),
            mode,
            handle: tokio::runtime::Handle::current(),
            released: false,
        })
    }

    /// Releases synchronously and awaits the server's acknowledgement,
    /// for call sites that want to observe the unlock outcome instead of
    /// relying on the best-effort `Drop` path.
    pub async fn release(mut self) -> Result<(), remote_fs_common::error::FsError> {
        self.released = true;
        self.rpc.unlock(&self.path, self.mode).await
    }
}

impl Drop for ServerLockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let rpc = self.rpc.clone();
        let path = self.path.clone();
        let mode = self.mode;
        self.handle.spawn(async move {
            if let Err(e) = rpc.unlock(&path, mode).await {
                tracing::warn!("failed to release server lock on {path}: {e}");
            }
        });
    }
}
