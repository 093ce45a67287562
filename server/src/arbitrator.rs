//! Per-path reader/writer lock table.
//!
//! Grounded on `lock_server.cc`'s `LockUtil`: a mutex-guarded map from path
//! to lock, lazily created on first use. The original destroys a path's
//! lock entry once both reader and writer counts drop to zero; here entries
//! are never destroyed (see SPEC_FULL.md §9's resolution of that Open
//! Question) since `tokio::sync::RwLock` doesn't expose a live reader/writer
//! count to test against and the map never grows unbounded in practice
//! (one entry per distinct path ever touched).
//!
//! `lock`/`unlock` are two independent RPCs, not a scope, so the acquired
//! guard has to survive past the end of the call that created it. Owned
//! guards (`OwnedRwLockReadGuard`/`OwnedRwLockWriteGuard`) are stashed in a
//! side table keyed by path and reclaimed by the matching `unlock` call.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use remote_fs_common::LockMode;

enum HeldGuards {
    Read(Vec<OwnedRwLockReadGuard<()>>),
    Write(OwnedRwLockWriteGuard<()>),
}

pub struct PathLockTable {
    locks: std::sync::Mutex<HashMap<String, Arc<RwLock<()>>>>,
    held: AsyncMutex<HashMap<String, HeldGuards>>,
}

impl PathLockTable {
    pub fn new() -> Self {
        PathLockTable {
            locks: std::sync::Mutex::new(HashMap::new()),
            held: AsyncMutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, path: &str) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    pub async fn acquire(&self, path: &str, mode: LockMode) {
        let lock = self.lock_for(path);
        match mode {
            LockMode::Read => {
                let guard = lock.read_owned().await;
                let mut held = self.held.lock().await;
                match held.get_mut(path) {
                    Some(HeldGuards::Read(v)) => v.push(guard),
                    _ => {
                        held.insert(path.to_string(), HeldGuards::Read(vec![guard]));
                    }
                }
            }
            LockMode::Write => {
                let guard = lock.write_owned().await;
                let mut held = self.held.lock().await;
                held.insert(path.to_string(), HeldGuards::Write(guard));
            }
        }
    }

    /// Returns `false` if there was no matching held guard to release,
    /// mirroring the original's `-1` return from `LockUtil::release` when
    /// the path isn't in its map.
    pub async fn release(&self, path: &str, mode: LockMode) -> bool {
        let mut held = self.held.lock().await;
        match (held.get_mut(path), mode) {
            (Some(HeldGuards::Read(v)), LockMode::Read) => {
                if v.pop().is_none() {
                    return false;
                }
                if v.is_empty() {
                    held.remove(path);
                }
                true
            }
            (Some(HeldGuards::Write(_)), LockMode::Write) => {
                held.remove(path);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_locks_stack_and_drain() {
        let table = PathLockTable::new();
        table.acquire("/a", LockMode::Read).await;
        table.acquire("/a", LockMode::Read).await;
        assert!(table.release("/a", LockMode::Read).await);
        assert!(table.release("/a", LockMode::Read).await);
        assert!(!table.release("/a", LockMode::Read).await);
    }

    #[tokio::test]
    async fn write_lock_excludes_concurrent_write() {
        let table = Arc::new(PathLockTable::new());
        table.acquire("/a", LockMode::Write).await;

        let table2 = table.clone();
        let handle = tokio::spawn(async move {
            table2.acquire("/a", LockMode::Write).await;
            true
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        assert!(table.release("/a", LockMode::Write).await);
        assert!(handle.await.unwrap());
    }
}
