//! The inode↔path bridge (SPEC_FULL.md §4.6).
//!
//! `fuser::Filesystem` is inode-addressed; the cache manager underneath is
//! path-keyed. Since directory enumeration is out of scope, the only way a
//! path becomes known to the client is the fixed root inode or a `lookup`
//! call, so this table only ever grows — there is no `rename`/`unlink` to
//! retire an entry, unlike the `State::remove_path`/`rename_entry` pattern
//! a directory-listing filesystem would need.

use std::collections::HashMap;

pub const ROOT_INODE: u64 = 1;

#[derive(Debug)]
pub struct InodeTable {
    next_ino: u64,
    paths: HashMap<u64, String>,
    inodes: HashMap<String, u64>,
}

impl InodeTable {
    pub fn new() -> Self {
        let mut paths = HashMap::new();
        let mut inodes = HashMap::new();
        paths.insert(ROOT_INODE, String::new());
        inodes.insert(String::new(), ROOT_INODE);
        InodeTable { next_ino: ROOT_INODE + 1, paths, inodes }
    }

    pub fn path_of(&self, ino: u64) -> Option<String> {
        self.paths.get(&ino).cloned()
    }

    /// Returns the inode for `path`, allocating a new one if this is the
    /// first time the path has been seen.
    pub fn ensure(&mut self, path: String) -> u64 {
        if let Some(&ino) = self.inodes.get(&path) {
            return ino;
        }
        let ino = self.next_ino;
        self.next_ino += 1;
        self.paths.insert(ino, path.clone());
        self.inodes.insert(path, ino);
        ino
    }

    /// Composes a child path from a parent inode's path and a component
    /// name, the way `lookup` needs to before it can ask the cache manager
    /// for a `getattr`.
    pub fn compose_child(&self, parent_ino: u64, name: &str) -> Option<String> {
        let parent = self.path_of(parent_ino)?;
        if parent.is_empty() {
            Some(format!("/{name}"))
        } else {
            Some(format!("{parent}/{name}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_preseeded() {
        let table = InodeTable::new();
        assert_eq!(table.path_of(ROOT_INODE), Some(String::new()));
    }

    #[test]
    fn ensure_is_idempotent_per_path() {
        let mut table = InodeTable::new();
        let a = table.ensure("/a.txt".to_string());
        let b = table.ensure("/a.txt".to_string());
        assert_eq!(a, b);
        let c = table.ensure("/b.txt".to_string());
        assert_ne!(a, c);
    }

    #[test]
    fn compose_child_handles_root_and_nested_parents() {
        let mut table = InodeTable::new();
        assert_eq!(table.compose_child(ROOT_INODE, "a.txt"), Some("/a.txt".to_string()));
        let dir_ino = table.ensure("/dir".to_string());
        assert_eq!(table.compose_child(dir_ino, "f.txt"), Some("/dir/f.txt".to_string()));
    }
}
