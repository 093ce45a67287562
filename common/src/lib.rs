pub mod argspec;
pub mod error;
pub mod proto;
pub mod wire;

pub use argspec::{ArgSpec, ElementType, ARG_SENTINEL, MAX_ARRAY_LEN};
pub use error::FsError;
pub use wire::{EntryKind, FileStat, LockMode, OpenRecord, TimespecPair};
