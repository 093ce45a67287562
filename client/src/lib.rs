//! Library surface for the mount client.
//!
//! `main.rs` is a thin binary wrapper around this crate: it parses CLI args,
//! loads config and wires up a `RemoteFs`. Splitting the modules out into a
//! library target (mirroring the same split already done for `server`, see
//! `server/src/lib.rs`) lets integration tests drive `CacheManager` directly
//! against a real in-process server instead of only exercising it through a
//! live FUSE mount, which the test harness has no way to create.

pub mod cache;
pub mod config;
pub mod fs;
pub mod rpc_client;
