//! Client configuration, loaded from a TOML file at mount time.
//!
//! Grounded on the teacher's `config.rs`: a `serde`-derived struct loaded
//! with `toml::from_str`, falling back to a `Default` impl when the file is
//! absent so the client can still start with sane values during local
//! testing. The field set follows SPEC_FULL.md §6: `path_to_cache` and
//! `cache_interval` are the two values the cache-coherence protocol itself
//! reads; `server_url`, `kernel_attr_timeout_seconds` and
//! `kernel_entry_timeout_seconds` are the ambient additions the teacher's
//! own config already carried.

use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Absolute local directory backing the client-side cache.
    pub path_to_cache: PathBuf,
    /// Cache interval `t`, in seconds. Zero means every read/write revalidates.
    pub cache_interval: u64,
    /// Base URL of the server's RPC listener, e.g. `http://127.0.0.1:8080`.
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// TTL the client hands the kernel for `getattr`/`lookup` replies.
    #[serde(default = "default_kernel_timeout")]
    pub kernel_attr_timeout_seconds: u64,
    #[serde(default = "default_kernel_timeout")]
    pub kernel_entry_timeout_seconds: u64,
}

fn default_server_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_kernel_timeout() -> u64 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Config {
            path_to_cache: PathBuf::from("./client-cache"),
            cache_interval: 5,
            server_url: default_server_url(),
            kernel_attr_timeout_seconds: default_kernel_timeout(),
            kernel_entry_timeout_seconds: default_kernel_timeout(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("could not read {:?}: {e}", path))?;
        toml::from_str(&content).map_err(|e| format!("could not parse {:?}: {e}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.cache_interval, 5);
        assert_eq!(cfg.server_url, "http://127.0.0.1:8080");
    }

    #[test]
    fn parses_minimal_toml() {
        let toml_src = "path_to_cache = \"/tmp/cache\"\ncache_interval = 3\n";
        let cfg: Config = toml::from_str(toml_src).unwrap();
        assert_eq!(cfg.path_to_cache, PathBuf::from("/tmp/cache"));
        assert_eq!(cfg.cache_interval, 3);
        assert_eq!(cfg.server_url, "http://127.0.0.1:8080");
    }
}
