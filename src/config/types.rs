use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::backend::DirectoryStore;
use crate::streaming::{RetryPolicy, StreamSettings};
use streamgate_common::DcId;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub streaming: StreamingConfig,

    #[serde(default)]
    pub identities: Vec<IdentityConfig>,

    #[serde(default)]
    pub stores: Vec<StoreConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Public base URL used when printing download links.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: default_base_url(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamingConfig {
    /// Bytes per backend fetch (default: 1 MiB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Seconds between wholesale descriptor cache clears (default: 30 minutes)
    #[serde(default = "default_cache_clear_interval")]
    pub cache_clear_interval_secs: u64,

    /// Upper bound on one chunk fetch in seconds
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Authorization import attempts before a datacenter is given up
    #[serde(default = "default_auth_max_attempts")]
    pub auth_max_attempts: u32,

    /// Pause after a connection error during authorization
    #[serde(default = "default_auth_backoff")]
    pub auth_backoff_secs: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            cache_clear_interval_secs: default_cache_clear_interval(),
            fetch_timeout_secs: default_fetch_timeout(),
            auth_max_attempts: default_auth_max_attempts(),
            auth_backoff_secs: default_auth_backoff(),
        }
    }
}

impl StreamingConfig {
    pub fn settings(&self) -> StreamSettings {
        StreamSettings {
            chunk_size: self.chunk_size,
            cache_clear_interval: Duration::from_secs(self.cache_clear_interval_secs),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            retry: RetryPolicy {
                max_attempts: self.auth_max_attempts,
                backoff: Duration::from_secs(self.auth_backoff_secs),
            },
        }
    }
}

fn default_chunk_size() -> u64 {
    1024 * 1024
}

fn default_cache_clear_interval() -> u64 {
    30 * 60
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_auth_max_attempts() -> u32 {
    6
}

fn default_auth_backoff() -> u64 {
    2
}

/// A backend identity.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IdentityConfig {
    pub name: String,

    /// Datacenter holding this identity's credential
    pub home_dc: i32,
}

/// A store directory served by the directory backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    pub id: i64,

    /// Datacenter the store lives in
    pub dc: i32,

    pub path: PathBuf,
}

impl From<&StoreConfig> for DirectoryStore {
    fn from(store: &StoreConfig) -> Self {
        DirectoryStore {
            id: store.id,
            dc: DcId(store.dc),
            path: PathBuf::from(shellexpand::tilde(&store.path.to_string_lossy()).as_ref()),
        }
    }
}
