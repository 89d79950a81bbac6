//! Configuration for EntityKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::keys::KeyScheme;

/// Main configuration for an EntityKV client or server
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Key Naming
    // -------------------------------------------------------------------------
    /// Prefixes used to derive urn, sequence and id-index keys
    pub key_scheme: KeyScheme,

    // -------------------------------------------------------------------------
    // Client Configuration
    // -------------------------------------------------------------------------
    /// Address of the server a `RemoteBackend` connects to
    pub server_addr: String,

    // -------------------------------------------------------------------------
    // Server Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max queued client connections waiting for a worker
    pub max_connections: usize,

    /// Number of worker threads serving connections
    pub worker_threads: usize,

    /// Snapshot file used by SAVE / BGSAVE and restored on startup
    pub snapshot_path: Option<PathBuf>,

    // -------------------------------------------------------------------------
    // Timeouts (both sides)
    // -------------------------------------------------------------------------
    /// Connection read timeout (milliseconds, 0 = none)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds, 0 = none)
    pub write_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key_scheme: KeyScheme::default(),
            server_addr: "127.0.0.1:6380".to_string(),
            listen_addr: "127.0.0.1:6380".to_string(),
            max_connections: 1024,
            worker_threads: 8,
            snapshot_path: None,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the key naming scheme
    pub fn key_scheme(mut self, scheme: KeyScheme) -> Self {
        self.config.key_scheme = scheme;
        self
    }

    /// Set the server address used by clients
    pub fn server_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.server_addr = addr.into();
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of queued connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the number of worker threads
    pub fn worker_threads(mut self, count: usize) -> Self {
        self.config.worker_threads = count;
        self
    }

    /// Set the snapshot file path
    pub fn snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.snapshot_path = Some(path.into());
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
