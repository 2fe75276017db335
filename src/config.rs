//! Configuration for hexstash
//!
//! Centralized configuration with sensible defaults. A `Config` is the full
//! parameter set needed to open a [`Store`](crate::Store); it serializes so an
//! external directory service can hand it back later.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

use crate::address::{DEFAULT_DEPTH, DEFAULT_WIDTH};

/// Main configuration for a Store instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Container Configuration
    // -------------------------------------------------------------------------
    /// Backing container file (single file holding the keymap and all groups)
    pub path: PathBuf,

    /// How the container file is opened
    pub mode: OpenMode,

    /// Sync strategy: how often to fsync container writes
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Addressing Configuration
    // -------------------------------------------------------------------------
    /// Number of segments in an address
    pub depth: u32,

    /// Children per address tree node (at most 256)
    pub width: u32,

    // -------------------------------------------------------------------------
    // Read Path Configuration
    // -------------------------------------------------------------------------
    /// Number of entities to keep cached after `get()` (0 disables caching)
    pub cache_capacity: usize,

    // -------------------------------------------------------------------------
    // Logging Configuration
    // -------------------------------------------------------------------------
    /// Verbosity of this store's log events
    #[serde(with = "level_filter_serde")]
    pub log_level: LevelFilter,
}

/// Container open mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenMode {
    /// Existing file, no mutation allowed
    Read,

    /// Existing file, read and write
    ReadWrite,

    /// Create the file, truncating any existing content
    Write,

    /// Create the file, failing if it already exists
    Create,

    /// Open the file if present, create it otherwise
    Append,
}

impl OpenMode {
    /// Whether this mode permits mutation
    pub fn is_writable(self) -> bool {
        !matches!(self, OpenMode::Read)
    }
}

/// Container sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStrategy {
    /// fsync after every add/remove (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted add/remove calls
    EveryNWrites { count: usize },

    /// fsync only on flush/close
    OnClose,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./hexstash.hxs"),
            mode: OpenMode::Append,
            sync_strategy: SyncStrategy::EveryNWrites { count: 100 },
            depth: DEFAULT_DEPTH,
            width: DEFAULT_WIDTH,
            cache_capacity: 0,
            log_level: LevelFilter::INFO,
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
    /// Set the container file path
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Set the open mode
    pub fn mode(mut self, mode: OpenMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the address depth
    pub fn depth(mut self, depth: u32) -> Self {
        self.config.depth = depth;
        self
    }

    /// Set the address width
    pub fn width(mut self, width: u32) -> Self {
        self.config.width = width;
        self
    }

    /// Set the entity cache capacity (0 disables caching)
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache_capacity = capacity;
        self
    }

    /// Set the store's log verbosity
    pub fn log_level(mut self, level: LevelFilter) -> Self {
        self.config.log_level = level;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

mod level_filter_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use tracing::level_filters::LevelFilter;

    pub fn serialize<S: Serializer>(level: &LevelFilter, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(level)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<LevelFilter, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
