//! Store Module
//!
//! The addressed object store that ties the container, keymap, address
//! generator and read cache together.
//!
//! ## Responsibilities
//! - Load the keymap on open, persist it on flush/close
//! - Allocate a fresh address for every added entity
//! - Write entities as groups stamped with their logical key
//! - Load entities lazily and verify the recorded key
//! - Cache loaded entities when a capacity is configured
//!
//! ## Durability
//! Every record write reaches the container file immediately (and is fsynced
//! per [`SyncStrategy`]), but the keymap is only rewritten on
//! [`Store::flush`] / [`Store::close`]. Entities added since the last
//! flush are unreachable after a crash.

use std::collections::HashMap;
use std::path::Path;

use crate::address::AddressGenerator;
use crate::config::{Config, OpenMode, SyncStrategy};
use crate::container::{Container, ScanReport, KEY_ATTR};
use crate::entity::Entity;
use crate::error::{Result, StashError};
use crate::keymap::KeyMap;
use crate::logging::StoreLogger;
use crate::value::{Attrs, Value};

/// Read path counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Groups loaded from the container by `get()`
    pub group_loads: u64,
    /// `get()` calls served from the cache
    pub cache_hits: u64,
    /// `get()` calls that went to the container
    pub cache_misses: u64,
}

/// Persistent, address-indexed entity store
///
/// ## Concurrency Model: single owner
///
/// Every operation blocks for its I/O and takes `&mut self`; the store is not
/// meant to be shared between writers. Independent processes may open the
/// same file in `Read` mode while nobody writes.
pub struct Store {
    /// Store configuration
    config: Config,

    /// Backing container (None once closed)
    container: Option<Container>,

    /// Authoritative key -> address index until close
    keymap: KeyMap,

    /// Address sequence, replayed from index 0 on every open
    addresses: AddressGenerator,

    /// Loaded entities by key (no eviction)
    cache: HashMap<String, Entity>,

    /// Mutations since the last fsync
    unsynced_writes: usize,

    stats: StoreStats,

    log: StoreLogger,
}

impl Store {
    // =========================================================================
    // Internal Name Constants
    // =========================================================================
    const KEYMAP_BLOB: &'static str = "__KEYMAP__";

    /// Open or create a store with the given config
    ///
    /// On open:
    /// 1. Open/create the container file
    /// 2. Load the keymap blob (absent means empty)
    /// 3. Start a fresh address generator and an empty cache
    pub fn open(config: Config) -> Result<Self> {
        let log = StoreLogger::new(&config.path, config.log_level);
        let addresses = AddressGenerator::new(config.depth, config.width)?;

        let container = Container::open(&config.path, config.mode)?;
        let report = container.scan_report().clone();
        if report.was_truncated {
            log.warn(format_args!(
                "discarded {} bytes of torn tail",
                report.bytes_discarded
            ));
        }

        let keymap = match container.blob(Self::KEYMAP_BLOB)? {
            Some(raw) => KeyMap::decode(&raw)?,
            None => KeyMap::new(),
        };

        log.info(format_args!(
            "opened in {:?} mode: {} keys, {} frames replayed",
            config.mode,
            keymap.len(),
            report.frames_replayed
        ));

        Ok(Self {
            config,
            container: Some(container),
            keymap,
            addresses,
            cache: HashMap::new(),
            unsynced_writes: 0,
            stats: StoreStats::default(),
            log,
        })
    }

    /// Open with a path, mode and cache capacity (other settings default)
    pub fn open_path(path: impl AsRef<Path>, mode: OpenMode, cache_capacity: usize) -> Result<Self> {
        let config = Config::builder()
            .path(path.as_ref())
            .mode(mode)
            .cache_capacity(cache_capacity)
            .build();
        Self::open(config)
    }

    /// Fetch the entity stored under `key`
    ///
    /// Lookup order:
    /// 1. Cache
    /// 2. KeyMap -> address -> group, checked against the recorded key
    pub fn get(&mut self, key: &str) -> Result<Entity> {
        if let Some(entity) = self.cache.get(key) {
            self.stats.cache_hits += 1;
            self.log.trace(format_args!("cache hit for '{}'", key));
            return Ok(entity.clone());
        }
        self.stats.cache_misses += 1;

        let address = self
            .keymap
            .get(key)
            .ok_or_else(|| StashError::NotFound(key.to_string()))?;
        let container = self.container.as_ref().ok_or(StashError::Closed)?;

        let group = container.group(address).ok_or_else(|| StashError::Consistency {
            address: address.to_string(),
            expected: key.to_string(),
            found: None,
        })?;
        if group.recorded_key() != Some(key) {
            return Err(StashError::Consistency {
                address: address.to_string(),
                expected: key.to_string(),
                found: group.recorded_key().map(str::to_string),
            });
        }

        self.log.debug(format_args!("loading '{}' from {}", key, address));
        self.stats.group_loads += 1;
        let entity = Entity::from_group(group);

        if self.config.cache_capacity > 0 {
            // TODO: evict once the cache reaches cache_capacity; entries are
            // currently kept until the key is removed or overwritten.
            self.cache.insert(key.to_string(), entity.clone());
        }
        Ok(entity)
    }

    /// Store `entity` under `key`
    ///
    /// Steps:
    /// 1. Reject an existing key unless `overwrite` is set
    /// 2. Materialize every field
    /// 3. Allocate a free address
    /// 4. With `overwrite`, remove the existing entry
    /// 5. Write the group stamped with `key`, then one dataset per field
    /// 6. Register key -> address in the keymap
    ///
    /// A failure in steps 1-3 (unreadable lazy field, `Exhaustion`) leaves
    /// the store untouched. An I/O failure while writing the new group after
    /// an overwrite loses the old entry.
    pub fn add(&mut self, key: &str, entity: &Entity, overwrite: bool) -> Result<()> {
        self.ensure_writable()?;

        let replacing = self.keymap.contains_key(key);
        if replacing && !overwrite {
            return Err(StashError::AlreadyExists(key.to_string()));
        }

        let mut fields: Vec<(&str, &Value, &Attrs)> = Vec::with_capacity(entity.len());
        for (name, field) in entity.fields() {
            fields.push((name, field.value()?, field.attrs()?));
        }

        let address = {
            let container = self.container.as_ref().ok_or(StashError::Closed)?;
            self.addresses.next_free(|a| container.contains(a))?
        };

        if replacing {
            let freed = self.remove(key)?;
            self.log.debug(format_args!("overwrite of '{}' freed {}", key, freed));
        }

        let container = self.container.as_mut().ok_or(StashError::Closed)?;
        let mut group_attrs = Attrs::new();
        group_attrs.insert(KEY_ATTR.to_string(), Value::Text(key.to_string()));
        container.create_group(&address, group_attrs)?;
        for (name, value, attrs) in fields {
            container.write_dataset(&address, name, value, attrs)?;
        }

        self.keymap.insert(key, address.as_str())?;
        self.cache.remove(key);
        self.log.debug(format_args!(
            "added '{}' at {} ({} fields)",
            key,
            address,
            entity.len()
        ));

        self.after_write()
    }

    /// Delete the entity under `key`, returning its freed address
    pub fn remove(&mut self, key: &str) -> Result<String> {
        self.ensure_writable()?;

        let address = self
            .keymap
            .remove(key)
            .ok_or_else(|| StashError::NotFound(key.to_string()))?;
        self.cache.remove(key);

        let container = self.container.as_mut().ok_or(StashError::Closed)?;
        if container.contains(&address) {
            container.unlink(&address)?;
        } else {
            self.log.warn(format_args!(
                "'{}' pointed at {} which holds no group",
                key, address
            ));
        }
        self.log.debug(format_args!("removed '{}' from {}", key, address));

        self.after_write()?;
        Ok(address)
    }

    /// All registered keys, in no particular order
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.keymap.keys()
    }

    /// All occupied addresses, in no particular order
    pub fn addresses(&self) -> impl Iterator<Item = &str> + '_ {
        self.keymap.addresses()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.keymap.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.keymap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keymap.is_empty()
    }

    /// Persist the keymap and fsync without closing
    pub fn flush(&mut self) -> Result<()> {
        let container = self.container.as_mut().ok_or(StashError::Closed)?;
        if !container.mode().is_writable() {
            return Ok(());
        }

        let encoded = self.keymap.encode()?;
        container.put_blob(Self::KEYMAP_BLOB, &encoded)?;
        container.sync()?;
        self.unsynced_writes = 0;

        self.log.debug(format_args!("flushed keymap ({} keys)", self.keymap.len()));
        Ok(())
    }

    /// Persist the keymap and release the container
    ///
    /// Idempotent: later calls (including the one from `Drop`) do nothing.
    /// If the keymap cannot be written the container stays open, so the
    /// call can be retried.
    pub fn close(&mut self) -> Result<()> {
        if self.container.is_none() {
            return Ok(());
        }

        self.flush()?;
        let closed = match self.container.take() {
            Some(mut container) => container.close(),
            None => Ok(()),
        };
        self.cache.clear();
        self.log.info(format_args!("closed"));
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.container.is_none()
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn stats(&self) -> StoreStats {
        self.stats
    }

    pub fn is_cached(&self, key: &str) -> bool {
        self.cache.contains_key(key)
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// What the open-time replay found, while the store is open
    pub fn scan_report(&self) -> Option<&ScanReport> {
        self.container.as_ref().map(Container::scan_report)
    }

    /// The underlying container, while the store is open
    pub fn container(&self) -> Option<&Container> {
        self.container.as_ref()
    }

    pub fn logger(&self) -> &StoreLogger {
        &self.log
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn ensure_writable(&self) -> Result<()> {
        if self.container.is_none() {
            return Err(StashError::Closed);
        }
        if !self.config.mode.is_writable() {
            return Err(StashError::ReadOnly);
        }
        Ok(())
    }

    /// Apply the sync strategy after a mutation
    fn after_write(&mut self) -> Result<()> {
        self.unsynced_writes += 1;
        let due = match self.config.sync_strategy {
            SyncStrategy::EveryWrite => true,
            SyncStrategy::EveryNWrites { count } => self.unsynced_writes >= count,
            SyncStrategy::OnClose => false,
        };
        if due {
            if let Some(container) = self.container.as_ref() {
                container.sync()?;
            }
            self.unsynced_writes = 0;
        }
        Ok(())
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            self.log.error(format_args!("close on drop failed: {}", e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_close_keeps_container_when_keymap_write_fails() {
        let dir = TempDir::new().unwrap();
        let mut store = Store::open_path(dir.path().join("store.hxs"), OpenMode::Append, 0).unwrap();

        // Release the file under the store so the keymap blob cannot be written
        if let Some(container) = store.container.as_mut() {
            container.close().unwrap();
        }

        assert!(matches!(store.close(), Err(StashError::Closed)));
        assert!(!store.is_closed());
        assert!(matches!(store.close(), Err(StashError::Closed)));
    }
}
