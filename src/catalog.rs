//! Catalog seam
//!
//! A catalog is an external directory service mapping names to the
//! [`Config`] needed to open a store. The store never consults one; callers
//! look a config up and pass it to [`Store::open`](crate::Store::open).

use std::collections::HashMap;

use crate::config::Config;
use crate::error::{Result, StashError};

/// Name -> store parameters lookup service
pub trait Catalog {
    /// Parameters registered under `name`, if any
    fn lookup(&self, name: &str) -> Result<Option<Config>>;

    /// Register parameters for `name` exactly once
    ///
    /// Registering identical parameters again is a no-op; different
    /// parameters for a known name fail with `Catalog`.
    fn register(&mut self, name: &str, config: Config) -> Result<()>;
}

/// In-process catalog
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    entries: HashMap<String, Config>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Catalog for MemoryCatalog {
    fn lookup(&self, name: &str) -> Result<Option<Config>> {
        Ok(self.entries.get(name).cloned())
    }

    fn register(&mut self, name: &str, config: Config) -> Result<()> {
        match self.entries.get(name) {
            Some(existing) if *existing == config => Ok(()),
            Some(existing) => Err(StashError::Catalog(format!(
                "'{}' is registered with {:?}, refusing {:?}",
                name, existing, config
            ))),
            None => {
                self.entries.insert(name.to_string(), config);
                Ok(())
            }
        }
    }
}
