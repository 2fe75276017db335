//! KeyMap
//!
//! In-memory bidirectional mapping between logical keys and container
//! addresses. The whole map is persisted as one UTF-8 JSON object
//! (`{"key": "address", ...}`) and rewritten in full on flush/close, never
//! incrementally.

use std::collections::{BTreeMap, HashMap};

use crate::error::{Result, StashError};

/// Bijective `key <-> address` index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyMap {
    /// key -> address
    forward: HashMap<String, String>,
    /// address -> key
    reverse: HashMap<String, String>,
}

impl KeyMap {
    /// Create an empty KeyMap
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a persisted keymap blob
    ///
    /// Rejects blobs that bind one address to two keys.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let raw: BTreeMap<String, String> = serde_json::from_slice(bytes)?;

        let mut keymap = Self::new();
        for (key, address) in raw {
            if let Some(other) = keymap.reverse.get(&address) {
                return Err(StashError::Corruption(format!(
                    "keymap binds address {} to both '{}' and '{}'",
                    address, other, key
                )));
            }
            keymap.reverse.insert(address.clone(), key.clone());
            keymap.forward.insert(key, address);
        }
        Ok(keymap)
    }

    /// Encode the full map as a JSON object (keys sorted for stable output)
    pub fn encode(&self) -> Result<Vec<u8>> {
        let ordered: BTreeMap<&str, &str> = self
            .forward
            .iter()
            .map(|(k, a)| (k.as_str(), a.as_str()))
            .collect();
        Ok(serde_json::to_vec(&ordered)?)
    }

    /// Look up the address for a key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.forward.get(key).map(String::as_str)
    }

    /// Look up the key registered at an address
    pub fn key_for(&self, address: &str) -> Option<&str> {
        self.reverse.get(address).map(String::as_str)
    }

    /// Bind `key` to `address`, returning the address previously bound to `key`
    ///
    /// Fails with `Consistency` if `address` already belongs to another key.
    pub fn insert(&mut self, key: impl Into<String>, address: impl Into<String>) -> Result<Option<String>> {
        let key = key.into();
        let address = address.into();

        if let Some(owner) = self.reverse.get(&address) {
            if *owner != key {
                return Err(StashError::Consistency {
                    address,
                    expected: key,
                    found: Some(owner.clone()),
                });
            }
        }

        let previous = self.forward.insert(key.clone(), address.clone());
        if let Some(old) = &previous {
            self.reverse.remove(old);
        }
        self.reverse.insert(address, key);
        Ok(previous)
    }

    /// Remove a key, returning the freed address
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let address = self.forward.remove(key)?;
        self.reverse.remove(&address);
        Some(address)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.forward.contains_key(key)
    }

    pub fn contains_address(&self, address: &str) -> bool {
        self.reverse.contains_key(address)
    }

    /// All registered keys, unordered
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.forward.keys().map(String::as_str)
    }

    /// All occupied addresses, unordered
    pub fn addresses(&self) -> impl Iterator<Item = &str> + '_ {
        self.forward.values().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}
