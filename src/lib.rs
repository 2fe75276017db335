//! # hexstash
//!
//! A persistent, address-indexed object store for large numeric datasets:
//! - Single container file holding every entity and the key index
//! - Deterministic hierarchical addresses (`"04/1b/22"`)
//! - Lazy fields that read arrays only when (and as much as) they are sliced
//! - Torn-tail recovery on open
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Store                               │
//! │          get / add / remove / keys / flush / close           │
//! └──────┬───────────────┬────────────────┬─────────────────────┘
//!        │               │                │
//!        ▼               ▼                ▼
//!  ┌───────────┐  ┌─────────────┐  ┌─────────────┐
//!  │  KeyMap   │  │  Address    │  │   Cache     │
//!  │ key<->addr│  │  Generator  │  │ key->Entity │
//!  └─────┬─────┘  └──────┬──────┘  └─────────────┘
//!        │               │
//!        ▼               ▼
//!  ┌─────────────────────────────────────────────┐
//!  │                 Container                    │
//!  │   __KEYMAP__ blob  +  groups at addresses    │
//!  └──────────────────────┬──────────────────────┘
//!                         │ DatasetHandle
//!                         ▼
//!                ┌─────────────────┐
//!                │ Entity / Field  │
//!                │ (eager | lazy)  │
//!                └─────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use hexstash::{Entity, OpenMode, Store};
//!
//! # fn main() -> hexstash::Result<()> {
//! let mut store = Store::open_path("data.hxs", OpenMode::Append, 0)?;
//! let entity = Entity::builder()
//!     .field("label", "kick")
//!     .field("samples", vec![0.0f32, 0.5, -0.5, 0.25])
//!     .build();
//! store.add("track-1", &entity, false)?;
//!
//! let loaded = store.get("track-1")?;
//! let head = loaded["samples"].slice(&[0..2])?;
//! assert_eq!(head.to_vec::<f32>()?, vec![0.0, 0.5]);
//! store.close()?;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod logging;

pub mod address;
pub mod keymap;
pub mod value;
pub mod field;
pub mod entity;
pub mod container;
pub mod store;
pub mod catalog;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{StashError, Result};
pub use config::{Config, OpenMode, SyncStrategy};
pub use address::AddressGenerator;
pub use keymap::KeyMap;
pub use value::{Array, Attrs, DType, Element, Value};
pub use field::{EagerField, Field, LazyField};
pub use entity::{stack_entities, Entity, EntityBuilder};
pub use store::{Store, StoreStats};
pub use catalog::{Catalog, MemoryCatalog};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of hexstash
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
