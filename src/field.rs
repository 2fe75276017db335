//! Fields
//!
//! A field is one value plus an attribute map, in one of two forms:
//!
//! - **Eager**: the value is resident in memory.
//! - **Lazy**: the value lives in the container. `value()` reads it on first
//!   access and caches it; `slice()` reads only the requested window;
//!   `attrs()` is read on first access.
//!
//! Both forms answer the same calls, so callers never need to know which one
//! they hold. A lazy field's cache is shared by its clones, and a value once
//! read stays valid after the container is closed.

use std::ops::Range;
use std::sync::{Arc, OnceLock};

use crate::container::DatasetHandle;
use crate::error::Result;
use crate::value::{Array, Attrs, Value};

/// One entity field, eager or lazy
#[derive(Debug, Clone)]
pub enum Field {
    Eager(EagerField),
    Lazy(LazyField),
}

impl Field {
    /// Wrap a value in an eager field (sequences become arrays)
    pub fn new(value: impl Into<Value>) -> Self {
        Field::Eager(EagerField::new(value))
    }

    /// Wrap a stored dataset in a lazy field
    pub fn lazy(handle: DatasetHandle) -> Self {
        Field::Lazy(LazyField::new(handle))
    }

    /// The full value, materializing a lazy field on first call
    pub fn value(&self) -> Result<&Value> {
        match self {
            Field::Eager(f) => Ok(f.value()),
            Field::Lazy(f) => f.value(),
        }
    }

    pub fn attrs(&self) -> Result<&Attrs> {
        match self {
            Field::Eager(f) => Ok(f.attrs()),
            Field::Lazy(f) => f.attrs(),
        }
    }

    /// A rectangular window of an array value
    pub fn slice(&self, ranges: &[Range<usize>]) -> Result<Array> {
        match self {
            Field::Eager(f) => f.slice(ranges),
            Field::Lazy(f) => f.slice(ranges),
        }
    }

    /// Shape of the value; never forces a read
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Field::Eager(f) => f.value().shape(),
            Field::Lazy(f) => f.shape(),
        }
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self, Field::Lazy(_))
    }

    /// Whether the value is resident in memory
    pub fn is_materialized(&self) -> bool {
        match self {
            Field::Eager(_) => true,
            Field::Lazy(f) => f.is_materialized(),
        }
    }

    /// Copy into an eager field, reading value and attrs if needed
    pub fn to_eager(&self) -> Result<EagerField> {
        match self {
            Field::Eager(f) => Ok(f.clone()),
            Field::Lazy(f) => Ok(EagerField {
                value: f.value()?.clone(),
                attrs: f.attrs()?.clone(),
            }),
        }
    }

    pub fn into_eager(self) -> Result<EagerField> {
        match self {
            Field::Eager(f) => Ok(f),
            lazy => lazy.to_eager(),
        }
    }
}

impl From<EagerField> for Field {
    fn from(f: EagerField) -> Self {
        Field::Eager(f)
    }
}

impl From<LazyField> for Field {
    fn from(f: LazyField) -> Self {
        Field::Lazy(f)
    }
}

// =============================================================================
// Eager Field
// =============================================================================

/// Field whose value is already in memory
#[derive(Debug, Clone, PartialEq)]
pub struct EagerField {
    value: Value,
    attrs: Attrs,
}

impl EagerField {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            attrs: Attrs::new(),
        }
    }

    pub fn with_attrs(value: impl Into<Value>, attrs: Attrs) -> Self {
        Self {
            value: value.into(),
            attrs,
        }
    }

    /// Builder-style attribute setter
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut Attrs {
        &mut self.attrs
    }

    pub fn slice(&self, ranges: &[Range<usize>]) -> Result<Array> {
        self.value.slice(ranges)
    }

    pub fn into_parts(self) -> (Value, Attrs) {
        (self.value, self.attrs)
    }
}

// =============================================================================
// Lazy Field
// =============================================================================

/// Field backed by a dataset in the container
#[derive(Debug, Clone)]
pub struct LazyField {
    inner: Arc<LazyInner>,
}

#[derive(Debug)]
struct LazyInner {
    handle: DatasetHandle,
    value: OnceLock<Value>,
    attrs: OnceLock<Attrs>,
}

impl LazyField {
    pub fn new(handle: DatasetHandle) -> Self {
        Self {
            inner: Arc::new(LazyInner {
                handle,
                value: OnceLock::new(),
                attrs: OnceLock::new(),
            }),
        }
    }

    /// Read the whole value once, then serve it from memory
    pub fn value(&self) -> Result<&Value> {
        if let Some(value) = self.inner.value.get() {
            return Ok(value);
        }
        let value = self.inner.handle.read_value()?;
        Ok(self.inner.value.get_or_init(|| value))
    }

    pub fn attrs(&self) -> Result<&Attrs> {
        if let Some(attrs) = self.inner.attrs.get() {
            return Ok(attrs);
        }
        let attrs = self.inner.handle.read_attrs()?;
        Ok(self.inner.attrs.get_or_init(|| attrs))
    }

    /// Slice from the cached value if present, otherwise read just the window
    pub fn slice(&self, ranges: &[Range<usize>]) -> Result<Array> {
        match self.inner.value.get() {
            Some(value) => value.slice(ranges),
            None => self.inner.handle.read_window(ranges),
        }
    }

    pub fn shape(&self) -> Vec<usize> {
        self.inner.handle.shape()
    }

    pub fn is_materialized(&self) -> bool {
        self.inner.value.get().is_some()
    }

    pub fn handle(&self) -> &DatasetHandle {
        &self.inner.handle
    }
}
