//! Entities
//!
//! An entity is an insertion-ordered `name -> Field` record and the unit of
//! storage. Values set on an entity are wrapped in eager fields; entities
//! loaded from a store hold lazy fields bound to the stored datasets, so no
//! data is copied until a field is touched.
//!
//! ```
//! use hexstash::Entity;
//!
//! let mut e = Entity::builder()
//!     .field("a", 3)
//!     .field("b", "im_a_string")
//!     .field("c", vec![1i64, 2, 3])
//!     .build();
//!
//! assert_eq!(e["a"].value().unwrap().as_int(), Some(3));
//! e.set("a", 13);
//! assert_eq!(e.get("a").unwrap().as_int(), Some(13));
//! assert_eq!(e.names().collect::<Vec<_>>(), ["a", "b", "c"]);
//! ```

use std::collections::BTreeMap;
use std::ops::Index;

use bytes::BytesMut;

use crate::container::GroupHandle;
use crate::error::{Result, StashError};
use crate::field::Field;
use crate::value::{Array, DType, Value};

/// Named, ordered collection of fields
#[derive(Debug, Clone, Default)]
pub struct Entity {
    fields: Vec<(String, Field)>,
}

impl Entity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> EntityBuilder {
        EntityBuilder::default()
    }

    /// Entity of lazy fields over a stored group's datasets
    pub fn from_group(group: GroupHandle) -> Self {
        let fields = group
            .into_datasets()
            .into_iter()
            .map(|handle| (handle.name().to_string(), Field::lazy(handle)))
            .collect();
        Self { fields }
    }

    /// Set a field from a value, replacing any field of that name
    ///
    /// Returns the replaced field.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Field> {
        self.set_field(name, Field::new(value))
    }

    /// Set a prepared field (eager with attrs, or lazy from another entity)
    pub fn set_field(&mut self, name: impl Into<String>, field: Field) -> Option<Field> {
        let name = name.into();
        match self.position(&name) {
            Some(i) => Some(std::mem::replace(&mut self.fields[i].1, field)),
            None => {
                self.fields.push((name, field));
                None
            }
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.position(name).map(|i| &self.fields[i].1)
    }

    /// The value of a field, materializing it if lazy
    pub fn get(&self, name: &str) -> Result<&Value> {
        self.field(name)
            .ok_or_else(|| StashError::FieldNotFound(name.to_string()))?
            .value()
    }

    pub fn remove(&mut self, name: &str) -> Option<Field> {
        let i = self.position(name)?;
        Some(self.fields.remove(i).1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Field names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Field)> + '_ {
        self.fields.iter().map(|(n, f)| (n.as_str(), f))
    }

    /// All values in order (materializes lazy fields)
    pub fn values(&self) -> Result<Vec<&Value>> {
        self.fields.iter().map(|(_, f)| f.value()).collect()
    }

    /// `(name, value)` pairs in order (materializes lazy fields)
    pub fn items(&self) -> Result<Vec<(&str, &Value)>> {
        self.fields
            .iter()
            .map(|(n, f)| Ok((n.as_str(), f.value()?)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Deep copy with every field read into memory
    pub fn materialize(&self) -> Result<Entity> {
        let fields = self
            .fields
            .iter()
            .map(|(n, f)| Ok((n.clone(), Field::Eager(f.to_eager()?))))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { fields })
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|(n, _)| n == name)
    }
}

impl Index<&str> for Entity {
    type Output = Field;

    /// Panics if the field does not exist; use [`Entity::field`] to check.
    fn index(&self, name: &str) -> &Field {
        match self.field(name) {
            Some(field) => field,
            None => panic!("entity has no field named '{}'", name),
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Entity
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut entity = Entity::new();
        for (name, value) in iter {
            entity.set(name, value);
        }
        entity
    }
}

impl IntoIterator for Entity {
    type Item = (String, Field);
    type IntoIter = std::vec::IntoIter<(String, Field)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

/// Builder for Entity
#[derive(Default)]
pub struct EntityBuilder {
    entity: Entity,
}

impl EntityBuilder {
    /// Add a field from a value
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entity.set(name, value);
        self
    }

    /// Add a prepared field
    pub fn field_with(mut self, name: impl Into<String>, field: impl Into<Field>) -> Self {
        self.entity.set_field(name, field.into());
        self
    }

    pub fn build(self) -> Entity {
        self.entity
    }
}

// =============================================================================
// Batching
// =============================================================================

/// Stack same-named fields of several entities along a new leading axis
///
/// Every entity must carry the fields of the first one. Array fields must
/// agree on dtype and shape; int, float and bool scalars become 1-d arrays.
/// Text fields cannot be stacked.
pub fn stack_entities(entities: &[Entity]) -> Result<BTreeMap<String, Array>> {
    let mut stacked = BTreeMap::new();
    let first = match entities.first() {
        Some(first) => first,
        None => return Ok(stacked),
    };

    for name in first.names() {
        let values = entities
            .iter()
            .map(|e| e.get(name))
            .collect::<Result<Vec<&Value>>>()?;
        stacked.insert(name.to_string(), stack_values(name, &values)?);
    }
    Ok(stacked)
}

fn stack_values(name: &str, values: &[&Value]) -> Result<Array> {
    let template = values[0];
    let (dtype, inner_shape) = match template {
        Value::Int(_) => (DType::I64, Vec::new()),
        Value::Float(_) => (DType::F64, Vec::new()),
        Value::Bool(_) => (DType::Bool, Vec::new()),
        Value::Array(a) => (a.dtype(), a.shape().to_vec()),
        Value::Text(_) => {
            return Err(StashError::TypeMismatch {
                expected: format!("stackable value for field '{}'", name),
                found: "text".to_string(),
            })
        }
    };

    let mut data = BytesMut::new();
    for value in values {
        if value.kind() != template.kind() {
            return Err(StashError::TypeMismatch {
                expected: template.kind().name(),
                found: value.kind().name(),
            });
        }
        data.extend_from_slice(&value.encode());
    }

    let mut shape = Vec::with_capacity(inner_shape.len() + 1);
    shape.push(values.len());
    shape.extend(inner_shape);
    Array::from_raw(dtype, shape, data.freeze())
}
