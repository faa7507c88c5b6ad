//! Parent values understood by the default field resolver.
//!
//! A field with no resolver of its own looks up its alias (or name) on the parent value. The parent
//! may be a GraphQL object value, in which case the key is looked up in the object's map, or a
//! [`Record`], in which case the key is looked up through the wrapped [`Attributes`]. Keys
//! containing dots are treated as paths into nested objects when no attribute matches the whole
//! key, so an alias of `address.city` reads the `city` of the parent's `address`.

use async_graphql::dynamic::FieldValue;
use async_graphql::{indexmap::IndexMap, Name, Value};
use serde::Serialize;

/// An object with named attributes.
pub trait Attributes: Send + Sync + 'static {
    /// The value of the attribute `name`, if there is one.
    fn attribute(&self, name: &str) -> Option<Value>;
}

impl Attributes for IndexMap<Name, Value> {
    fn attribute(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl Attributes for serde_json::Map<String, serde_json::Value> {
    fn attribute(&self, name: &str) -> Option<Value> {
        Value::from_json(self.get(name)?.clone()).ok()
    }
}

/// A parent value backed by arbitrary [`Attributes`].
pub struct Record(Box<dyn Attributes>);

impl Record {
    pub fn new(attributes: impl Attributes) -> Self {
        Self(Box::new(attributes))
    }

    /// The value of the attribute `name`, if there is one.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        self.0.attribute(name)
    }

    /// Wrap this record so it can be returned from a resolver.
    pub fn into_field_value(self) -> FieldValue<'static> {
        FieldValue::owned_any(self)
    }
}

/// Serialize `value` into a parent value for the default resolver.
pub fn to_field_value<T: Serialize>(value: &T) -> async_graphql::Result<FieldValue<'static>> {
    Ok(FieldValue::value(async_graphql::to_value(value)?))
}

/// Look up `key` on a parent value, as the default resolver does.
pub fn lookup(parent: &FieldValue<'_>, key: &str) -> Option<Value> {
    if let Some(value) = parent.as_value() {
        value_at(value, key)
    } else if let Some(record) = parent.downcast_ref::<Record>() {
        path(key, &|key| record.attribute(key))
    } else {
        None
    }
}

fn value_at(value: &Value, key: &str) -> Option<Value> {
    path(key, &|key| match value {
        Value::Object(fields) => fields.get(key).cloned(),
        _ => None,
    })
}

fn path(key: &str, get: &dyn Fn(&str) -> Option<Value>) -> Option<Value> {
    get(key).or_else(|| {
        let (head, tail) = key.rsplit_once('.')?;
        value_at(&path(head, get)?, tail)
    })
}
