//! Cache of constructed types.
//!
//! The engine requires every reference to a type within a schema to agree on a single definition.
//! The [`TypeRegistry`] guarantees this by resolving each [`TypeDescriptor`] at most once, even
//! when several threads race to build schemas, and handing out the same [`ResolvedType`] to every
//! caller afterwards.

use super::{resolve_fields, ResolvedField, TypeDescriptor};
use crate::error::Error;
use async_graphql::dynamic::{Field, InputObject, InputValue, Object, SchemaBuilder};
use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use std::any::type_name;
use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::sync::{Arc, Mutex, PoisonError};

/// A type whose fields have been resolved, ready to be registered in a schema.
#[derive(Clone, Debug)]
pub struct ResolvedType {
    pub name: String,
    pub description: Option<String>,
    pub is_input_object: bool,
    pub fields: IndexMap<String, ResolvedField>,
}

impl ResolvedType {
    /// Resolve the fields of `descriptor`.
    pub fn resolve(descriptor: &Arc<dyn TypeDescriptor>) -> Result<Self, Error> {
        Ok(Self {
            name: descriptor.name(),
            description: descriptor.description(),
            is_input_object: descriptor.is_input_object(),
            fields: resolve_fields(descriptor)?,
        })
    }

    /// Register this type in a schema under construction.
    pub fn register(&self, schema: SchemaBuilder) -> SchemaBuilder {
        if self.is_input_object {
            schema.register(self.input_object())
        } else {
            schema.register(self.object())
        }
    }

    /// Build the engine's output object for this type.
    pub fn object(&self) -> Object {
        let mut object = Object::new(&self.name);
        if let Some(description) = &self.description {
            object = object.description(description);
        }
        for field in self.fields.values() {
            let resolver = field.resolver.clone();
            let mut gql_field = Field::new(&field.name, field.ty.type_ref().clone(), move |ctx| {
                resolver(ctx)
            });
            if let Some(description) = &field.description {
                gql_field = gql_field.description(description);
            }
            for arg in &field.args {
                let mut input = InputValue::new(&arg.name, arg.ty.type_ref().clone());
                if let Some(description) = &arg.description {
                    input = input.description(description);
                }
                if let Some(default) = &arg.default_value {
                    input = input.default_value(default.clone());
                }
                gql_field = gql_field.argument(input);
            }
            object = object.field(gql_field);
        }
        object
    }

    /// Build the engine's input object for this type.
    pub fn input_object(&self) -> InputObject {
        let mut object = InputObject::new(&self.name);
        if let Some(description) = &self.description {
            object = object.description(description);
        }
        for field in self.fields.values() {
            let mut input = InputValue::new(&field.name, field.ty.type_ref().clone());
            if let Some(description) = &field.description {
                input = input.description(description);
            }
            if let Some(default) = &field.default_value {
                input = input.default_value(default.clone());
            }
            object = object.field(input);
        }
        object
    }
}

/// A shared cache of [`ResolvedType`]s, keyed by [`TypeDescriptor::descriptor_id`].
///
/// Entries are created the first time a descriptor is looked up and live as long as the registry.
#[derive(Default)]
pub struct TypeRegistry {
    inner: Mutex<Entries>,
}

#[derive(Default)]
struct Entries {
    types: HashMap<&'static str, Arc<OnceCell<Arc<ResolvedType>>>>,
    // Which descriptor owns each type name.
    names: HashMap<String, &'static str>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The type declared by `descriptor`, constructing it on first use.
    ///
    /// Every call for the same descriptor returns the identical [`ResolvedType`], and the
    /// descriptor's fields are resolved at most once, even under concurrent first access.
    pub fn type_of(
        &self,
        descriptor: &Arc<dyn TypeDescriptor>,
    ) -> Result<Arc<ResolvedType>, Error> {
        let id = descriptor.descriptor_id();
        let cell = {
            let mut entries = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            match entries.types.get(id) {
                Some(cell) => cell.clone(),
                None => {
                    let name = descriptor.name();
                    if let Some(&owner) = entries.names.get(&name) {
                        return Err(Error::DuplicateTypeName {
                            name,
                            first: owner,
                            second: id,
                        });
                    }
                    entries.names.insert(name, id);
                    entries.types.entry(id).or_default().clone()
                }
            }
        };

        // Built outside the registry lock. Racing callers block on the cell until the first
        // constructor finishes.
        cell.get_or_try_init(|| {
            tracing::debug!("constructing GraphQL type {}", descriptor.name());
            ResolvedType::resolve(descriptor).map(Arc::new)
        })
        .cloned()
    }

    /// The type declared by `T`, constructing it from `T::default()` on first use.
    pub fn get<T: TypeDescriptor + Default>(&self) -> Result<Arc<ResolvedType>, Error> {
        if let Some(ty) = self.cached(type_name::<T>()) {
            return Ok(ty);
        }
        self.type_of(&(Arc::new(T::default()) as Arc<dyn TypeDescriptor>))
    }

    /// The cached type with descriptor id `id`, if it has been constructed.
    pub fn cached(&self, id: &str) -> Option<Arc<ResolvedType>> {
        let entries = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        entries.types.get(id)?.get().cloned()
    }

    /// The number of constructed types.
    pub fn len(&self) -> usize {
        let entries = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        entries.types.values().filter(|cell| cell.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Debug for TypeRegistry {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let entries = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("TypeRegistry")
            .field("types", &entries.names)
            .finish()
    }
}
