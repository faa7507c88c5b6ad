//! Declarative GraphQL type definitions.
//!
//! A [`TypeDescriptor`] describes one GraphQL object or input object: its name, an optional
//! description, and an ordered map of [`FieldSpec`]s. The descriptor never builds engine types
//! directly. Instead, a [`TypeRegistry`] resolves the declared fields into [`ResolvedField`]s once
//! per descriptor and hands out the cached [`ResolvedType`] from then on, so that every schema
//! built from the registry refers to the same type definition.
//!
//! Each field resolves through the first of the following which applies:
//! 1. an explicit resolver in the field's [`FieldConfig`];
//! 2. a resolver the descriptor exposes through [`TypeDescriptor::method`] under the name
//!    `resolve<Name>`, where only the first letter of the field name is capitalized;
//! 3. a resolver exposed under the name `resolve<CamelCaseName>Field`, where the field name is
//!    split on underscores and each part capitalized (`user_id` becomes `resolveUserIdField`);
//! 4. a lookup of the field's alias (or its name) on the parent value, which may be a GraphQL
//!    object value or a [`Record`].
//!
//! Fields may also be produced wholesale by a reusable [`FieldDescriptor`].

use crate::error::Error;
use async_graphql::dynamic::{FieldFuture, ResolverContext, TypeRef};
use async_graphql::Value;
use indexmap::IndexMap;
use serde_json::Map;
use std::any::type_name;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

pub mod record;
pub mod registry;
pub mod resolve;

pub use record::{lookup, to_field_value, Attributes, Record};
pub use registry::{ResolvedType, TypeRegistry};
pub use resolve::{resolve_fields, resolve_resolver, ResolvedField};

/// A field resolver, in the shape expected by the dynamic schema engine.
pub type Resolver = Arc<dyn for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync>;

/// Wrap a closure as a [`Resolver`].
pub fn resolver<F>(f: F) -> Resolver
where
    F: for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// The ordered fields of a type, keyed by field name.
pub type Fields = IndexMap<String, FieldSpec>;

/// A GraphQL object or input object type declared by its fields.
pub trait TypeDescriptor: Send + Sync + 'static {
    /// The name of the type. Must be unique across the schema.
    fn name(&self) -> String;

    /// The declared fields, in the order they should appear in the schema.
    fn fields(&self) -> Fields;

    /// A description of the type, included in the schema.
    fn description(&self) -> Option<String> {
        None
    }

    /// Whether this type is an input object rather than an output object.
    fn is_input_object(&self) -> bool {
        false
    }

    /// Look up a resolver method by its conventional name.
    ///
    /// This is the table consulted for `resolve<Name>` and `resolve<CamelCaseName>Field`
    /// resolvers. Returning [`None`] means the descriptor has no such method.
    fn method(&self, _name: &str) -> Option<Resolver> {
        None
    }

    /// Decide whether the field `field` may be resolved in the context `ctx`.
    ///
    /// This is consulted before every field of the type resolves. If it returns `false`, the field
    /// fails with [`Error::Forbidden`] and its resolver is never invoked.
    fn authorize_field(&self, _field: &str, _ctx: &ResolverContext<'_>) -> bool {
        true
    }

    /// A stable identifier for this descriptor, used as its key in the [`TypeRegistry`].
    fn descriptor_id(&self) -> &'static str {
        type_name::<Self>()
    }
}

/// A reusable definition of a single field.
///
/// A field descriptor is bound to a field name, plus any configuration given alongside it, and
/// produces the complete field: type and resolver included.
pub trait FieldDescriptor: Send + Sync + 'static {
    /// Build the field `name` using the bound configuration `config`.
    fn to_field(
        &self,
        name: &str,
        config: &Map<String, serde_json::Value>,
    ) -> Result<FieldConfig, Error>;
}

/// The type of a field or argument.
#[derive(Clone)]
pub enum FieldType {
    /// A type reference understood directly by the engine, such as a scalar.
    Ref(TypeRef),
    /// A reference to another declared type.
    ///
    /// The descriptor is registered in any schema which uses this field. `ty` is the reference to
    /// it, which may wrap the descriptor's name in list or non-null modifiers.
    Nested {
        descriptor: Arc<dyn TypeDescriptor>,
        ty: TypeRef,
    },
}

impl FieldType {
    /// A nullable reference to the type declared by `descriptor`.
    pub fn of(descriptor: impl TypeDescriptor) -> Self {
        Self::shaped(descriptor, TypeRef::named)
    }

    /// A non-null reference to the type declared by `descriptor`.
    pub fn of_nn(descriptor: impl TypeDescriptor) -> Self {
        Self::shaped(descriptor, TypeRef::named_nn)
    }

    /// A non-null list of non-null references to the type declared by `descriptor`.
    pub fn list_of(descriptor: impl TypeDescriptor) -> Self {
        Self::shaped(descriptor, TypeRef::named_nn_list_nn)
    }

    /// A reference to `descriptor`, built from its name by `shape`.
    pub fn shaped(descriptor: impl TypeDescriptor, shape: impl FnOnce(String) -> TypeRef) -> Self {
        let ty = shape(descriptor.name());
        Self::Nested {
            descriptor: Arc::new(descriptor),
            ty,
        }
    }

    /// The engine type reference.
    pub fn type_ref(&self) -> &TypeRef {
        match self {
            Self::Ref(ty) | Self::Nested { ty, .. } => ty,
        }
    }

    /// The declared type this field refers to, if any.
    pub fn descriptor(&self) -> Option<&Arc<dyn TypeDescriptor>> {
        match self {
            Self::Ref(_) => None,
            Self::Nested { descriptor, .. } => Some(descriptor),
        }
    }
}

impl From<TypeRef> for FieldType {
    fn from(ty: TypeRef) -> Self {
        Self::Ref(ty)
    }
}

impl Debug for FieldType {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.type_ref())
    }
}

/// An argument accepted by a field.
#[derive(Clone, Debug)]
pub struct Argument {
    pub name: String,
    pub ty: FieldType,
    pub description: Option<String>,
    pub default_value: Option<Value>,
}

impl Argument {
    pub fn new(name: impl Into<String>, ty: impl Into<FieldType>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            description: None,
            default_value: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

/// The structured configuration of a field.
#[derive(Clone, Default)]
pub struct FieldConfig {
    /// The type of the field. Required.
    pub ty: Option<FieldType>,
    /// The key to look up on the parent value when the field has no resolver of its own.
    pub alias: Option<String>,
    pub description: Option<String>,
    /// An explicit resolver, which takes precedence over all others.
    pub resolve: Option<Resolver>,
    pub args: Vec<Argument>,
    /// The default value, used when this is a field of an input object.
    pub default_value: Option<Value>,
}

impl FieldConfig {
    pub fn new(ty: impl Into<FieldType>) -> Self {
        Self {
            ty: Some(ty.into()),
            ..Default::default()
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn resolve<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync + 'static,
    {
        self.resolve = Some(resolver(f));
        self
    }

    pub fn argument(mut self, arg: Argument) -> Self {
        self.args.push(arg);
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

impl Debug for FieldConfig {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("FieldConfig")
            .field("ty", &self.ty)
            .field("alias", &self.alias)
            .field("description", &self.description)
            .field("resolve", &self.resolve.is_some())
            .field("args", &self.args)
            .field("default_value", &self.default_value)
            .finish()
    }
}

/// One entry in the field map of a [`TypeDescriptor`].
#[derive(Clone)]
pub enum FieldSpec {
    /// A bare type; the resolver is inferred.
    Type(FieldType),
    /// A structured configuration; the resolver is inferred unless given explicitly.
    Config(FieldConfig),
    /// A field built entirely by a field descriptor.
    Descriptor(Arc<dyn FieldDescriptor>),
    /// A field built by a field descriptor with additional configuration bound to it.
    ///
    /// The configuration must be a JSON object.
    Bound {
        descriptor: Arc<dyn FieldDescriptor>,
        config: serde_json::Value,
    },
}

impl FieldSpec {
    pub fn descriptor(descriptor: impl FieldDescriptor) -> Self {
        Self::Descriptor(Arc::new(descriptor))
    }

    pub fn bound(descriptor: impl FieldDescriptor, config: serde_json::Value) -> Self {
        Self::Bound {
            descriptor: Arc::new(descriptor),
            config,
        }
    }
}

impl From<TypeRef> for FieldSpec {
    fn from(ty: TypeRef) -> Self {
        Self::Type(ty.into())
    }
}

impl From<FieldType> for FieldSpec {
    fn from(ty: FieldType) -> Self {
        Self::Type(ty)
    }
}

impl From<FieldConfig> for FieldSpec {
    fn from(config: FieldConfig) -> Self {
        Self::Config(config)
    }
}

/// Build a [`Fields`] map from `name => spec` pairs.
///
/// Specs may be anything convertible into a [`FieldSpec`].
#[macro_export]
macro_rules! fields {
    ($($name:expr => $spec:expr),* $(,)?) => {{
        let mut fields = $crate::Fields::new();
        $(fields.insert(::std::string::String::from($name), $crate::FieldSpec::from($spec));)*
        fields
    }};
}
