//! Resolution of declared fields into complete fields with resolvers.

use super::{
    record::lookup, resolver, Argument, FieldConfig, FieldSpec, FieldType, Resolver,
    TypeDescriptor,
};
use crate::error::Error;
use async_graphql::dynamic::{FieldFuture, FieldValue, TypeRef};
use async_graphql::{Context, ErrorExtensions, Value};
use indexmap::IndexMap;
use serde_json::Map;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

/// A field whose type and resolver are fully determined.
#[derive(Clone)]
pub struct ResolvedField {
    pub name: String,
    pub ty: FieldType,
    pub resolver: Resolver,
    pub description: Option<String>,
    pub args: Vec<Argument>,
    pub default_value: Option<Value>,
}

impl Debug for ResolvedField {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("ResolvedField")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("args", &self.args)
            .finish()
    }
}

/// Resolve every field declared by `descriptor`, in declaration order.
///
/// Each resolver is wrapped in the descriptor's authorization hook.
pub fn resolve_fields(
    descriptor: &Arc<dyn TypeDescriptor>,
) -> Result<IndexMap<String, ResolvedField>, Error> {
    let ty = descriptor.name();
    let mut resolved = IndexMap::new();
    for (name, spec) in descriptor.fields() {
        let field = match spec {
            FieldSpec::Descriptor(field) => {
                let config = field.to_field(&name, &Map::new())?;
                complete(&ty, &name, config)?
            }
            FieldSpec::Bound { descriptor, config } => {
                let serde_json::Value::Object(config) = config else {
                    return Err(Error::invalid_field(
                        &ty,
                        &name,
                        "bound configuration is not an object",
                    ));
                };
                let config = descriptor.to_field(&name, &config)?;
                complete(&ty, &name, config)?
            }
            FieldSpec::Type(field_ty) => {
                let mut config = FieldConfig::new(field_ty);
                config.resolve = Some(resolve_resolver(descriptor.as_ref(), &name, &config));
                complete(&ty, &name, config)?
            }
            FieldSpec::Config(mut config) => {
                config.resolve = Some(resolve_resolver(descriptor.as_ref(), &name, &config));
                complete(&ty, &name, config)?
            }
        };
        tracing::trace!("resolved field {ty}.{name}: {:?}", field.ty);
        resolved.insert(name, authorize(descriptor, field));
    }
    Ok(resolved)
}

/// Choose the resolver for the field `name` of `descriptor`.
///
/// The first of these which exists is used:
/// 1. the explicit resolver in `field`;
/// 2. the descriptor's `resolve<Name>` method;
/// 3. the descriptor's `resolve<CamelCaseName>Field` method;
/// 4. a lookup of the field's alias, or its name, on the parent value.
pub fn resolve_resolver(
    descriptor: &dyn TypeDescriptor,
    name: &str,
    field: &FieldConfig,
) -> Resolver {
    let chain: [&dyn Fn() -> Option<Resolver>; 3] = [
        &|| field.resolve.clone(),
        &|| descriptor.method(&method_name(name)),
        &|| descriptor.method(&camel_case_method_name(name)),
    ];
    chain
        .iter()
        .find_map(|candidate| candidate())
        .unwrap_or_else(|| {
            let key = match &field.alias {
                Some(alias) if !alias.is_empty() => alias.clone(),
                _ => name.to_string(),
            };
            attribute_resolver(key)
        })
}

/// The `resolve<Name>` method name for a field.
///
/// Only the first character is capitalized: `user_id` becomes `resolveUser_id`.
pub fn method_name(field: &str) -> String {
    format!("resolve{}", ucfirst(field))
}

/// The `resolve<CamelCaseName>Field` method name for a field.
///
/// The field name is split on underscores and each part capitalized: `user_id` becomes
/// `resolveUserIdField`.
pub fn camel_case_method_name(field: &str) -> String {
    let name: String = field.split('_').map(ucfirst).collect();
    format!("resolve{name}Field")
}

fn ucfirst(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// A resolver which reads `key` from the parent value.
fn attribute_resolver(key: String) -> Resolver {
    resolver(move |ctx| {
        let value = lookup(ctx.parent_value, &key);
        FieldFuture::new(async move { Ok(value.map(FieldValue::value)) })
    })
}

/// Wrap the resolver of `field` in the authorization hook of `descriptor`.
///
/// Errors from nullable fields, including a denied hook, are reported against the field's path
/// and the field resolves to null. Errors from non-null fields propagate to the parent.
fn authorize(descriptor: &Arc<dyn TypeDescriptor>, field: ResolvedField) -> ResolvedField {
    let inner = field.resolver.clone();
    let descriptor = descriptor.clone();
    let name = field.name.clone();
    let nullable = !matches!(field.ty.type_ref(), TypeRef::NonNull(_));
    let guarded = resolver(move |ctx| {
        let gql = ctx.ctx;
        if !descriptor.authorize_field(&name, &ctx) {
            tracing::debug!("access to {}.{name} denied", descriptor.name());
            let err = Error::Forbidden {
                field: name.clone(),
            }
            .extend();
            return FieldFuture::new(async move { field_error(gql, err, nullable) });
        }
        match inner(ctx) {
            FieldFuture::Future(fut) => FieldFuture::new(async move {
                match fut.await {
                    Ok(value) => Ok(value),
                    Err(err) => field_error(gql, err, nullable),
                }
            }),
            value => value,
        }
    });
    ResolvedField {
        resolver: guarded,
        ..field
    }
}

/// Report `err` for the field being resolved in `ctx`, or propagate it if the field is non-null.
fn field_error<'a>(
    ctx: &Context<'a>,
    err: async_graphql::Error,
    nullable: bool,
) -> async_graphql::Result<Option<FieldValue<'a>>> {
    if !nullable {
        return Err(err);
    }
    ctx.add_error(ctx.set_error_path(err.into_server_error(ctx.item.pos)));
    Ok(None)
}

/// Turn a field configuration into a complete field.
fn complete(ty: &str, name: &str, config: FieldConfig) -> Result<ResolvedField, Error> {
    let field_ty = config
        .ty
        .ok_or_else(|| Error::invalid_field(ty, name, "field has no type"))?;
    let resolver = config
        .resolve
        .ok_or_else(|| Error::invalid_field(ty, name, "field has no resolver"))?;
    Ok(ResolvedField {
        name: name.to_string(),
        ty: field_ty,
        resolver,
        description: config.description,
        args: config.args,
        default_value: config.default_value,
    })
}
