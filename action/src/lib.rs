//! Declarative GraphQL types and an endpoint adapter for serving them.
//!
//! The crate has two halves. [`descriptor`] lets an application declare GraphQL object and input
//! types as [`TypeDescriptor`]s: a name and an ordered map of fields, where each field's resolver
//! is either given explicitly, found by naming convention on the descriptor, or inferred as a
//! lookup on the parent value. [`endpoint`] turns a set of root query and mutation fields into an
//! executable schema and serves raw requests against it.
//!
//! Execution itself is delegated to the dynamic schema API of [async_graphql].

// Re-export `async_graphql` directly as an escape hatch.
pub extern crate async_graphql;

pub mod config;
pub mod descriptor;
pub mod endpoint;
pub mod error;

pub use descriptor::{
    lookup, resolver, to_field_value, Argument, Attributes, FieldConfig, FieldDescriptor,
    FieldSpec, FieldType, Fields, Record, ResolvedField, ResolvedType, Resolver, TypeDescriptor,
    TypeRegistry,
};
pub use endpoint::{
    build_schema, ErrorLogger, ExecutionResult, GraphQLAction, QueryRequest, RawRequest, Schema,
    TracingLogger,
};
pub use error::Error;

use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber configured from `RUST_LOG`.
///
/// Calling this more than once is harmless; only the first call installs a subscriber.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
