//! A GraphQL endpoint built from declared root fields.
//!
//! A [`GraphQLAction`] owns the fields of the root `Query` and `Mutation` types. It assembles them,
//! together with every type reachable from them, into an executable [`Schema`], and serves raw
//! requests against that schema:
//!
//! ```
//! # async fn example() -> Result<(), graphql_action::Error> {
//! use graphql_action::async_graphql::{dynamic::{FieldFuture, TypeRef}, Value};
//! use graphql_action::{fields, FieldConfig, GraphQLAction, RawRequest, TypeRegistry};
//! use std::sync::Arc;
//!
//! let action = GraphQLAction::new(Arc::new(TypeRegistry::new())).with_queries(fields! {
//!     "name" => FieldConfig::new(TypeRef::named_nn(TypeRef::STRING)).resolve(|_| {
//!         FieldFuture::new(async move { Ok(Some(Value::from("Ada"))) })
//!     }),
//! });
//! let schema = action.build_schema()?;
//!
//! let raw = RawRequest::default().with_body(r#"{"query":"{ name }","variables":{}}"#);
//! let body = action.run(&schema, &raw, Default::default()).await?;
//! assert_eq!(body, serde_json::json!({ "data": { "name": "Ada" } }));
//! # Ok(())
//! # }
//! # async_std::task::block_on(example()).unwrap();
//! ```

use crate::{
    config::Options,
    descriptor::{Fields, ResolvedType, TypeDescriptor, TypeRegistry},
    error::Error,
};
use async_graphql::{dynamic, Data, ServerError};
use std::collections::HashSet;
use std::sync::Arc;

pub mod logger;
pub mod request;
pub mod response;

pub use logger::{ErrorLogger, TracingLogger};
pub use request::{parse_request, QueryRequest, RawRequest};
pub use response::ExecutionResult;

/// The names of the root types.
pub const QUERY: &str = "Query";
pub const MUTATION: &str = "Mutation";

/// An executable schema.
pub struct Schema {
    // `None` if there are no query fields, which the engine cannot represent.
    inner: Option<dynamic::Schema>,
}

impl Schema {
    /// Execute a request against this schema.
    pub async fn execute(
        &self,
        request: impl Into<async_graphql::Request>,
    ) -> async_graphql::Response {
        let request: async_graphql::Request = request.into();
        match &self.inner {
            Some(schema) => schema.execute(request).await,
            None => async_graphql::Response::from_errors(vec![ServerError::new(
                "the schema has no query fields",
                None,
            )]),
        }
    }

    /// Whether the schema has no queryable fields.
    pub fn is_empty(&self) -> bool {
        self.inner.is_none()
    }

    /// The schema in GraphQL SDL.
    pub fn sdl(&self) -> String {
        self.inner.as_ref().map(dynamic::Schema::sdl).unwrap_or_default()
    }
}

/// Assemble an executable schema from root query and mutation fields.
///
/// Root fields resolve exactly like the fields of a [`TypeDescriptor`]. Every declared type
/// reachable from them, through field types or argument types, is registered once, using the
/// cached definition from `registry`.
///
/// If there are no mutation fields, the schema has no mutation type. If there are no query fields
/// either, the schema is empty: building it succeeds, but every request against it fails with a
/// GraphQL error.
pub fn build_schema(
    registry: &TypeRegistry,
    queries: &Fields,
    mutations: &Fields,
) -> Result<Schema, Error> {
    if queries.is_empty() {
        if !mutations.is_empty() {
            return Err(Error::Schema(
                "a schema with mutations needs at least one query field".into(),
            ));
        }
        tracing::warn!("GraphQL schema has no query fields");
        return Ok(Schema { inner: None });
    }

    let query = root_type(QUERY, queries)?;
    let mutation = if mutations.is_empty() {
        None
    } else {
        Some(root_type(MUTATION, mutations)?)
    };
    let roots = [Some(&query), mutation.as_ref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();

    let mut types = Reachable {
        registry,
        roots: roots.iter().map(|root| root.name.clone()).collect(),
        seen: HashSet::new(),
        types: vec![],
    };
    let mut schema = dynamic::Schema::build(QUERY, mutation.as_ref().map(|_| MUTATION), None);
    for root in roots {
        types.visit(root)?;
        schema = root.register(schema);
    }
    for ty in &types.types {
        schema = ty.register(schema);
    }
    tracing::info!(
        "built GraphQL schema with {} query fields, {} mutation fields and {} types",
        queries.len(),
        mutations.len(),
        types.types.len()
    );
    let schema = schema
        .finish()
        .map_err(|err| Error::Schema(err.to_string()))?;
    Ok(Schema {
        inner: Some(schema),
    })
}

/// A root type. Unlike other types, root types are not cached in the registry.
struct RootType {
    name: &'static str,
    fields: Fields,
}

impl TypeDescriptor for RootType {
    fn name(&self) -> String {
        self.name.into()
    }

    fn fields(&self) -> Fields {
        self.fields.clone()
    }
}

fn root_type(name: &'static str, fields: &Fields) -> Result<ResolvedType, Error> {
    let descriptor: Arc<dyn TypeDescriptor> = Arc::new(RootType {
        name,
        fields: fields.clone(),
    });
    ResolvedType::resolve(&descriptor)
}

/// The declared types reachable from a set of root types.
struct Reachable<'a> {
    registry: &'a TypeRegistry,
    roots: HashSet<String>,
    seen: HashSet<String>,
    types: Vec<Arc<ResolvedType>>,
}

impl Reachable<'_> {
    fn visit(&mut self, ty: &ResolvedType) -> Result<(), Error> {
        for field in ty.fields.values() {
            let nested = field
                .ty
                .descriptor()
                .into_iter()
                .chain(field.args.iter().filter_map(|arg| arg.ty.descriptor()));
            for descriptor in nested {
                let resolved = self.registry.type_of(descriptor)?;
                if self.roots.contains(&resolved.name) {
                    return Err(Error::Schema(format!(
                        "type name {} is reserved for a root type",
                        resolved.name
                    )));
                }
                if self.seen.insert(resolved.name.clone()) {
                    self.types.push(resolved.clone());
                    self.visit(&resolved)?;
                }
            }
        }
        Ok(())
    }
}

/// A GraphQL endpoint.
pub struct GraphQLAction {
    registry: Arc<TypeRegistry>,
    queries: Fields,
    mutations: Fields,
    debug: bool,
    logger: Arc<dyn ErrorLogger>,
}

impl GraphQLAction {
    /// An endpoint with no fields, whose types are cached in `registry`.
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            queries: Fields::new(),
            mutations: Fields::new(),
            debug: false,
            logger: Arc::new(TracingLogger),
        }
    }

    /// Set the fields of the root `Query` type.
    pub fn with_queries(mut self, queries: Fields) -> Self {
        self.queries = queries;
        self
    }

    /// Set the fields of the root `Mutation` type.
    pub fn with_mutations(mut self, mutations: Fields) -> Self {
        self.mutations = mutations;
        self
    }

    /// Include debugging details in error responses.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Apply deployment options.
    pub fn with_options(self, opt: &Options) -> Self {
        self.with_debug(opt.debug())
    }

    /// Report execution errors to `logger`.
    pub fn with_logger(mut self, logger: impl ErrorLogger + 'static) -> Self {
        self.logger = Arc::new(logger);
        self
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Assemble the schema for this endpoint.
    pub fn build_schema(&self) -> Result<Schema, Error> {
        build_schema(&self.registry, &self.queries, &self.mutations)
    }

    /// Execute `request` against `schema`, reporting any errors to the logger.
    pub async fn execute(
        &self,
        schema: &Schema,
        request: impl Into<async_graphql::Request>,
    ) -> ExecutionResult {
        let response = schema.execute(request).await;
        for error in &response.errors {
            if let Err(err) = self.logger.log(error).await {
                tracing::warn!("failed to report GraphQL error: {err:#}");
            }
        }
        ExecutionResult { response }
    }

    /// Serve a raw request, producing the response body.
    ///
    /// `data` is made available to resolvers through the request context. Only a malformed request
    /// is an error; failures during execution are reported inside the response body.
    pub async fn run(
        &self,
        schema: &Schema,
        raw: &RawRequest,
        data: Data,
    ) -> Result<serde_json::Value, Error> {
        let request = parse_request(raw)?;
        tracing::debug!(
            operation = ?request.operation_name,
            "executing GraphQL query: {}",
            request.query
        );
        let mut request = async_graphql::Request::from(request);
        request.data = data;
        Ok(self.execute(schema, request).await.to_json(self.debug))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{fields, Argument, FieldConfig, FieldSpec, FieldType};
    use anyhow::anyhow;
    use async_graphql::dynamic::{FieldFuture, FieldValue, ResolverContext, TypeRef};
    use async_graphql::Value;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn constant(value: impl Into<Value>) -> FieldConfig {
        let value = value.into();
        FieldConfig::new(TypeRef::named_nn(TypeRef::STRING)).resolve(move |_| {
            let value = value.clone();
            FieldFuture::new(async move { Ok(Some(value)) })
        })
    }

    #[async_std::test]
    async fn test_end_to_end() {
        let action = GraphQLAction::new(Arc::new(TypeRegistry::new())).with_queries(fields! {
            "name" => constant("Ada"),
        });
        let schema = action.build_schema().unwrap();
        let raw = RawRequest::default().with_body(r#"{"query":"{ name }","variables":{}}"#);
        let body = action.run(&schema, &raw, Data::default()).await.unwrap();
        assert_eq!(body.to_string(), r#"{"data":{"name":"Ada"}}"#);
    }

    #[async_std::test]
    async fn test_fields_follow_selection_order() {
        let action = GraphQLAction::new(Arc::new(TypeRegistry::new())).with_queries(fields! {
            "alpha" => constant("a"),
            "zeta" => constant("z"),
        });
        let schema = action.build_schema().unwrap();
        let raw = RawRequest::default().with_body(r#"{"query":"{ zeta alpha }"}"#);
        let body = action.run(&schema, &raw, Data::default()).await.unwrap();
        assert_eq!(body.to_string(), r#"{"data":{"zeta":"z","alpha":"a"}}"#);
    }

    #[async_std::test]
    async fn test_empty_schema() {
        let action = GraphQLAction::new(Arc::new(TypeRegistry::new()));
        let schema = action.build_schema().unwrap();
        assert!(schema.is_empty());
        assert_eq!(schema.sdl(), "");

        let raw = RawRequest::default().with_query_string("query=%7B__typename%7D");
        let body = action.run(&schema, &raw, Data::default()).await.unwrap();
        assert!(body.get("data").is_none());
        assert_eq!(body["errors"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_mutations_without_queries() {
        let action = GraphQLAction::new(Arc::new(TypeRegistry::new())).with_mutations(fields! {
            "noop" => constant("ok"),
        });
        assert!(matches!(action.build_schema(), Err(Error::Schema(_))));
    }

    #[async_std::test]
    async fn test_malformed_request() {
        let action = GraphQLAction::new(Arc::new(TypeRegistry::new())).with_queries(fields! {
            "name" => constant("Ada"),
        });
        let schema = action.build_schema().unwrap();
        let raw = RawRequest::default().with_body("not json");
        assert!(matches!(
            action.run(&schema, &raw, Data::default()).await,
            Err(Error::MalformedRequest { .. })
        ));
    }

    #[derive(Default)]
    struct Address;

    impl TypeDescriptor for Address {
        fn name(&self) -> String {
            "Address".into()
        }

        fn fields(&self) -> Fields {
            fields! {
                "city" => TypeRef::named_nn(TypeRef::STRING),
                // Cycles are fine: this refers back to the type being declared.
                "neighbor" => FieldType::of(Address),
            }
        }
    }

    #[derive(Default)]
    struct UserFilter;

    impl TypeDescriptor for UserFilter {
        fn name(&self) -> String {
            "UserFilter".into()
        }

        fn is_input_object(&self) -> bool {
            true
        }

        fn fields(&self) -> Fields {
            fields! {
                "city" => TypeRef::named(TypeRef::STRING),
            }
        }
    }

    #[derive(Default)]
    struct User;

    impl TypeDescriptor for User {
        fn name(&self) -> String {
            "User".into()
        }

        fn description(&self) -> Option<String> {
            Some("A registered user.".into())
        }

        fn fields(&self) -> Fields {
            fields! {
                "name" => TypeRef::named_nn(TypeRef::STRING),
                "address" => FieldType::of_nn(Address),
            }
        }
    }

    fn users() -> Value {
        Value::from_json(json!([
            { "name": "Ada", "address": { "city": "London" } },
            { "name": "Grace", "address": { "city": "New York" } },
        ]))
        .unwrap()
    }

    fn user_action(registry: Arc<TypeRegistry>) -> GraphQLAction {
        GraphQLAction::new(registry).with_queries(fields! {
            "users" => FieldConfig::new(FieldType::list_of(User))
                .argument(Argument::new("filter", FieldType::of(UserFilter)))
                .resolve(|ctx| {
                    let city = match ctx.args.get("filter").map(|f| f.as_value().clone()) {
                        Some(Value::Object(filter)) => filter.get("city").cloned(),
                        _ => None,
                    };
                    let Value::List(users) = users() else {
                        unreachable!()
                    };
                    let users = users
                        .into_iter()
                        .filter(|user| match (&city, user) {
                            (Some(city), Value::Object(user)) => match user.get("address") {
                                Some(Value::Object(address)) => address.get("city") == Some(city),
                                _ => false,
                            },
                            _ => true,
                        })
                        .map(FieldValue::value)
                        .collect::<Vec<_>>();
                    FieldFuture::new(async move { Ok(Some(FieldValue::list(users))) })
                }),
        })
    }

    #[async_std::test]
    async fn test_nested_types() {
        let registry = Arc::new(TypeRegistry::new());
        let action = user_action(registry.clone());
        let schema = action.build_schema().unwrap();
        assert_eq!(registry.len(), 3);

        let sdl = schema.sdl();
        assert!(sdl.contains("type User"), "{sdl}");
        assert!(sdl.contains("input UserFilter"), "{sdl}");
        assert!(sdl.contains("type Address"), "{sdl}");
        assert!(sdl.contains("A registered user."), "{sdl}");

        let res = action
            .execute(
                &schema,
                QueryRequest {
                    query: r#"query Q($filter: UserFilter) {
                        users(filter: $filter) { name address { city } }
                    }"#
                    .into(),
                    variables: json!({ "filter": { "city": "London" } })
                        .as_object()
                        .unwrap()
                        .clone(),
                    operation_name: Some("Q".into()),
                },
            )
            .await;
        assert_eq!(
            res.to_json(false),
            json!({ "data": { "users": [{ "name": "Ada", "address": { "city": "London" } }] } })
        );
    }

    #[async_std::test]
    async fn test_schemas_share_types() {
        let registry = Arc::new(TypeRegistry::new());
        user_action(registry.clone()).build_schema().unwrap();
        let user = registry.get::<User>().unwrap();
        user_action(registry.clone()).build_schema().unwrap();
        assert!(Arc::ptr_eq(&user, &registry.get::<User>().unwrap()));
        assert_eq!(registry.len(), 3);
    }

    struct Query;

    impl TypeDescriptor for Query {
        fn name(&self) -> String {
            "Query".into()
        }

        fn fields(&self) -> Fields {
            fields! { "x" => TypeRef::named(TypeRef::INT) }
        }
    }

    #[test]
    fn test_reserved_type_name() {
        let action = GraphQLAction::new(Arc::new(TypeRegistry::new())).with_queries(fields! {
            "inner" => FieldType::of(Query),
        });
        assert!(matches!(action.build_schema(), Err(Error::Schema(_))));
    }

    #[test]
    fn test_unknown_type() {
        let action = GraphQLAction::new(Arc::new(TypeRegistry::new())).with_queries(fields! {
            "mystery" => TypeRef::named("Mystery"),
        });
        assert!(matches!(action.build_schema(), Err(Error::Schema(_))));
    }

    #[derive(Default)]
    struct Recorder {
        messages: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ErrorLogger for Arc<Recorder> {
        async fn log(&self, error: &ServerError) -> anyhow::Result<()> {
            self.messages.lock().unwrap().push(error.message.clone());
            Ok(())
        }
    }

    struct Failing(Arc<AtomicUsize>);

    #[async_trait]
    impl ErrorLogger for Failing {
        async fn log(&self, _error: &ServerError) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("error reporting service unavailable"))
        }
    }

    fn failing_queries() -> Fields {
        fields! {
            "ok" => constant("fine"),
            "broken" => FieldConfig::new(TypeRef::named(TypeRef::STRING)).resolve(|_| {
                FieldFuture::new(async move {
                    Err::<Option<Value>, _>(async_graphql::Error::new("resolver failed"))
                })
            }),
        }
    }

    #[async_std::test]
    async fn test_errors_are_logged() {
        let recorder = Arc::new(Recorder::default());
        let action = GraphQLAction::new(Arc::new(TypeRegistry::new()))
            .with_queries(failing_queries())
            .with_logger(recorder.clone());
        let schema = action.build_schema().unwrap();
        let res = action.execute(&schema, "{ ok broken }").await;
        assert_eq!(res.errors().len(), 1);
        assert_eq!(*recorder.messages.lock().unwrap(), ["resolver failed"]);
        assert_eq!(
            res.to_json(false),
            json!({
                "data": { "ok": "fine", "broken": null },
                "errors": [{ "message": "resolver failed", "path": ["broken"] }],
            })
        );
    }

    #[async_std::test]
    async fn test_logging_failure_is_swallowed() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let action = GraphQLAction::new(Arc::new(TypeRegistry::new()))
            .with_queries(failing_queries())
            .with_logger(Failing(attempts.clone()))
            .with_debug(true);
        let schema = action.build_schema().unwrap();
        let raw = RawRequest::default().with_query_string("query=%7B%20ok%20broken%20%7D");
        let body = action.run(&schema, &raw, Data::default()).await.unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(body["data"], json!({ "ok": "fine", "broken": null }));
        assert!(body["errors"][0].get("debugMessage").is_some());
    }

    #[async_std::test]
    async fn test_validation_errors() {
        let recorder = Arc::new(Recorder::default());
        let action = GraphQLAction::new(Arc::new(TypeRegistry::new()))
            .with_queries(fields! { "name" => constant("Ada") })
            .with_logger(recorder.clone());
        let schema = action.build_schema().unwrap();
        let res = action.execute(&schema, "{ nope }").await;
        assert_eq!(res.errors().len(), 1);
        assert_eq!(recorder.messages.lock().unwrap().len(), 1);
        assert!(res.to_json(false).get("data").is_none());
    }

    #[derive(Clone, Copy, PartialEq, Eq)]
    struct Admin(bool);

    struct Account;

    impl TypeDescriptor for Account {
        fn name(&self) -> String {
            "Account".into()
        }

        fn fields(&self) -> Fields {
            fields! {
                "name" => TypeRef::named(TypeRef::STRING),
                "secret" => TypeRef::named(TypeRef::STRING),
            }
        }

        fn authorize_field(&self, field: &str, ctx: &ResolverContext<'_>) -> bool {
            field != "secret" || ctx.ctx.data_opt::<Admin>() == Some(&Admin(true))
        }
    }

    #[async_std::test]
    async fn test_authorization_uses_request_data() {
        let action = GraphQLAction::new(Arc::new(TypeRegistry::new())).with_queries(fields! {
            "account" => FieldConfig::new(FieldType::of(Account)).resolve(|_| {
                FieldFuture::new(async move {
                    Ok(Some(Value::from_json(json!({ "name": "Ada", "secret": "xyz" }))?))
                })
            }),
        });
        let schema = action.build_schema().unwrap();
        let raw = RawRequest::default().with_body(r#"{"query":"{ account { name secret } }"}"#);

        let mut data = Data::default();
        data.insert(Admin(true));
        let body = action.run(&schema, &raw, data).await.unwrap();
        assert_eq!(
            body,
            json!({ "data": { "account": { "name": "Ada", "secret": "xyz" } } })
        );

        let body = action.run(&schema, &raw, Data::default()).await.unwrap();
        assert_eq!(
            body,
            json!({
                "data": { "account": { "name": "Ada", "secret": null } },
                "errors": [{
                    "message": "You are not allowed to perform this action.",
                    "path": ["account", "secret"],
                }],
            })
        );
    }

    #[test]
    fn test_root_descriptor_fields() {
        // Root fields support every field form.
        struct Greeting;

        impl crate::FieldDescriptor for Greeting {
            fn to_field(
                &self,
                name: &str,
                _config: &serde_json::Map<String, serde_json::Value>,
            ) -> Result<FieldConfig, Error> {
                Ok(constant(format!("hello from {name}")))
            }
        }

        let action = GraphQLAction::new(Arc::new(TypeRegistry::new())).with_queries(fields! {
            "greeting" => FieldSpec::descriptor(Greeting),
        });
        let schema = action.build_schema().unwrap();
        let res = async_std::task::block_on(action.execute(&schema, "{ greeting }"));
        assert_eq!(
            res.to_json(false),
            json!({ "data": { "greeting": "hello from greeting" } })
        );
    }
}
