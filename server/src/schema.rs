//! The demo schema: a small in-memory user directory.
//!
//! Users can be listed and looked up by anyone, but only administrators can see email addresses
//! or register new users. The caller's [`Role`] and the [`Store`] are attached to each request.

use async_std::sync::RwLock;
use graphql_action::{
    async_graphql::{
        self,
        dynamic::{FieldFuture, FieldValue, ResolverContext, TypeRef},
        ErrorExtensions, Value,
    },
    config, fields, lookup, resolver, to_field_value, Argument, Attributes, Error, FieldConfig,
    FieldDescriptor, FieldSpec, FieldType, Fields, GraphQLAction, Record, Resolver,
    TypeDescriptor, TypeRegistry,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map};
use std::sync::Arc;
use strum::{Display, EnumString};

/// The role of the caller, taken from the `x-role` header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Role {
    #[default]
    Guest,
    Admin,
}

fn is_admin(ctx: &ResolverContext<'_>) -> bool {
    ctx.ctx.data_opt::<Role>() == Some(&Role::Admin)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub address: Address,
    pub bio: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Address {
    pub city: String,
}

impl Attributes for User {
    fn attribute(&self, name: &str) -> Option<Value> {
        match name {
            "id" => Some(self.id.into()),
            "first_name" => Some(self.first_name.clone().into()),
            "last_name" => Some(self.last_name.clone().into()),
            "email" => self.email.clone().map(Value::from),
            "address" => async_graphql::to_value(&self.address).ok(),
            "bio" => Some(self.bio.clone().into()),
            _ => None,
        }
    }
}

/// The fields of a user registration.
#[derive(Clone, Debug, Deserialize)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub city: String,
    #[serde(default)]
    pub bio: String,
}

/// In-memory user storage.
#[derive(Debug)]
pub struct Store {
    users: RwLock<Vec<User>>,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            users: RwLock::new(vec![
                User {
                    id: 1,
                    first_name: "Ada".into(),
                    last_name: "Lovelace".into(),
                    email: Some("ada@example.com".into()),
                    address: Address {
                        city: "London".into(),
                    },
                    bio: "Mathematician and writer, known for her notes on the Analytical Engine."
                        .into(),
                },
                User {
                    id: 2,
                    first_name: "Grace".into(),
                    last_name: "Hopper".into(),
                    email: Some("grace@example.com".into()),
                    address: Address {
                        city: "New York".into(),
                    },
                    bio: "Computer scientist and pioneer of machine-independent languages.".into(),
                },
            ]),
        }
    }
}

impl Store {
    /// All users, or only those living in `city`.
    pub async fn users(&self, city: Option<&str>) -> Vec<User> {
        self.users
            .read()
            .await
            .iter()
            .filter(|user| city.map_or(true, |city| user.address.city == city))
            .cloned()
            .collect()
    }

    pub async fn user(&self, id: i64) -> Option<User> {
        self.users
            .read()
            .await
            .iter()
            .find(|user| i64::from(user.id) == id)
            .cloned()
    }

    /// Register a new user, assigning the next free ID.
    pub async fn create(&self, new: NewUser) -> User {
        let mut users = self.users.write().await;
        let user = User {
            id: users.iter().map(|user| user.id).max().unwrap_or(0) + 1,
            first_name: new.first_name,
            last_name: new.last_name,
            email: new.email,
            address: Address { city: new.city },
            bio: new.bio,
        };
        users.push(user.clone());
        tracing::info!("registered user {}", user.id);
        user
    }
}

/// The string value of the attribute `key` of a parent value.
fn text(parent: &FieldValue<'_>, key: &str) -> String {
    match lookup(parent, key) {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => String::new(),
        Some(value) => value.to_string(),
    }
}

/// A registered user.
#[derive(Clone, Copy, Debug, Default)]
pub struct UserType;

impl TypeDescriptor for UserType {
    fn name(&self) -> String {
        "User".into()
    }

    fn description(&self) -> Option<String> {
        Some("A registered user.".into())
    }

    fn fields(&self) -> Fields {
        fields! {
            "id" => TypeRef::named_nn(TypeRef::INT),
            "first_name" => TypeRef::named_nn(TypeRef::STRING),
            "last_name" => TypeRef::named_nn(TypeRef::STRING),
            "name" => FieldConfig::new(TypeRef::named_nn(TypeRef::STRING))
                .description("The user's full name."),
            "initials" => FieldConfig::new(TypeRef::named_nn(TypeRef::STRING)).resolve(|ctx| {
                let initials = ["first_name", "last_name"]
                    .into_iter()
                    .filter_map(|key| text(ctx.parent_value, key).chars().next())
                    .collect::<String>();
                FieldFuture::new(async move { Ok(Some(Value::from(initials))) })
            }),
            "email" => FieldConfig::new(TypeRef::named(TypeRef::STRING))
                .description("Only visible to administrators."),
            "city" => FieldConfig::new(TypeRef::named(TypeRef::STRING)).alias("address.city"),
            "profile_url" => TypeRef::named_nn(TypeRef::STRING),
            "summary" => FieldSpec::bound(Excerpt, json!({ "source": "bio", "length": 18 })),
        }
    }

    fn method(&self, name: &str) -> Option<Resolver> {
        match name {
            "resolveName" => Some(resolver(|ctx| {
                let name = format!(
                    "{} {}",
                    text(ctx.parent_value, "first_name"),
                    text(ctx.parent_value, "last_name")
                );
                FieldFuture::new(async move { Ok(Some(Value::from(name))) })
            })),
            "resolveProfileUrlField" => Some(resolver(|ctx| {
                let url = format!("/users/{}", text(ctx.parent_value, "id"));
                FieldFuture::new(async move { Ok(Some(Value::from(url))) })
            })),
            _ => None,
        }
    }

    fn authorize_field(&self, field: &str, ctx: &ResolverContext<'_>) -> bool {
        field != "email" || is_admin(ctx)
    }
}

/// The input for registering a user.
#[derive(Clone, Copy, Debug, Default)]
pub struct NewUserInput;

impl TypeDescriptor for NewUserInput {
    fn name(&self) -> String {
        "NewUserInput".into()
    }

    fn is_input_object(&self) -> bool {
        true
    }

    fn fields(&self) -> Fields {
        fields! {
            "first_name" => TypeRef::named_nn(TypeRef::STRING),
            "last_name" => TypeRef::named_nn(TypeRef::STRING),
            "email" => TypeRef::named(TypeRef::STRING),
            "city" => TypeRef::named_nn(TypeRef::STRING),
            "bio" => FieldConfig::new(TypeRef::named_nn(TypeRef::STRING)).default_value(""),
        }
    }
}

/// A string field showing the start of a longer text attribute.
///
/// Configuration:
/// * `source`: the attribute to excerpt, by default the field name;
/// * `length`: the maximum number of characters kept, by default 80.
#[derive(Clone, Copy, Debug, Default)]
pub struct Excerpt;

impl FieldDescriptor for Excerpt {
    fn to_field(
        &self,
        name: &str,
        config: &Map<String, serde_json::Value>,
    ) -> Result<FieldConfig, Error> {
        let source = match config.get("source") {
            None => name.to_string(),
            Some(serde_json::Value::String(source)) => source.clone(),
            Some(_) => {
                return Err(Error::InvalidFieldConfig {
                    ty: "Excerpt".into(),
                    field: name.into(),
                    reason: "source must be a string".into(),
                })
            }
        };
        let length = match config.get("length") {
            None => 80,
            Some(length) => length.as_u64().ok_or_else(|| Error::InvalidFieldConfig {
                ty: "Excerpt".into(),
                field: name.into(),
                reason: "length must be a non-negative integer".into(),
            })? as usize,
        };
        Ok(FieldConfig::new(TypeRef::named_nn(TypeRef::STRING)).resolve(move |ctx| {
            let excerpt = excerpt(&text(ctx.parent_value, &source), length);
            FieldFuture::new(async move { Ok(Some(Value::from(excerpt))) })
        }))
    }
}

fn excerpt(text: &str, length: usize) -> String {
    if text.chars().count() <= length {
        return text.to_string();
    }
    let mut excerpt = text.chars().take(length).collect::<String>();
    excerpt.truncate(excerpt.trim_end().len());
    excerpt + "..."
}

fn store<'a>(ctx: &ResolverContext<'a>) -> async_graphql::Result<&'a Arc<Store>> {
    ctx.ctx.data::<Arc<Store>>()
}

/// Root query fields.
pub fn queries() -> Fields {
    fields! {
        "users" => FieldConfig::new(FieldType::list_of(UserType))
            .description("Registered users, optionally only those living in `city`.")
            .argument(Argument::new("city", TypeRef::named(TypeRef::STRING)))
            .resolve(|ctx| FieldFuture::new(async move {
                let city = match ctx.args.get("city").filter(|city| !city.is_null()) {
                    Some(city) => Some(city.string()?.to_string()),
                    None => None,
                };
                let users = store(&ctx)?.users(city.as_deref()).await;
                let users = users
                    .iter()
                    .map(to_field_value)
                    .collect::<async_graphql::Result<Vec<_>>>()?;
                Ok(Some(FieldValue::list(users)))
            })),
        "user" => FieldConfig::new(FieldType::of(UserType))
            .argument(Argument::new("id", TypeRef::named_nn(TypeRef::INT)))
            .resolve(|ctx| FieldFuture::new(async move {
                let id = ctx.args.try_get("id")?.i64()?;
                let user = store(&ctx)?.user(id).await;
                Ok(user.map(|user| Record::new(user).into_field_value()))
            })),
    }
}

/// Root mutation fields.
pub fn mutations() -> Fields {
    fields! {
        "createUser" => FieldConfig::new(FieldType::of_nn(UserType))
            .description("Register a new user. Requires the admin role.")
            .argument(Argument::new("input", FieldType::of_nn(NewUserInput)))
            .resolve(|ctx| FieldFuture::new(async move {
                if !is_admin(&ctx) {
                    return Err(Error::Forbidden { field: "createUser".into() }.extend());
                }
                let input = ctx.args.try_get("input")?.as_value().clone().into_json()?;
                let new = serde_json::from_value::<NewUser>(input)?;
                let user = store(&ctx)?.create(new).await;
                Ok(Some(Record::new(user).into_field_value()))
            })),
    }
}

/// The endpoint serving the demo schema.
pub fn action(registry: Arc<TypeRegistry>, opt: &config::Options) -> GraphQLAction {
    GraphQLAction::new(registry)
        .with_queries(queries())
        .with_mutations(mutations())
        .with_options(opt)
}
