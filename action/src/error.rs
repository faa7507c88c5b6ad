//! Errors reported by the adapter.

use async_graphql::ErrorExtensions;
use derive_more::Display;

/// Errors raised while building a schema or handling a request.
///
/// Construction-time errors ([`InvalidFieldConfig`](Self::InvalidFieldConfig),
/// [`DuplicateTypeName`](Self::DuplicateTypeName), [`Schema`](Self::Schema)) indicate a programming
/// error in the declared types and should abort startup.
/// [`MalformedRequest`](Self::MalformedRequest) aborts a single request before execution.
/// [`Forbidden`](Self::Forbidden) never leaves the engine: it is reported per field inside the
/// GraphQL `errors` array.
#[derive(Clone, Debug, Display, PartialEq, Eq)]
pub enum Error {
    /// The request carried no usable GraphQL document.
    #[display(fmt = "malformed GraphQL request: {}", reason)]
    MalformedRequest { reason: String },

    /// A declared field could not be interpreted.
    #[display(fmt = "invalid configuration for field {}.{}: {}", ty, field, reason)]
    InvalidFieldConfig {
        ty: String,
        field: String,
        reason: String,
    },

    /// Two different descriptors declared the same type name.
    #[display(
        fmt = "type name {} is declared by both {} and {}",
        name,
        first,
        second
    )]
    DuplicateTypeName {
        name: String,
        first: &'static str,
        second: &'static str,
    },

    /// The GraphQL engine rejected the assembled schema.
    #[display(fmt = "invalid schema: {}", _0)]
    Schema(String),

    /// An authorization hook rejected access to a field.
    #[display(fmt = "You are not allowed to perform this action.")]
    Forbidden { field: String },
}

impl std::error::Error for Error {}

impl Error {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedRequest {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_field(
        ty: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidFieldConfig {
            ty: ty.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// A machine readable code for this error, attached to GraphQL error extensions.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedRequest { .. } => "BAD_REQUEST",
            Self::InvalidFieldConfig { .. } | Self::DuplicateTypeName { .. } | Self::Schema(_) => {
                "INTERNAL_SERVER_ERROR"
            }
            Self::Forbidden { .. } => "FORBIDDEN",
        }
    }
}

impl ErrorExtensions for Error {
    fn extend(&self) -> async_graphql::Error {
        async_graphql::Error::new(self.to_string()).extend_with(|_, e| e.set("code", self.code()))
    }
}
