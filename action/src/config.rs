//! Deployment configuration for a GraphQL endpoint.

use clap::Args;
use strum::{Display, EnumString};

/// The environment an endpoint is deployed in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Environment {
    /// Development. Error responses include debugging details.
    Dev,
    /// Production. Error responses are sanitized.
    #[default]
    Prod,
}

/// Endpoint options.
#[derive(Clone, Debug, Args)]
pub struct Options {
    /// The deployment environment: `dev` or `prod`.
    #[clap(long = "env", env = "GRAPHQL_ACTION_ENV", default_value = "prod")]
    pub environment: Environment,
}

impl Options {
    /// Whether error responses should include debugging details.
    pub fn debug(&self) -> bool {
        self.environment == Environment::Dev
    }
}
