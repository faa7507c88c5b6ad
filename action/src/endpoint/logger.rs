//! Out-of-band reporting of execution errors.

use async_graphql::ServerError;
use async_trait::async_trait;

/// A sink for errors produced while executing GraphQL requests.
///
/// Every error in a response is passed to the logger before the response is returned. A failure to
/// log is itself logged and otherwise ignored; it never affects the response.
#[async_trait]
pub trait ErrorLogger: Send + Sync {
    async fn log(&self, error: &ServerError) -> anyhow::Result<()>;
}

/// Report errors through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

#[async_trait]
impl ErrorLogger for TracingLogger {
    async fn log(&self, error: &ServerError) -> anyhow::Result<()> {
        tracing::error!(path = ?error.path, "GraphQL error: {}", error.message);
        Ok(())
    }
}
