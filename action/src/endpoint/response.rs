//! Serialization of execution results.

use async_graphql::{Response, ServerError};
use serde_json::{Map, Value};

/// The outcome of executing a GraphQL request.
#[derive(Debug)]
pub struct ExecutionResult {
    pub response: Response,
}

impl ExecutionResult {
    /// Errors produced while validating or executing the request.
    pub fn errors(&self) -> &[ServerError] {
        &self.response.errors
    }

    /// Render the result as a standard GraphQL response body, `{data?, errors?}`.
    ///
    /// `data` is left out when execution produced nothing but errors, and `errors` when there were
    /// none. Without `debug`, each error carries only its message and path. With `debug`, errors
    /// also carry source locations, extensions and a `debugMessage` with the error's full debug
    /// rendering.
    pub fn to_json(&self, debug: bool) -> Value {
        let mut body = Map::new();
        let errors = self.errors();
        if !(self.response.data == async_graphql::Value::Null && !errors.is_empty()) {
            body.insert(
                "data".into(),
                self.response.data.clone().into_json().unwrap_or_default(),
            );
        }
        if !errors.is_empty() {
            body.insert(
                "errors".into(),
                errors.iter().map(|err| error_json(err, debug)).collect(),
            );
        }
        Value::Object(body)
    }
}

fn error_json(err: &ServerError, debug: bool) -> Value {
    let mut entry = Map::new();
    entry.insert("message".into(), err.message.clone().into());
    if debug && !err.locations.is_empty() {
        entry.insert(
            "locations".into(),
            serde_json::to_value(&err.locations).unwrap_or_default(),
        );
    }
    if !err.path.is_empty() {
        entry.insert(
            "path".into(),
            serde_json::to_value(&err.path).unwrap_or_default(),
        );
    }
    if debug {
        if let Some(extensions) = &err.extensions {
            entry.insert(
                "extensions".into(),
                serde_json::to_value(extensions).unwrap_or_default(),
            );
        }
        entry.insert("debugMessage".into(), format!("{err:?}").into());
    }
    Value::Object(entry)
}
