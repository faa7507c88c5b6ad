//! Extraction of GraphQL requests from raw HTTP-like input.

use crate::error::Error;
use serde_json::{Map, Value};
use url::form_urlencoded;

/// The parts of an incoming request which may carry a GraphQL query.
///
/// The transport layer fills this in; nothing here depends on a particular HTTP library.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawRequest {
    /// Decoded URL query parameters.
    pub query_params: Vec<(String, String)>,
    /// Decoded `application/x-www-form-urlencoded` body parameters.
    pub form: Vec<(String, String)>,
    /// The raw request body.
    pub body: Vec<u8>,
}

impl RawRequest {
    /// Parse URL query parameters from a query string (without the leading `?`).
    pub fn with_query_string(mut self, query: &str) -> Self {
        self.query_params = decode(query.as_bytes());
        self
    }

    /// Set a form-encoded body, which is decoded into [`form`](Self::form) as well.
    pub fn with_form_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self.form = decode(&self.body);
        self
    }

    /// Set a raw (typically JSON) body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// The first non-empty value of `key`, from the query string or else the form body.
    fn param(&self, key: &str) -> Option<&str> {
        self.query_params
            .iter()
            .chain(&self.form)
            .find(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.as_str())
    }
}

fn decode(input: &[u8]) -> Vec<(String, String)> {
    form_urlencoded::parse(input).into_owned().collect()
}

/// A GraphQL request extracted from a [`RawRequest`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryRequest {
    /// The GraphQL document.
    pub query: String,
    /// Variables for the operation. Empty if none were given.
    pub variables: Map<String, Value>,
    /// The operation to execute, if the document contains several.
    pub operation_name: Option<String>,
}

impl From<QueryRequest> for async_graphql::Request {
    fn from(req: QueryRequest) -> Self {
        let mut gql = async_graphql::Request::new(req.query)
            .variables(async_graphql::Variables::from_json(Value::Object(req.variables)));
        if let Some(operation_name) = req.operation_name {
            gql = gql.operation_name(operation_name);
        }
        gql
    }
}

/// Extract the GraphQL request from `raw`.
///
/// The query is taken from the URL query parameters, else from the form body. Variables and the
/// operation name then come from the same places. If neither has a query, the body is parsed as a
/// JSON object `{query, variables, operationName}`.
///
/// Variables given as a string are parsed as JSON. If that fails, or the JSON is not an object,
/// the variables are dropped rather than failing the request.
pub fn parse_request(raw: &RawRequest) -> Result<QueryRequest, Error> {
    let (query, variables, operation_name) = match raw.param("query") {
        Some(query) => (
            query.to_string(),
            raw.param("variables").map(|v| Value::String(v.into())),
            raw.param("operationName")
                .or_else(|| raw.param("operation"))
                .map(String::from),
        ),
        None => {
            let body = serde_json::from_slice::<Value>(&raw.body)
                .map_err(|err| Error::malformed(format!("body is not valid JSON: {err}")))?;
            let Value::Object(mut body) = body else {
                return Err(Error::malformed("body is not a JSON object"));
            };
            let query = match body.remove("query") {
                Some(Value::String(query)) if !query.is_empty() => query,
                _ => return Err(Error::malformed("no query given")),
            };
            let operation_name = ["operationName", "operation"]
                .into_iter()
                .find_map(|key| match body.remove(key) {
                    Some(Value::String(name)) if !name.is_empty() => Some(name),
                    _ => None,
                });
            (query, body.remove("variables"), operation_name)
        }
    };

    Ok(QueryRequest {
        query,
        variables: variables.map(parse_variables).unwrap_or_default(),
        operation_name,
    })
}

fn parse_variables(variables: Value) -> Map<String, Value> {
    match variables {
        Value::Object(variables) => variables,
        Value::String(s) if !s.is_empty() => match serde_json::from_str(&s) {
            Ok(Value::Object(variables)) => variables,
            Ok(other) => {
                tracing::debug!("ignoring variables which are not an object: {other}");
                Map::new()
            }
            Err(err) => {
                tracing::debug!("ignoring variables which are not valid JSON: {err}");
                Map::new()
            }
        },
        _ => Map::new(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn expected() -> QueryRequest {
        QueryRequest {
            query: "query Q($id: Int) { user(id: $id) { name } }".into(),
            variables: json!({ "id": 5 }).as_object().unwrap().clone(),
            operation_name: Some("Q".into()),
        }
    }

    #[test]
    fn test_encodings_agree() {
        let query_string = concat!(
            "query=query%20Q(%24id%3A%20Int)%20%7B%20user(id%3A%20%24id)%20%7B%20name%20%7D%20%7D",
            "&variables=%7B%22id%22%3A5%7D&operationName=Q",
        );
        let get = RawRequest::default().with_query_string(query_string);
        let form = RawRequest::default().with_form_body(query_string);
        let json = RawRequest::default().with_body(
            json!({
                "query": "query Q($id: Int) { user(id: $id) { name } }",
                "variables": { "id": 5 },
                "operationName": "Q",
            })
            .to_string(),
        );
        let json_string_variables = RawRequest::default().with_body(
            json!({
                "query": "query Q($id: Int) { user(id: $id) { name } }",
                "variables": "{\"id\":5}",
                "operationName": "Q",
            })
            .to_string(),
        );

        for raw in [get, form, json, json_string_variables] {
            assert_eq!(parse_request(&raw).unwrap(), expected(), "{raw:?}");
        }
    }

    #[test]
    fn test_query_string_wins_over_form() {
        let raw = RawRequest::default()
            .with_query_string("query=%7Ba%7D")
            .with_form_body("query=%7Bb%7D&variables=%7B%22x%22%3A1%7D");
        let req = parse_request(&raw).unwrap();
        assert_eq!(req.query, "{a}");
        // Variables may come from the form even when the query came from the URL.
        assert_eq!(req.variables, *json!({ "x": 1 }).as_object().unwrap());
    }

    #[test]
    fn test_empty_query_param_falls_through() {
        let raw = RawRequest::default()
            .with_query_string("query=")
            .with_form_body("query=%7Bb%7D");
        assert_eq!(parse_request(&raw).unwrap().query, "{b}");
    }

    #[test]
    fn test_malformed_variables_are_dropped() {
        let raw = RawRequest::default().with_query_string("query=%7Ba%7D&variables=%7Bid%3A5%7D");
        let req = parse_request(&raw).unwrap();
        assert_eq!(req.query, "{a}");
        assert!(req.variables.is_empty());

        let raw = RawRequest::default().with_body(r#"{"query":"{a}","variables":"[1,2]"}"#);
        assert!(parse_request(&raw).unwrap().variables.is_empty());

        let raw = RawRequest::default().with_body(r#"{"query":"{a}","variables":null}"#);
        assert!(parse_request(&raw).unwrap().variables.is_empty());
    }

    #[test]
    fn test_legacy_operation_key() {
        let raw = RawRequest::default().with_query_string("query=%7Ba%7D&operation=A");
        assert_eq!(parse_request(&raw).unwrap().operation_name.as_deref(), Some("A"));

        let raw = RawRequest::default().with_body(r#"{"query":"{a}","operation":"A"}"#);
        assert_eq!(parse_request(&raw).unwrap().operation_name.as_deref(), Some("A"));

        let raw = RawRequest::default()
            .with_query_string("query=%7Ba%7D&operation=A&operationName=B");
        assert_eq!(parse_request(&raw).unwrap().operation_name.as_deref(), Some("B"));
    }

    #[test]
    fn test_malformed_requests() {
        for body in [
            "",
            "not json",
            "[1]",
            r#"{"variables":{}}"#,
            r#"{"query":""}"#,
            r#"{"query":5}"#,
        ] {
            let raw = RawRequest::default().with_body(body);
            assert!(
                matches!(parse_request(&raw), Err(Error::MalformedRequest { .. })),
                "{body}"
            );
        }
    }

    #[test]
    fn test_into_engine_request() {
        let req: async_graphql::Request = expected().into();
        assert_eq!(req.query, expected().query);
        assert_eq!(req.operation_name.as_deref(), Some("Q"));
        assert_eq!(
            req.variables.into_value().into_json().unwrap(),
            json!({ "id": 5 })
        );
    }
}
