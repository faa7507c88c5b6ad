#![cfg(test)]

//! This module runs test cases defined in `server/test/cases` against a live server.
//!
//! Each test case consists of two files, named in terms of `<name>`, the name of the test case:
//! * `<name>.graphql`: a GraphQL query
//! * `<name>.json`: the expected `data` of the response
//!
//! This runner will start a server and scan that directory for all such pairs of files, executing
//! each query as an anonymous guest and making sure that the response matches the expected
//! response. After the case files, it runs checks of the HTTP surface which don't fit the case file
//! format: request encodings, roles, mutations and malformed requests.
//!
//! Use `cargo test -p graphql-action-server` to run the tests.

use super::Options;
use ansi_term::Color;
use anyhow::{ensure, Error};
use async_std::task::{sleep, spawn};
use futures::future::join_all;
use graphql_action::config::{self, Environment};
use portpicker::pick_unused_port;
use serde_json::{json, Value};
use std::ffi::OsString;
use std::fmt::{self, Display, Formatter};
use std::fs::{self, File};
use std::path::Path;
use std::time::Duration;
use surf::{
    http::{mime, StatusCode},
    Client, RequestBuilder,
};
use url::form_urlencoded;

#[async_std::test]
async fn graphql_api_test_cases() -> Result<(), Error> {
    graphql_action::init_logging();

    // Discover test cases.
    let test_cases = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("test/cases")
        .read_dir()?
        .filter_map(|dirent| {
            let path = dirent.unwrap().path();
            if path.extension()?.to_str().unwrap() == "graphql" {
                Some(TestCase::new(&path).unwrap())
            } else {
                None
            }
        })
        .collect::<Vec<_>>();
    ensure!(!test_cases.is_empty(), "no test cases found");

    // Start a GraphQL server.
    let port = pick_unused_port().unwrap();
    let opt = Options {
        port,
        action: config::Options {
            environment: Environment::Dev,
        },
    };
    spawn(async move {
        opt.serve().await.unwrap();
        tracing::warn!("server exited");
    });

    // Connect a client.
    let client: Client = surf::Config::default()
        .set_base_url(format!("http://localhost:{port}").parse().unwrap())
        .try_into()
        .unwrap();
    // Wait for the server to come up.
    wait_for_server(&client).await?;

    let mut results = join_all(test_cases.into_iter().map(|test| test.run(client.clone()))).await;
    // These run one at a time, after the case files, since some of them modify the store.
    results.push(TestResult::new("encodings", encodings_agree(&client).await));
    results.push(TestResult::new("roles", roles(&client).await));
    results.push(TestResult::new("mutation", mutation(&client).await));
    results.push(TestResult::new("malformed", malformed(&client).await));

    for result in &results {
        println!("{}", result);
    }
    if results.iter().any(TestResult::failed) {
        Err(Error::msg(format!("{}", Color::Red.paint("tests failed"))))
    } else {
        println!("All test cases passed.");
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct TestCase {
    name: OsString,
    query: String,
    response: Value,
}

impl TestCase {
    fn new(query_path: impl AsRef<Path>) -> Result<Self, Error> {
        let query_path = query_path.as_ref();
        let name = query_path.file_stem().unwrap();
        let query = fs::read_to_string(query_path)?;
        let response_path = query_path.with_extension("json");
        let response = serde_json::from_reader(File::open(response_path)?)?;
        Ok(Self {
            name: name.into(),
            query,
            response,
        })
    }

    async fn run(self, client: Client) -> TestResult {
        TestResult {
            name: self.name,
            failure: Self::do_test(client, self.query, self.response).await.err(),
        }
    }

    async fn do_test(client: Client, query: String, expected_response: Value) -> Result<(), Error> {
        let req = client
            .post("/graphql")
            .body_json(&json!({ "query": query }))
            .map_err(Error::msg)?;
        let response = send(req).await?;

        // Extract GraphQL errors.
        for error in response
            .get("errors")
            .and_then(|value| value.as_array())
            .into_iter()
            .flatten()
        {
            tracing::error!("GraphQL error: {error}");
        }

        // Extract GraphQL data.
        let data = response
            .get("data")
            .ok_or_else(|| Error::msg(format!("response is missing data: {response}")))?;
        ensure!(
            *data == expected_response,
            "expected response:\n{expected_response}\nactual response:\n{data}"
        );
        Ok(())
    }
}

struct TestResult {
    name: OsString,
    failure: Option<anyhow::Error>,
}

impl TestResult {
    fn new(name: &str, result: Result<(), Error>) -> Self {
        Self {
            name: name.into(),
            failure: result.err(),
        }
    }

    fn failed(&self) -> bool {
        self.failure.is_some()
    }
}

impl Display for TestResult {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}...", self.name.to_string_lossy())?;
        if let Some(err) = &self.failure {
            writeln!(f, "{}", Color::Red.paint("FAILED"))?;
            write!(f, "{err}")?;
        } else {
            write!(f, "{}", Color::Green.paint("OK"))?;
        }
        Ok(())
    }
}

/// Send a request which is expected to succeed, returning the response body.
async fn send(req: RequestBuilder) -> Result<Value, Error> {
    let (status, body) = send_any(req).await?;
    ensure!(
        status == StatusCode::Ok,
        "query failed with status {status}: {body}"
    );
    Ok(body)
}

async fn send_any(req: RequestBuilder) -> Result<(StatusCode, Value), Error> {
    let mut res = req.send().await.map_err(Error::msg)?;
    let body = res
        .body_json()
        .await
        .map_err(|err| Error::msg(format!("cannot parse response body as JSON: {err}")))?;
    Ok((res.status(), body))
}

/// The same request sent as URL parameters, a form body and a JSON body gets the same response.
async fn encodings_agree(client: &Client) -> Result<(), Error> {
    let query = "query Q($city: String) { users(city: $city) { name } }";
    let variables = r#"{"city":"London"}"#;
    let params = form_urlencoded::Serializer::new(String::new())
        .append_pair("query", query)
        .append_pair("variables", variables)
        .append_pair("operationName", "Q")
        .finish();
    let expected = json!({ "data": { "users": [{ "name": "Ada Lovelace" }] } });

    let get = send(client.get(format!("/graphql?{params}"))).await?;
    ensure!(get == expected, "GET: {get}");

    let form = send(
        client
            .post("/graphql")
            .body_string(params.clone())
            .content_type(mime::FORM),
    )
    .await?;
    ensure!(form == expected, "form: {form}");

    let body = json!({ "query": query, "variables": { "city": "London" }, "operationName": "Q" });
    let post = send(client.post("/graphql").body_json(&body).map_err(Error::msg)?).await?;
    ensure!(post == expected, "JSON: {post}");

    // Unparseable variables are dropped, so the filter does not apply.
    let params = form_urlencoded::Serializer::new(String::new())
        .append_pair("query", query)
        .append_pair("variables", "{city:London}")
        .finish();
    let res = send(client.get(format!("/graphql?{params}"))).await?;
    ensure!(
        res["data"]["users"].as_array().map(Vec::len) == Some(2),
        "malformed variables: {res}"
    );
    Ok(())
}

/// Emails are only visible with the admin role.
async fn roles(client: &Client) -> Result<(), Error> {
    let body = json!({ "query": "{ user(id: 1) { name email } }" });

    let admin = send(
        client
            .post("/graphql")
            .header("x-role", "admin")
            .body_json(&body)
            .map_err(Error::msg)?,
    )
    .await?;
    let expected = json!({
        "data": { "user": { "name": "Ada Lovelace", "email": "ada@example.com" } }
    });
    ensure!(
        admin == expected,
        "admin: {admin}"
    );

    let guest = send(client.post("/graphql").body_json(&body).map_err(Error::msg)?).await?;
    ensure!(
        guest["data"] == json!({ "user": { "name": "Ada Lovelace", "email": null } }),
        "guest: {guest}"
    );
    let error = &guest["errors"][0];
    ensure!(error["path"] == json!(["user", "email"]), "guest: {guest}");
    // The server runs in dev mode, so error details are included.
    ensure!(error["extensions"]["code"] == "FORBIDDEN", "guest: {guest}");
    ensure!(error.get("debugMessage").is_some(), "guest: {guest}");
    Ok(())
}

/// Administrators can register users, who then show up in queries.
async fn mutation(client: &Client) -> Result<(), Error> {
    let body = json!({
        "query": "mutation Create($input: NewUserInput!) { createUser(input: $input) { id name } }",
        "variables": {
            "input": { "first_name": "Alan", "last_name": "Turing", "city": "Manchester" },
        },
    });

    let guest = send(client.post("/graphql").body_json(&body).map_err(Error::msg)?).await?;
    ensure!(guest.get("data").is_none(), "guest: {guest}");

    let created = send(
        client
            .post("/graphql")
            .header("x-role", "admin")
            .body_json(&body)
            .map_err(Error::msg)?,
    )
    .await?;
    ensure!(
        created == json!({ "data": { "createUser": { "id": 3, "name": "Alan Turing" } } }),
        "admin: {created}"
    );

    let query = json!({ "query": r#"{ users(city: "Manchester") { initials } }"# });
    let users = send(client.post("/graphql").body_json(&query).map_err(Error::msg)?).await?;
    ensure!(
        users == json!({ "data": { "users": [{ "initials": "AT" }] } }),
        "query: {users}"
    );
    Ok(())
}

/// Requests without a query are rejected before execution.
async fn malformed(client: &Client) -> Result<(), Error> {
    for req in [
        client.get("/graphql"),
        client.post("/graphql").body_string("not json".into()),
        client
            .post("/graphql")
            .body_json(&json!({ "variables": {} }))
            .map_err(Error::msg)?,
    ] {
        let (status, body) = send_any(req).await?;
        ensure!(status == StatusCode::BadRequest, "status {status}: {body}");
        ensure!(
            body["errors"][0]["extensions"]["code"] == "BAD_REQUEST",
            "{body}"
        );
    }
    Ok(())
}

async fn wait_for_server(client: &Client) -> Result<(), Error> {
    const MAX_CONNECT_RETRIES: usize = 60;

    for _ in 0..MAX_CONNECT_RETRIES {
        match client.connect("/").await {
            Ok(_) => return Ok(()),
            Err(err) => {
                tracing::warn!("waiting for server to start: {err}");
                sleep(Duration::from_secs(1)).await;
            }
        }
    }

    Err(Error::msg("timed out waiting for server"))
}
