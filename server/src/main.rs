use clap::Parser;
use graphql_action::{
    async_graphql::Data, config, GraphQLAction, RawRequest, Schema, TypeRegistry,
};
use serde_json::json;
use std::sync::Arc;
use tide::{
    http::{mime, Body},
    Request, Response, StatusCode,
};

mod schema;
mod test_runner;

use schema::{Role, Store};

/// Start the GraphQL demo server.
#[derive(Clone, Debug, Parser)]
struct Options {
    /// The port where the app should be served.
    #[clap(short, long, env = "GRAPHQL_ACTION_PORT", default_value = "80")]
    port: u16,

    #[clap(flatten)]
    action: config::Options,
}

impl Options {
    async fn serve(&self) -> anyhow::Result<()> {
        let action = schema::action(Arc::new(TypeRegistry::new()), &self.action);
        let schema = action.build_schema()?;
        let state = State {
            action: Arc::new(action),
            schema: Arc::new(schema),
            store: Arc::new(Store::default()),
        };

        let mut app = tide::with_state(state);
        app.at("/graphql").get(graphql).post(graphql);
        tracing::info!(
            "serving GraphQL on port {} ({} mode)",
            self.port,
            self.action.environment
        );
        app.listen(format!("0.0.0.0:{}", self.port)).await?;
        Ok(())
    }
}

#[derive(Clone)]
struct State {
    action: Arc<GraphQLAction>,
    schema: Arc<Schema>,
    store: Arc<Store>,
}

async fn graphql(mut req: Request<State>) -> tide::Result {
    let query = req.url().query().unwrap_or_default().to_string();
    let is_form = req
        .content_type()
        .map(|ty| ty.essence() == mime::FORM.essence())
        .unwrap_or(false);
    let body = req.body_bytes().await?;
    let raw = RawRequest::default().with_query_string(&query);
    let raw = if is_form {
        raw.with_form_body(body)
    } else {
        raw.with_body(body)
    };

    let role = req
        .header("x-role")
        .and_then(|role| role.last().as_str().parse().ok())
        .unwrap_or(Role::Guest);
    let state = req.state();
    let mut data = Data::default();
    data.insert(role);
    data.insert(state.store.clone());

    let (status, body) = match state.action.run(&state.schema, &raw, data).await {
        Ok(body) => (StatusCode::Ok, body),
        Err(err) => {
            tracing::warn!("rejecting request: {err}");
            let body = json!({
                "errors": [{ "message": err.to_string(), "extensions": { "code": err.code() } }]
            });
            (StatusCode::BadRequest, body)
        }
    };
    Ok(Response::builder(status)
        .body(Body::from_json(&body)?)
        .content_type(mime::JSON)
        .build())
}

#[async_std::main]
async fn main() -> anyhow::Result<()> {
    graphql_action::init_logging();
    Options::parse().serve().await
}
