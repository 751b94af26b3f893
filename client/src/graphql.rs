//! GraphQL transport capability.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use thiserror::Error;
use url::Url;

/// Future type for [`GraphQlClient::request`].
pub type GraphQlFut<'a> = Pin<Box<dyn Future<Output = Result<Value, GraphQlError>> + Send + 'a>>;

/// The "GraphQL request" capability consumed by the contributions.
///
/// `request` resolves to the `data` object of a successful response. A
/// response carrying entries in its `errors` array fails with one error
/// aggregating every message, as does a response with no usable `data`.
pub trait GraphQlClient: Send + Sync {
    fn request<'a>(&'a self, query: &'a str, variables: Value) -> GraphQlFut<'a>;
}

#[derive(Debug, Error)]
pub enum GraphQlError {
    #[error("graphql transport: {0}")]
    Transport(String),
    #[error("graphql response errors: {}", messages.join("; "))]
    Response { messages: Vec<String> },
}

impl GraphQlError {
    /// Aggregate the `errors` array of a response into one error.
    #[must_use]
    pub fn aggregate(errors: &[Value]) -> Self {
        let messages = errors
            .iter()
            .map(|error| match error.get("message").and_then(Value::as_str) {
                Some(message) => message.to_string(),
                None => error.to_string(),
            })
            .collect();
        Self::Response { messages }
    }

    #[must_use]
    pub fn missing_data() -> Self {
        Self::Response {
            messages: vec!["response has no data".to_string()],
        }
    }
}

/// [`GraphQlClient`] over HTTP POST.
pub struct HttpGraphQlClient {
    http: reqwest::Client,
    endpoint: Url,
    token: Option<String>,
}

impl HttpGraphQlClient {
    pub fn new(endpoint: Url) -> Result<Self, GraphQlError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| GraphQlError::Transport(err.to_string()))?;
        Ok(Self {
            http,
            endpoint,
            token: None,
        })
    }

    /// Attach a bearer token to every request.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    async fn post(&self, query: &str, variables: Value) -> Result<Value, GraphQlError> {
        let body = serde_json::json!({ "query": query, "variables": variables });
        let mut request = self.http.post(self.endpoint.clone()).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|err| GraphQlError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(GraphQlError::Transport(format!(
                "unexpected HTTP status {status}"
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|err| GraphQlError::Transport(err.to_string()))?;

        if let Some(errors) = payload.get("errors").and_then(Value::as_array)
            && !errors.is_empty()
        {
            return Err(GraphQlError::aggregate(errors));
        }
        match payload.get("data") {
            Some(data) if !data.is_null() => Ok(data.clone()),
            _ => Err(GraphQlError::missing_data()),
        }
    }
}

impl GraphQlClient for HttpGraphQlClient {
    fn request<'a>(&'a self, query: &'a str, variables: Value) -> GraphQlFut<'a> {
        Box::pin(self.post(query, variables))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> HttpGraphQlClient {
        let endpoint = Url::parse(&format!("{}/graphql", server.uri())).unwrap();
        HttpGraphQlClient::new(endpoint).unwrap()
    }

    #[tokio::test]
    async fn success_resolves_to_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(body_partial_json(json!({ "variables": { "query": "foo" } })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "data": { "search": { "ok": true } } })),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let data = client
            .request("query Search($query: String!) { search }", json!({ "query": "foo" }))
            .await
            .unwrap();
        assert_eq!(data["search"]["ok"], json!(true));
    }

    #[tokio::test]
    async fn errors_array_becomes_aggregate_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": null,
                "errors": [
                    { "message": "first failure" },
                    { "message": "second failure" },
                ],
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.request("query {}", json!({})).await.unwrap_err();
        let GraphQlError::Response { messages } = err else {
            panic!("expected aggregate response error, got {err:?}");
        };
        assert_eq!(messages, ["first failure", "second failure"]);
    }

    #[tokio::test]
    async fn missing_data_is_an_aggregate_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.request("query {}", json!({})).await.unwrap_err();
        assert!(matches!(err, GraphQlError::Response { .. }));
    }

    #[tokio::test]
    async fn http_failure_is_a_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.request("query {}", json!({})).await.unwrap_err();
        assert!(matches!(err, GraphQlError::Transport(_)));
    }

    #[test]
    fn aggregate_falls_back_to_raw_value_without_message() {
        let err = GraphQlError::aggregate(&[json!({ "message": "boom" }), json!(42)]);
        assert_eq!(err.to_string(), "graphql response errors: boom; 42");
    }
}
