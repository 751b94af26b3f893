//! Typed message envelopes for the boundary channel.
//!
//! Three envelope kinds travel between the client and the extension host:
//! requests (carry an id, expect a response), responses (success or error),
//! and fire-and-forget notifications. The JSON forms are distinguished
//! structurally, so [`Message`] deserializes without a tag field.

use quarry_types::Diagnostic;
use quarry_types::ids::{ProviderId, RegistrationId, RequestId};
use quarry_types::search::{TextSearchParams, TextSearchQuery, TextSearchResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

/// Wire method names.
///
/// The `$`-prefixed strings are the boundary contract; both endpoints must
/// agree on them exactly.
pub mod methods {
    /// Handshake, client to extension, expects an ack response.
    pub const INITIALIZE: &str = "$initialize";
    /// Orderly teardown, client to extension, expects an ack response.
    pub const SHUTDOWN: &str = "$shutdown";
    /// Full diagnostics snapshot push, extension to client, notification.
    pub const ACCEPT_DIAGNOSTICS_DATA: &str = "$acceptDiagnosticsData";
    /// Text search request, extension to client.
    pub const FIND_TEXT_IN_FILES: &str = "$findTextInFiles";
    /// Streamed result batch for an in-flight search, notification.
    pub const ACCEPT_SEARCH_RESULTS: &str = "$acceptSearchResults";
    /// Register a query transformer, extension to client.
    pub const REGISTER_QUERY_TRANSFORMER: &str = "$registerQueryTransformer";
    /// Register a text search provider, extension to client.
    pub const REGISTER_TEXT_SEARCH_PROVIDER: &str = "$registerTextSearchProvider";
    /// Drop a previous registration, extension to client.
    pub const UNREGISTER: &str = "$unregister";
    /// Run a registered transformer against a query, client to extension.
    pub const TRANSFORM_QUERY: &str = "$transformQuery";
    /// Run a registered provider against search params, client to extension.
    pub const PROVIDE_TEXT_SEARCH_RESULTS: &str = "$provideTextSearchResults";
}

/// Well-known response error codes.
pub mod codes {
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// One envelope on the boundary channel.
///
/// Variant order matters: an object carrying both `id` and `method` is a
/// request, `id` without `method` is a response, `method` alone is a
/// notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Request(Request),
    Response(Response),
    Notification(Notification),
}

impl Message {
    pub fn request(id: RequestId, method: impl Into<String>, params: Value) -> Self {
        Self::Request(Request {
            id,
            method: method.into(),
            params,
        })
    }

    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Self::Notification(Notification {
            method: method.into(),
            params,
        })
    }

    pub fn success(id: RequestId, result: Value) -> Self {
        Self::Response(Response {
            id,
            result,
            error: None,
        })
    }

    pub fn failure(id: RequestId, error: ResponseError) -> Self {
        Self::Response(Response {
            id,
            result: Value::Null,
            error: Some(error),
        })
    }

    /// Build a success response from any serializable result.
    ///
    /// Serialization failure degrades to an internal-error response so the
    /// peer always hears back for the id.
    pub fn reply<T: Serialize>(id: RequestId, result: &T) -> Self {
        match serde_json::to_value(result) {
            Ok(value) => Self::success(id, value),
            Err(err) => Self::failure(id, ResponseError::internal(err.to_string())),
        }
    }
}

/// A call expecting a [`Response`] with the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

/// The answer to a [`Request`]. Exactly one of `result` and `error` is
/// meaningful; `error` wins when both are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: RequestId,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl Response {
    pub fn into_result(self) -> Result<Value, ResponseError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result),
        }
    }
}

/// A fire-and-forget message. No response is ever sent for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

/// Error half of a [`Response`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message} (code {code})")]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
}

impl ResponseError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(codes::METHOD_NOT_FOUND, format!("unknown method {method}"))
    }

    pub fn invalid_params(detail: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMS, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL_ERROR, detail)
    }
}

/// Decode a params payload, mapping failure to an invalid-params error.
pub fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, ResponseError> {
    serde_json::from_value(params).map_err(|err| ResponseError::invalid_params(err.to_string()))
}

// ── Method payloads ─────────────────────────────────────────────────────────

/// Params for [`methods::INITIALIZE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeParams {
    /// Human-readable name of the connecting side, for logs.
    pub name: String,
}

/// Ack for [`methods::INITIALIZE`] and [`methods::SHUTDOWN`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ack {}

/// Params for [`methods::ACCEPT_DIAGNOSTICS_DATA`]: the full snapshot,
/// serialized as `[uri, Diagnostic[]]` pairs. The receiving side replaces
/// its previous snapshot wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AcceptDiagnosticsDataParams {
    pub updates: Vec<(Url, Vec<Diagnostic>)>,
}

/// Params for [`methods::FIND_TEXT_IN_FILES`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FindTextInFilesParams {
    pub params: TextSearchParams,
}

/// Final response for [`methods::FIND_TEXT_IN_FILES`], sent after the last
/// [`methods::ACCEPT_SEARCH_RESULTS`] batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindTextInFilesResult {
    /// Distinct results delivered across all batches.
    pub total: usize,
}

/// Params for [`methods::ACCEPT_SEARCH_RESULTS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptSearchResultsParams {
    /// Id of the originating [`methods::FIND_TEXT_IN_FILES`] request.
    pub request: RequestId,
    pub items: Vec<TextSearchResult>,
}

/// Params for the two `$register*` methods. The registering side picks the
/// provider id; the peer treats it as opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterProviderParams {
    pub provider: ProviderId,
}

/// Result for the two `$register*` methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterProviderResult {
    pub registration: RegistrationId,
}

/// Params for [`methods::UNREGISTER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnregisterParams {
    pub registration: RegistrationId,
}

/// Params for [`methods::TRANSFORM_QUERY`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformQueryParams {
    pub transformer: ProviderId,
    pub query: TextSearchQuery,
}

/// Result for [`methods::TRANSFORM_QUERY`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformQueryResult {
    pub query: TextSearchQuery,
}

/// Params for [`methods::PROVIDE_TEXT_SEARCH_RESULTS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvideTextSearchResultsParams {
    pub provider: ProviderId,
    #[serde(flatten)]
    pub params: TextSearchParams,
}

/// Result for [`methods::PROVIDE_TEXT_SEARCH_RESULTS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvideTextSearchResultsResult {
    pub items: Vec<TextSearchResult>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_types::diagnostic::{DiagnosticSeverity, Range};
    use quarry_types::search::TextSearchQuery;
    use serde_json::json;

    fn uri(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    // ── Envelope disambiguation ─────────────────────────────────────────────

    #[test]
    fn test_id_and_method_is_a_request() {
        let message: Message =
            serde_json::from_value(json!({ "id": 7, "method": "$findTextInFiles", "params": {} }))
                .unwrap();
        let Message::Request(request) = message else {
            panic!("expected request, got {message:?}");
        };
        assert_eq!(request.id, RequestId::new(7));
        assert_eq!(request.method, methods::FIND_TEXT_IN_FILES);
    }

    #[test]
    fn test_id_without_method_is_a_response() {
        let message: Message =
            serde_json::from_value(json!({ "id": 7, "result": { "total": 3 } })).unwrap();
        let Message::Response(response) = message else {
            panic!("expected response, got {message:?}");
        };
        assert_eq!(response.into_result().unwrap(), json!({ "total": 3 }));
    }

    #[test]
    fn test_method_without_id_is_a_notification() {
        let message: Message = serde_json::from_value(json!({ "method": "$shutdown" })).unwrap();
        let Message::Notification(notification) = message else {
            panic!("expected notification, got {message:?}");
        };
        assert_eq!(notification.method, methods::SHUTDOWN);
        assert_eq!(notification.params, Value::Null);
    }

    #[test]
    fn test_unrecognizable_object_is_rejected() {
        assert!(serde_json::from_value::<Message>(json!({ "neither": "fish" })).is_err());
    }

    // ── Constructors and results ────────────────────────────────────────────

    #[test]
    fn test_error_response_round_trip() {
        let message = Message::failure(
            RequestId::new(4),
            ResponseError::method_not_found("$frobnicate"),
        );
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({
                "id": 4,
                "error": { "code": -32601, "message": "unknown method $frobnicate" },
            })
        );

        let back: Message = serde_json::from_value(value).unwrap();
        let Message::Response(response) = back else {
            panic!("expected response");
        };
        let error = response.into_result().unwrap_err();
        assert_eq!(error.code, codes::METHOD_NOT_FOUND);
    }

    #[test]
    fn test_reply_serializes_result() {
        let message = Message::reply(RequestId::new(9), &FindTextInFilesResult { total: 12 });
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({ "id": 9, "result": { "total": 12 } })
        );
    }

    #[test]
    fn test_response_error_display() {
        let error = ResponseError::internal("boom");
        assert_eq!(error.to_string(), "boom (code -32603)");
    }

    #[test]
    fn test_parse_params_maps_failure_to_invalid_params() {
        let error = parse_params::<UnregisterParams>(json!({ "wrong": true })).unwrap_err();
        assert_eq!(error.code, codes::INVALID_PARAMS);
    }

    // ── Payload wire shapes ─────────────────────────────────────────────────

    #[test]
    fn test_diagnostics_snapshot_is_pairs_of_uri_and_list() {
        let diagnostic = Diagnostic::new(
            "boom",
            DiagnosticSeverity::Error,
            Range::new(0, 0, 0, 4),
        );
        let params = AcceptDiagnosticsDataParams {
            updates: vec![(uri("file:///a.rs"), vec![diagnostic])],
        };

        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(
            value,
            json!([[
                "file:///a.rs",
                [{
                    "message": "boom",
                    "severity": 1,
                    "range": {
                        "start": { "line": 0, "character": 0 },
                        "end": { "line": 0, "character": 4 },
                    },
                }],
            ]])
        );

        let back: AcceptDiagnosticsDataParams = serde_json::from_value(value).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn test_search_batch_carries_originating_request_id() {
        let params = AcceptSearchResultsParams {
            request: RequestId::new(3),
            items: vec![TextSearchResult::new(uri("git://repo?rev#src/a.ts"))],
        };
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(
            value,
            json!({ "request": 3, "items": [{ "uri": "git://repo?rev#src/a.ts" }] })
        );
    }

    #[test]
    fn test_provide_params_flatten_search_params() {
        let params = ProvideTextSearchResultsParams {
            provider: ProviderId::new(2),
            params: TextSearchParams::new(TextSearchQuery::literal("needle")),
        };
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["provider"], json!(2));
        assert_eq!(value["query"]["pattern"], json!("needle"));

        let back: ProvideTextSearchResultsParams = serde_json::from_value(value).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn test_register_and_unregister_payloads() {
        let register = serde_json::to_value(RegisterProviderParams {
            provider: ProviderId::new(5),
        })
        .unwrap();
        assert_eq!(register, json!({ "provider": 5 }));

        let unregister: UnregisterParams =
            serde_json::from_value(json!({ "registration": 8 })).unwrap();
        assert_eq!(unregister.registration, RegistrationId::new(8));
    }
}
