//! Single request/response cycle against the cluster.

use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{DumpError, Result};

/// Send `request` and decode a successful body into `T`.
///
/// The response body is always read to completion, which hands the
/// connection back to the client. There is no retry at this level.
pub async fn execute<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
    let response = request.send().await.map_err(DumpError::Request)?;
    let status = response.status();
    let bytes = response.bytes().await.map_err(DumpError::Request)?;

    if !status.is_success() {
        let body: Map<String, Value> = serde_json::from_slice(&bytes)
            .map_err(|e| DumpError::decode(format!("error body of {status} response"), e))?;
        debug!("Cluster rejected request with status {}", status);
        return Err(DumpError::Response {
            status: status.as_u16(),
            body: Value::Object(body),
        });
    }

    serde_json::from_slice(&bytes).map_err(|e| DumpError::decode("response body", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn server_answering(template: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/probe"))
            .respond_with(template)
            .mount(&server)
            .await;
        server
    }

    fn probe(server: &MockServer) -> RequestBuilder {
        reqwest::Client::new().get(format!("{}/probe", server.uri()))
    }

    #[tokio::test]
    async fn test_success_is_decoded() {
        let server =
            server_answering(ResponseTemplate::new(200).set_body_json(json!({"count": 42}))).await;
        let value: Value = execute(probe(&server)).await.unwrap();
        assert_eq!(value["count"], 42);
    }

    #[tokio::test]
    async fn test_error_status_keeps_diagnostic_body() {
        let diagnostic = json!({"error": {"type": "index_not_found_exception"}, "status": 404});
        let server =
            server_answering(ResponseTemplate::new(404).set_body_json(diagnostic.clone())).await;

        match execute::<Value>(probe(&server)).await {
            Err(DumpError::Response { status, body }) => {
                assert_eq!(status, 404);
                assert_eq!(body, diagnostic);
            }
            other => panic!("expected response error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_undecodable_error_body() {
        let server =
            server_answering(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
                .await;
        let err = execute::<Value>(probe(&server)).await.unwrap_err();
        assert!(matches!(err, DumpError::Decode { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_undecodable_success_body() {
        let server = server_answering(ResponseTemplate::new(200).set_body_string("not json")).await;
        let err = execute::<Value>(probe(&server)).await.unwrap_err();
        assert!(matches!(err, DumpError::Decode { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_transport_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let request = reqwest::Client::new().get(format!("http://127.0.0.1:{port}/"));
        let err = execute::<Value>(request).await.unwrap_err();
        assert!(matches!(err, DumpError::Request(_)), "{err:?}");
    }
}
