//! Search cluster access.
//!
//! Extractors talk to the cluster only through [`SearchTransport`], which
//! covers the four operations they need (count, search, scroll, clear-scroll).
//! [`EsClient`] is the HTTP implementation; tests plug in an in-memory one.

pub mod executor;
pub mod response;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::error::{DumpError, Result};
use crate::query::{QueryDescriptor, SearchBody};

pub use executor::execute;
pub use response::{CountResponse, Document, Row, SearchPage, SearchResponse, TotalRelation};

/// Operations the extraction engine needs from a search cluster.
#[async_trait]
pub trait SearchTransport: Send + Sync {
    /// Number of documents matching the query part of `body`.
    async fn count(&self, indices: &[String], body: &SearchBody) -> Result<u64>;

    /// Run a search. With `scroll` set, the cluster opens a scroll session
    /// and the returned page carries its cursor id.
    async fn search(
        &self,
        indices: &[String],
        body: &SearchBody,
        scroll: Option<Duration>,
    ) -> Result<SearchPage>;

    /// Fetch the next page of a scroll session, renewing it for `ttl`.
    async fn scroll(&self, scroll_id: &str, ttl: Duration) -> Result<SearchPage>;

    /// Release a scroll session.
    async fn clear_scroll(&self, scroll_id: &str) -> Result<()>;
}

/// Count all documents a descriptor matches over its full range.
pub async fn count_matches<T>(transport: &T, query: &QueryDescriptor) -> Result<u64>
where
    T: SearchTransport + ?Sized,
{
    debug!(
        "Count body: {}",
        String::from_utf8_lossy(query.encoded_body())
    );
    transport.count(query.indices(), query.body()).await
}

/// HTTP client for an Elasticsearch-compatible cluster.
///
/// One `reqwest::Client` (and its connection pool) is shared by every request.
#[derive(Debug, Clone)]
pub struct EsClient {
    http: Client,
    base_url: String,
    credentials: Option<(String, Option<String>)>,
}

impl EsClient {
    /// Build the client and verify connectivity.
    ///
    /// Each configured host is pinged in order; the first one that answers
    /// becomes the base URL for the whole run.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .map_err(|e| DumpError::Connect {
                address: config.hosts.join(","),
                source: Box::new(e),
            })?;
        let credentials = config
            .username
            .clone()
            .map(|user| (user, config.password.clone()));

        let mut last_error: Option<DumpError> = None;
        for host in &config.hosts {
            let client = Self {
                http: http.clone(),
                base_url: host.trim_end_matches('/').to_string(),
                credentials: credentials.clone(),
            };
            match client.ping().await {
                Ok(()) => {
                    info!("Connected to {}", client.base_url);
                    return Ok(client);
                }
                Err(e) => {
                    warn!("Host {} is not reachable: {}", host, e);
                    last_error = Some(e);
                }
            }
        }

        Err(DumpError::Connect {
            address: config.hosts.join(","),
            source: match last_error {
                Some(e) => e.into(),
                None => "no hosts configured".into(),
            },
        })
    }

    /// Build a client against `base_url` without checking connectivity.
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials: None,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn ping(&self) -> Result<()> {
        let _: Value = execute(self.request(Method::GET, "/")).await?;
        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{}", self.base_url, path));
        match &self.credentials {
            Some((user, password)) => builder.basic_auth(user, password.as_deref()),
            None => builder,
        }
    }

    fn json_request(&self, method: Method, path: &str, body: Vec<u8>) -> RequestBuilder {
        self.request(method, path)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
    }
}

#[async_trait]
impl SearchTransport for EsClient {
    async fn count(&self, indices: &[String], body: &SearchBody) -> Result<u64> {
        let encoded = serde_json::to_vec(&body.count_body()).map_err(DumpError::Encode)?;
        let path = format!("/{}/_count", index_path(indices));
        let response: CountResponse =
            execute(self.json_request(Method::POST, &path, encoded)).await?;
        Ok(response.count)
    }

    async fn search(
        &self,
        indices: &[String],
        body: &SearchBody,
        scroll: Option<Duration>,
    ) -> Result<SearchPage> {
        let mut path = format!("/{}/_search", index_path(indices));
        if let Some(ttl) = scroll {
            path.push_str("?scroll=");
            path.push_str(&keep_alive(ttl));
        }
        let response: SearchResponse =
            execute(self.json_request(Method::POST, &path, body.encode()?)).await?;
        Ok(response.into())
    }

    async fn scroll(&self, scroll_id: &str, ttl: Duration) -> Result<SearchPage> {
        let body = json!({ "scroll": keep_alive(ttl), "scroll_id": scroll_id });
        let response: SearchResponse =
            execute(self.request(Method::POST, "/_search/scroll").json(&body)).await?;
        Ok(response.into())
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<()> {
        let body = json!({ "scroll_id": [scroll_id] });
        let _: Value = execute(self.request(Method::DELETE, "/_search/scroll").json(&body)).await?;
        Ok(())
    }
}

fn index_path(indices: &[String]) -> String {
    if indices.is_empty() {
        "_all".to_string()
    } else {
        indices.join(",")
    }
}

/// Render a scroll lifetime in the cluster's time-unit syntax.
fn keep_alive(ttl: Duration) -> String {
    if ttl.subsec_millis() == 0 {
        format!("{}s", ttl.as_secs())
    } else {
        format!("{}ms", ttl.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(hosts: Vec<String>) -> ConnectionConfig {
        ConnectionConfig {
            hosts,
            timeout: 5,
            ..ConnectionConfig::default()
        }
    }

    #[test]
    fn test_keep_alive_units() {
        assert_eq!(keep_alive(Duration::from_secs(180)), "180s");
        assert_eq!(keep_alive(Duration::from_millis(1500)), "1500ms");
    }

    #[test]
    fn test_index_path() {
        assert_eq!(index_path(&[]), "_all");
        assert_eq!(index_path(&["a".into(), "b".into()]), "a,b");
    }

    #[tokio::test]
    async fn test_connect_skips_unreachable_hosts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"cluster_name": "t"})))
            .mount(&server)
            .await;

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let dead = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let client = EsClient::connect(&config_for(vec![dead, format!("{}/", server.uri())]))
            .await
            .unwrap();
        assert_eq!(client.base_url(), server.uri());
    }

    #[tokio::test]
    async fn test_connect_fails_when_no_host_answers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "auth"})))
            .mount(&server)
            .await;

        let err = EsClient::connect(&config_for(vec![server.uri()]))
            .await
            .unwrap_err();
        assert!(matches!(err, DumpError::Connect { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_search_opens_scroll_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/logs-a,logs-b/_search"))
            .and(query_param("scroll", "180s"))
            .and(body_json(json!({"query": {"bool": {}}, "size": 2})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_scroll_id": "cursor-1",
                "hits": {"total": {"value": 1, "relation": "eq"},
                         "hits": [{"_id": "1", "_index": "logs-a", "_score": 1.0, "_source": {"a": 1}}]}
            })))
            .mount(&server)
            .await;

        let client = EsClient::new(Client::new(), server.uri());
        let page = client
            .search(
                &["logs-a".into(), "logs-b".into()],
                &SearchBody::default().with_size(2),
                Some(Duration::from_secs(180)),
            )
            .await
            .unwrap();
        assert_eq!(page.scroll_id.as_deref(), Some("cursor-1"));
        assert_eq!(page.documents.len(), 1);
        assert_eq!(page.documents[0].score, Some(1.0));
    }

    #[tokio::test]
    async fn test_scroll_count_and_clear_requests() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_search/scroll"))
            .and(body_json(json!({"scroll": "180s", "scroll_id": "cursor-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_scroll_id": "cursor-2",
                "hits": {"total": {"value": 1, "relation": "eq"}, "hits": []}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/logs/_count"))
            .and(body_json(json!({"query": {"bool": {}}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 7})))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/_search/scroll"))
            .and(body_json(json!({"scroll_id": ["cursor-2"]})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"succeeded": true, "num_freed": 1})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = EsClient::new(Client::new(), server.uri());
        let page = client
            .scroll("cursor-1", Duration::from_secs(180))
            .await
            .unwrap();
        assert_eq!(page.scroll_id.as_deref(), Some("cursor-2"));
        assert!(page.documents.is_empty());

        let count = client
            .count(&["logs".into()], &SearchBody::default().with_size(5))
            .await
            .unwrap();
        assert_eq!(count, 7);

        client.clear_scroll("cursor-2").await.unwrap();
    }
}
