//! # Dashboard REST Client
//!
//! Thin asynchronous client for the dashboard backend's REST surface, built
//! on `reqwest` with `reqwest-middleware` retrying transient failures using
//! exponential backoff.
//!
//! | method                  | endpoint                         |
//! |-------------------------|----------------------------------|
//! | `get_metrics`           | `GET /api/metrics`               |
//! | `get_sales_data`        | `GET /api/sales?range=<range>`   |
//! | `get_inventory_alerts`  | `GET /api/inventory/alerts`      |
//! | `get_user_activity`     | `GET /api/user-activity[?userId=]` |
//! | `track_activity`        | `POST /api/user-activity`        |

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::model::{ActivityEvent, InventoryAlert, MetricSnapshot, SalesPoint, TimeRange};

const DEFAULT_MAX_RETRIES: u32 = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised by [`ApiClient`].
#[derive(Debug, Error)]
pub enum ApiError {
    /// The underlying HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    /// The base URL or a joined path is not a valid absolute URL.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    /// The request could not be completed, even after retries.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest_middleware::Error),
    /// The server answered with a non-2xx status.
    #[error("API error {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body, empty if unreadable.
        body: String,
    },
    /// The body was not the expected JSON shape.
    #[error("failed to decode response: {0}")]
    Decode(#[from] reqwest::Error),
    /// A request body could not be serialized.
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Client for the dashboard REST endpoints.
#[derive(Clone)]
pub struct ApiClient {
    inner: ClientWithMiddleware,
    base_url: Url,
}

impl ApiClient {
    /// A client for `base_url` retrying transient failures three times.
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Self::with_max_retries(base_url, DEFAULT_MAX_RETRIES)
    }

    /// A client with an explicit retry budget.
    pub fn with_max_retries(base_url: &str, max_retries: u32) -> Result<Self, ApiError> {
        Self::with_options(base_url, max_retries, REQUEST_TIMEOUT)
    }

    /// A client with an explicit retry budget and per-request timeout.
    pub fn with_options(base_url: &str, max_retries: u32, timeout: Duration) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url)?;
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::Client)?;
        let inner = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self { inner, base_url })
    }

    /// The backend this client talks to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn checked(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        log::warn!("Dashboard API answered {}: {}", status, body);
        Err(ApiError::Http {
            status: status.as_u16(),
            body,
        })
    }

    /// `GET` a JSON document.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, ApiError> {
        let url = self.base_url.join(path)?;
        let mut req = self.inner.request(Method::GET, url);
        if !query.is_empty() {
            req = req.query(query);
        }
        let response = Self::checked(req.send().await?).await?;
        Ok(response.json::<T>().await?)
    }

    /// Current headline metrics.
    pub async fn get_metrics(&self) -> Result<MetricSnapshot, ApiError> {
        self.get_json("/api/metrics", &[]).await
    }

    /// Sales history for `range`.
    pub async fn get_sales_data(&self, range: TimeRange) -> Result<Vec<SalesPoint>, ApiError> {
        self.get_json("/api/sales", &[("range", range.as_str())]).await
    }

    /// Current inventory alerts.
    pub async fn get_inventory_alerts(&self) -> Result<Vec<InventoryAlert>, ApiError> {
        self.get_json("/api/inventory/alerts", &[]).await
    }

    /// Recent activity, optionally for one user.
    pub async fn get_user_activity(&self, user_id: Option<&str>) -> Result<Vec<ActivityEvent>, ApiError> {
        match user_id {
            Some(id) => self.get_json("/api/user-activity", &[("userId", id)]).await,
            None => self.get_json("/api/user-activity", &[]).await,
        }
    }

    /// Reports one activity event to the backend.
    pub async fn track_activity(&self, event: &ActivityEvent) -> Result<(), ApiError> {
        self.post_json("/api/user-activity", event).await
    }

    async fn post_json<B: Serialize>(&self, path: &str, body: &B) -> Result<(), ApiError> {
        let url = self.base_url.join(path)?;
        let json_body = serde_json::to_string(body)?;
        let response = self
            .inner
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(json_body)
            .send()
            .await?;
        Self::checked(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers one request with `status` and `body`, returning the request line.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw);
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            l.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if raw.len() >= head_end + 4 + length {
                        break;
                    }
                }
            }
            let request = String::from_utf8_lossy(&raw).to_string();
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            request.lines().next().unwrap_or_default().to_string()
        });
        (format!("http://{}", addr), handle)
    }

    #[test]
    fn relative_base_url_is_rejected() {
        assert!(matches!(ApiClient::new("localhost"), Err(ApiError::Url(_))));
    }

    #[tokio::test]
    async fn sales_request_carries_the_range() {
        let (base, server) = serve_once(
            "200 OK",
            r#"[{"timestamp":"2024-05-01T10:00:00Z","sales":120.5,"orders":2,"category":"Home"}]"#,
        )
        .await;
        let client = ApiClient::with_max_retries(&base, 0).unwrap();

        let points = client.get_sales_data(TimeRange::Week).await.unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].orders, 2);
        assert_eq!(server.await.unwrap(), "GET /api/sales?range=7d HTTP/1.1");
    }

    #[tokio::test]
    async fn user_filter_is_sent_as_query() {
        let (base, server) = serve_once("200 OK", "[]").await;
        let client = ApiClient::with_max_retries(&base, 0).unwrap();

        let events = client.get_user_activity(Some("user_42")).await.unwrap();
        assert!(events.is_empty());
        assert_eq!(server.await.unwrap(), "GET /api/user-activity?userId=user_42 HTTP/1.1");
    }

    #[tokio::test]
    async fn non_success_status_becomes_http_error() {
        let (base, _server) = serve_once("404 Not Found", r#"{"error":"missing"}"#).await;
        let client = ApiClient::with_max_retries(&base, 0).unwrap();

        match client.get_metrics().await {
            Err(ApiError::Http { status, body }) => {
                assert_eq!(status, 404);
                assert!(body.contains("missing"));
            }
            other => panic!("expected http error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn configured_timeout_bounds_a_silent_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let _server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let client = ApiClient::with_options(&base, 0, Duration::from_millis(200)).unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(5), client.get_metrics()).await;
        assert!(matches!(outcome, Ok(Err(ApiError::Transport(_)))));
    }

    #[tokio::test]
    async fn wrong_shape_is_a_decode_error() {
        let (base, _server) = serve_once("200 OK", r#"{"unexpected":true}"#).await;
        let client = ApiClient::with_max_retries(&base, 0).unwrap();
        assert!(matches!(client.get_inventory_alerts().await, Err(ApiError::Decode(_))));
    }

    #[tokio::test]
    async fn activity_is_posted_as_json() {
        let (base, server) = serve_once("201 Created", "{}").await;
        let client = ApiClient::with_max_retries(&base, 0).unwrap();
        let event = ActivityEvent {
            id: "activity_1".into(),
            user_id: "user_1".into(),
            session_id: "session_1".into(),
            timestamp: chrono::Utc::now(),
            kind: crate::model::ActivityKind::Search {
                query: "laptop".into(),
            },
        };

        client.track_activity(&event).await.unwrap();
        assert_eq!(server.await.unwrap(), "POST /api/user-activity HTTP/1.1");
    }
}
