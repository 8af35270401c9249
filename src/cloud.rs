//! Thin client for the Cursor cloud REST API.
//!
//! Requests carry `Authorization: Bearer <CURSOR_API_KEY>`; responses are
//! returned as raw JSON. No endpoint-specific types live here.

use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::CloudConfig;

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("CURSOR_API_KEY is not configured")]
    MissingApiKey,

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("cloud API returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("cloud API returned invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct CloudClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl CloudClient {
    pub fn new(config: &CloudConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    /// Use a preconfigured HTTP client (proxies, timeouts).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send one request. An empty success body yields `Value::Null`.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, CloudError> {
        let api_key = self.api_key.as_deref().ok_or(CloudError::MissingApiKey)?;
        let url = self.url(path);
        debug!("Cloud API {} {}", method, url);

        let mut request = self.client.request(method, &url).bearer_auth(api_key);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|source| CloudError::Transport {
            url: url.clone(),
            source,
        })?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|source| CloudError::Transport { url, source })?;

        if !status.is_success() {
            return Err(CloudError::Status { status, body: text });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    pub async fn get(&self, path: &str) -> Result<Value, CloudError> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, CloudError> {
        self.request(Method::POST, path, Some(body)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;

    async fn spawn_mock() -> String {
        let app = Router::new()
            .route(
                "/v0/agents",
                get(|headers: HeaderMap| async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    if auth != "Bearer key-123" {
                        return (axum::http::StatusCode::UNAUTHORIZED, "bad key").into_response();
                    }
                    Json(json!({"agents": [{"id": "bc-1"}]})).into_response()
                }),
            )
            .route(
                "/v0/echo",
                post(|Json(body): Json<Value>| async move { Json(json!({"received": body})) }),
            )
            .route("/v0/empty", post(|| async { "" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client(base_url: &str, key: Option<&str>) -> CloudClient {
        CloudClient::new(&CloudConfig {
            api_key: key.map(str::to_string),
            base_url: format!("{}/", base_url),
        })
        .with_http_client(Client::builder().no_proxy().build().unwrap())
    }

    #[tokio::test]
    async fn sends_bearer_and_parses_json() {
        let base = spawn_mock().await;
        let value = client(&base, Some("key-123"))
            .get("/v0/agents")
            .await
            .expect("request succeeds");
        assert_eq!(value["agents"][0]["id"], "bc-1");
    }

    #[tokio::test]
    async fn posts_json_body_and_handles_empty_response() {
        let base = spawn_mock().await;
        let c = client(&base, Some("key-123"));
        let echoed = c.post("v0/echo", &json!({"prompt": "hi"})).await.unwrap();
        assert_eq!(echoed["received"]["prompt"], "hi");
        assert_eq!(c.post("v0/empty", &json!({})).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn non_success_status_surfaces_body() {
        let base = spawn_mock().await;
        let err = client(&base, Some("wrong"))
            .get("/v0/agents")
            .await
            .expect_err("unauthorized");
        match err {
            CloudError::Status { status, body } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(body, "bad key");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let err = client("http://127.0.0.1:9", None)
            .get("/v0/agents")
            .await
            .expect_err("no key");
        assert!(matches!(err, CloudError::MissingApiKey));
    }
}
