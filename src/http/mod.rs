//! REST client used by the console's domain services.
//!
//! Every call resolves its URL against the [`EndpointSwitcher`] at send time,
//! so a mode switch takes effect on the very next request. Failures never
//! reach the caller as errors: they come back as `success = false`.

use crate::endpoint::EndpointSwitcher;
use crate::models::{ApiResponse, HttpMethod};
use crate::worker::RequestInterceptor;
use reqwest::header::ACCEPT;
use serde_json::Value;
use std::sync::Arc;

#[derive(Clone)]
pub struct ApiClient {
    switcher: Arc<EndpointSwitcher>,
    interceptor: Option<Arc<dyn RequestInterceptor>>,
}

impl ApiClient {
    pub fn new(switcher: Arc<EndpointSwitcher>) -> Self {
        Self {
            switcher,
            interceptor: None,
        }
    }

    /// Let a live interception worker answer same-origin requests first.
    pub fn with_interceptor(mut self, interceptor: Arc<dyn RequestInterceptor>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    pub async fn get(&self, path: &str) -> ApiResponse {
        self.request(HttpMethod::Get, path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> ApiResponse {
        self.request(HttpMethod::Post, path, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> ApiResponse {
        self.request(HttpMethod::Put, path, Some(body)).await
    }

    pub async fn patch(&self, path: &str, body: Value) -> ApiResponse {
        self.request(HttpMethod::Patch, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> ApiResponse {
        self.request(HttpMethod::Delete, path, None).await
    }

    pub async fn request(&self, method: HttpMethod, path: &str, body: Option<Value>) -> ApiResponse {
        let snapshot = match self.switcher.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!("Failed to create HTTP client: {}", e);
                return ApiResponse::failure(format!("Failed to create HTTP client: {}", e));
            }
        };
        let url = join_url(&snapshot.base_url, path);

        if let Some(interceptor) = &self.interceptor {
            if let Some(response) = interceptor.intercept(method, &url) {
                tracing::debug!("{} {} answered by interception worker", method, url);
                return response;
            }
        }

        let mut request_builder = snapshot
            .client
            .request(method.to_reqwest(), &url)
            .header(ACCEPT, "application/json");
        if let Some(body) = &body {
            request_builder = request_builder.json(body);
        }

        match request_builder.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let bytes = match response.bytes().await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!("{} {} body read failed: {}", method, url, e);
                        return ApiResponse::failure(format!("Failed to read response: {}", e));
                    }
                };
                let body = if bytes.is_empty() {
                    None
                } else {
                    Some(serde_json::from_slice::<Value>(&bytes).unwrap_or_else(|_| {
                        Value::String(String::from_utf8_lossy(&bytes).into_owned())
                    }))
                };
                tracing::debug!("{} {} -> {}", method, url, status);
                ApiResponse::from_status_and_body(status, body)
            }
            Err(e) => {
                tracing::warn!("{} {} failed: {}", method, url, e);
                ApiResponse::failure(format!("Request failed: {}", e))
            }
        }
    }

    pub fn get_current_base_url(&self) -> String {
        self.switcher.get_current_base_url()
    }

    pub fn update_base_url(&self, url: &str) -> bool {
        self.switcher.update_base_url(url)
    }

    pub fn clear_cache(&self) {
        self.switcher.clear_cache()
    }
}

/// Absolute URLs are used as given; anything else is joined onto `base`.
fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::models::{BackendEndpoint, InterceptionState};
    use crate::storage::{MemoryKeyValueStore, PreferenceStore};
    use crate::worker::{
        HandlerSet, InterceptionWorkerManager, LocalWorkerRegistry, WorkerManagerConfig,
    };
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const ORIGIN: &str = "http://localhost:5173";

    fn switcher(backend: Option<BackendEndpoint>) -> Arc<EndpointSwitcher> {
        Arc::new(EndpointSwitcher::new(
            ORIGIN,
            backend,
            PreferenceStore::new(Arc::new(MemoryKeyValueStore::new())),
            EventBus::new(),
        ))
    }

    /// Serve one canned HTTP response and return the bound port.
    async fn serve_once(status_line: &'static str, body: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        port
    }

    #[test]
    fn join_url_handles_slashes_and_absolute_paths() {
        assert_eq!(join_url("http://h:1/", "/api/v1/users"), "http://h:1/api/v1/users");
        assert_eq!(join_url("http://h:1", "api/v1/users"), "http://h:1/api/v1/users");
        assert_eq!(join_url("http://h:1", "https://other/x"), "https://other/x");
    }

    #[tokio::test]
    async fn backend_json_is_wrapped() {
        let port = serve_once("200 OK", r#"[{"id":"srv-1"}]"#).await;
        let client = ApiClient::new(switcher(Some(BackendEndpoint::new(
            "127.0.0.1",
            port.to_string(),
        ))));

        let response = client.get("/api/v1/servers").await;
        assert!(response.success);
        assert_eq!(response.data, Some(json!([{"id": "srv-1"}])));
    }

    #[tokio::test]
    async fn backend_envelope_passes_through() {
        let port = serve_once(
            "422 Unprocessable Entity",
            r#"{"success":false,"message":"name is required"}"#,
        )
        .await;
        let client = ApiClient::new(switcher(Some(BackendEndpoint::new(
            "127.0.0.1",
            port.to_string(),
        ))));

        let response = client.get("/api/v1/rules").await;
        assert!(!response.success);
        assert_eq!(response.message.as_deref(), Some("name is required"));
    }

    #[tokio::test]
    async fn transport_failure_becomes_failed_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = ApiClient::new(switcher(Some(BackendEndpoint::new(
            "127.0.0.1",
            port.to_string(),
        ))));
        let response = client.delete("/api/v1/users/u-1").await;
        assert!(!response.success);
        assert!(response.message.unwrap().starts_with("Request failed"));
    }

    #[tokio::test]
    async fn running_worker_answers_same_origin_requests() {
        let registry = Arc::new(LocalWorkerRegistry::new());
        let manager = Arc::new(InterceptionWorkerManager::new(
            registry,
            WorkerManagerConfig {
                origin: ORIGIN.to_string(),
                ..WorkerManagerConfig::default()
            },
        ));
        manager.spawn(&HandlerSet::console_defaults()).await.unwrap();

        let switcher = switcher(None);
        switcher.apply_state(InterceptionState::Running);
        let client = ApiClient::new(switcher).with_interceptor(manager);

        assert_eq!(client.get_current_base_url(), ORIGIN);
        let response = client.post("/api/v1/servers", json!({"name": "edge-1"})).await;
        assert!(response.success);
        assert_eq!(response.message.as_deref(), Some("Server created"));

        let response = client.get("/api/v1/users").await;
        assert_eq!(response.data, Some(json!([{"id": 1, "username": "admin"}])));
    }

    #[test]
    fn base_url_helpers_delegate_to_switcher() {
        let client = ApiClient::new(switcher(None));
        assert_eq!(client.get_current_base_url(), "http://localhost:8080");
        assert!(client.update_base_url("https://api.example.com"));
        assert!(!client.update_base_url("https://api.example.com/"));
        client.clear_cache();
        assert_eq!(client.get_current_base_url(), "https://api.example.com");
    }
}
