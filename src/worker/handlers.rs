//! Mock handler set served by the interception worker.

use crate::models::{ApiResponse, HttpMethod};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// One canned route. `path` may contain `:param` segments and a trailing
/// `*` that matches the rest of the path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockHandler {
    pub method: HttpMethod,
    pub path: String,
    pub status: u16,
    pub body: Value,
}

impl MockHandler {
    pub fn new(method: HttpMethod, path: impl Into<String>, body: Value) -> Self {
        Self {
            method,
            path: path.into(),
            status: 200,
            body,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn matches(&self, method: HttpMethod, path: &str) -> bool {
        self.method == method && path_matches(&self.path, path)
    }

    pub fn respond(&self) -> ApiResponse {
        ApiResponse::from_status_and_body(self.status, Some(self.body.clone()))
    }
}

/// Immutable, cheaply clonable collection of handlers.
#[derive(Debug, Clone, Default)]
pub struct HandlerSet {
    handlers: Arc<Vec<MockHandler>>,
}

impl HandlerSet {
    pub fn new(handlers: Vec<MockHandler>) -> Self {
        Self {
            handlers: Arc::new(handlers),
        }
    }

    /// Handlers for the console's own screens, used when nothing else is
    /// configured.
    pub fn console_defaults() -> Self {
        use HttpMethod::*;
        Self::new(vec![
            MockHandler::new(
                Get,
                "/api/v1/servers",
                json!({"success": true, "data": [
                    {"id": "srv-1", "name": "edge-fra-01", "host": "10.0.1.10", "status": "online"},
                    {"id": "srv-2", "name": "edge-sin-01", "host": "10.0.2.10", "status": "offline"}
                ]}),
            ),
            MockHandler::new(
                Get,
                "/api/v1/servers/:id",
                json!({"success": true, "data": {"id": "srv-1", "name": "edge-fra-01"}}),
            ),
            MockHandler::new(
                Post,
                "/api/v1/servers",
                json!({"success": true, "message": "Server created"}),
            )
            .with_status(201),
            MockHandler::new(
                Get,
                "/api/v1/rules",
                json!({"success": true, "data": [
                    {"id": "rule-1", "listen": 8443, "target": "10.0.1.10:443"}
                ]}),
            ),
            MockHandler::new(
                Get,
                "/api/v1/dns/records",
                json!({"success": true, "data": [
                    {"name": "edge.example.com", "type": "A", "value": "203.0.113.7"}
                ]}),
            ),
            MockHandler::new(
                Get,
                "/api/v1/users",
                json!({"success": true, "data": [{"id": 1, "username": "admin"}]}),
            ),
            MockHandler::new(
                Post,
                "/api/v1/auth/login",
                json!({"success": true, "data": {"token": "mock-token"}}),
            ),
        ])
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MockHandler> {
        self.handlers.iter()
    }

    pub fn find(&self, method: HttpMethod, path: &str) -> Option<&MockHandler> {
        self.handlers.iter().find(|h| h.matches(method, path))
    }
}

fn path_matches(pattern: &str, path: &str) -> bool {
    let mut pattern_segments = pattern.trim_matches('/').split('/');
    let mut path_segments = path.trim_matches('/').split('/');

    loop {
        match (pattern_segments.next(), path_segments.next()) {
            (Some("*"), _) => return true,
            (Some(p), Some(s)) if p.starts_with(':') => {
                if s.is_empty() {
                    return false;
                }
            }
            (Some(p), Some(s)) => {
                if p != s {
                    return false;
                }
            }
            (None, None) => return true,
            _ => return false,
        }
    }
}
