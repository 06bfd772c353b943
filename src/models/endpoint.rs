//! Backend endpoint models

use serde::{Deserialize, Serialize};

/// Host/port pair for the real backend, as entered by the user or derived
/// from the environment. `port` stays a string because that is how the
/// settings form collects it; an empty port means "scheme default".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendEndpoint {
    pub host: String,
    pub port: String,
}

impl BackendEndpoint {
    pub fn new(host: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: port.into(),
        }
    }

    /// Parsed port, `None` when empty or not a valid port number.
    pub fn port_number(&self) -> Option<u16> {
        self.port.trim().parse::<u16>().ok()
    }

    pub fn is_empty(&self) -> bool {
        self.host.trim().is_empty()
    }
}

/// Where the API client currently sends requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointMode {
    /// Same-origin addressing so the interception worker sees the traffic
    Intercepted,
    /// Straight to the configured backend
    Direct,
}

/// Derived endpoint view. Holds no state of its own: it is rebuilt from the
/// lifecycle state and the effective backend every time it is asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub mode: EndpointMode,
    pub host: String,
    pub port: Option<u16>,
}

/// Which layer the effective backend endpoint came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointSource {
    User,
    Environment,
    Fallback,
}
