//! User preference record persisted across reloads.

use crate::models::endpoint::BackendEndpoint;
use serde::{Deserialize, Serialize};

/// Durable user choice: whether mock interception should run and which
/// backend to talk to when it doesn't.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preference {
    pub enabled: bool,
    /// `None` until the user saves a backend in settings
    pub endpoint: Option<BackendEndpoint>,
}

impl Default for Preference {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
        }
    }
}

/// On-disk shape of the `backend-config` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfigRecord {
    pub url: String,
    #[serde(default)]
    pub port: String,
}

impl From<&BackendEndpoint> for BackendConfigRecord {
    fn from(endpoint: &BackendEndpoint) -> Self {
        Self {
            url: endpoint.host.clone(),
            port: endpoint.port.clone(),
        }
    }
}

impl From<BackendConfigRecord> for BackendEndpoint {
    fn from(record: BackendConfigRecord) -> Self {
        BackendEndpoint::new(record.url, record.port)
    }
}
