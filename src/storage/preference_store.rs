use super::kv_store::KeyValueStore;
use crate::error::{InterceptionError, Result};
use crate::models::{BackendConfigRecord, BackendEndpoint, Preference};
use std::sync::Arc;

/// Key holding `"true"` / `"false"`.
pub const KEY_MOCK_ENABLED: &str = "mock-enabled";
/// Key holding a JSON `{"url": ..., "port": ...}` record.
pub const KEY_BACKEND_CONFIG: &str = "backend-config";

/// Typed view over the two persisted preference keys.
#[derive(Clone)]
pub struct PreferenceStore {
    backend: Arc<dyn KeyValueStore>,
}

impl PreferenceStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Read the stored preference. Unreadable or corrupt values are logged
    /// and fall back to defaults. The first load of an empty store writes
    /// the default enabled flag so later loads see a persisted record.
    pub fn load(&self) -> Preference {
        let defaults = Preference::default();
        let enabled = match self.read(KEY_MOCK_ENABLED) {
            Some(raw) => parse_enabled(&raw).unwrap_or(defaults.enabled),
            None => {
                if let Err(err) = self.set_enabled(defaults.enabled) {
                    tracing::warn!("Failed to write default preference: {}", err);
                }
                defaults.enabled
            }
        };
        Preference {
            enabled,
            endpoint: self.load_endpoint(),
        }
    }

    /// Write the whole record.
    pub fn save(&self, preference: &Preference) -> Result<()> {
        self.set_enabled(preference.enabled)?;
        self.set_endpoint(preference.endpoint.as_ref())
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        let value = if enabled { "true" } else { "false" };
        self.backend
            .set(KEY_MOCK_ENABLED, value)
            .map_err(InterceptionError::from)
    }

    /// Store a backend override, or clear it with `None`.
    pub fn set_endpoint(&self, endpoint: Option<&BackendEndpoint>) -> Result<()> {
        match endpoint {
            Some(endpoint) => {
                let record = BackendConfigRecord::from(endpoint);
                let json = serde_json::to_string(&record)
                    .map_err(|e| InterceptionError::Storage(e.to_string()))?;
                self.backend.set(KEY_BACKEND_CONFIG, &json)?;
            }
            None => self.backend.remove(KEY_BACKEND_CONFIG)?,
        }
        Ok(())
    }

    fn load_endpoint(&self) -> Option<BackendEndpoint> {
        let raw = self.read(KEY_BACKEND_CONFIG)?;
        match serde_json::from_str::<BackendConfigRecord>(&raw) {
            Ok(record) => {
                let endpoint = BackendEndpoint::from(record);
                if endpoint.is_empty() {
                    None
                } else {
                    Some(endpoint)
                }
            }
            Err(err) => {
                report_corrupt(KEY_BACKEND_CONFIG, err.to_string());
                None
            }
        }
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.backend.get(key) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("Failed to read preference {}: {:#}", key, err);
                None
            }
        }
    }
}

fn parse_enabled(raw: &str) -> Option<bool> {
    match raw.trim() {
        "true" => Some(true),
        "false" => Some(false),
        other => {
            report_corrupt(KEY_MOCK_ENABLED, format!("unexpected value {other:?}"));
            None
        }
    }
}

fn report_corrupt(key: &str, reason: String) {
    let err = InterceptionError::ConfigParse {
        key: key.to_string(),
        reason,
    };
    tracing::warn!("{}; using default", err);
}
