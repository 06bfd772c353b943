//! Runtime configuration
//!
//! Everything here has a usable default; the environment only overrides.

use crate::error::{InterceptionError, Result};
use crate::models::BackendEndpoint;
use crate::worker::{WorkerManagerConfig, DEFAULT_REGISTRATION_TIMEOUT, DEFAULT_WORKER_SCRIPT};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PAGE_ORIGIN: &str = "http://localhost:5173";

pub const ENV_PAGE_ORIGIN: &str = "PROXYDECK_PAGE_ORIGIN";
pub const ENV_BACKEND_URL: &str = "PROXYDECK_BACKEND_URL";
pub const ENV_BACKEND_PORT: &str = "PROXYDECK_BACKEND_PORT";
pub const ENV_DEV_MODE: &str = "PROXYDECK_DEV_MODE";
pub const ENV_REGISTRATION_TIMEOUT_MS: &str = "PROXYDECK_REGISTRATION_TIMEOUT_MS";
pub const ENV_STORAGE_PATH: &str = "PROXYDECK_STORAGE_PATH";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleConfig {
    /// Origin the console page is served from; the intercepted base URL
    pub page_origin: String,
    /// Backend from the environment, if any
    pub backend: Option<BackendEndpoint>,
    pub dev_mode: bool,
    pub registration_timeout: Duration,
    pub worker_script: String,
    /// Directory holding the preference database
    pub storage_path: PathBuf,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            page_origin: DEFAULT_PAGE_ORIGIN.to_string(),
            backend: None,
            dev_mode: cfg!(debug_assertions),
            registration_timeout: DEFAULT_REGISTRATION_TIMEOUT,
            worker_script: DEFAULT_WORKER_SCRIPT.to_string(),
            storage_path: default_storage_path(),
        }
    }
}

impl ConsoleConfig {
    /// Defaults overridden by `PROXYDECK_*` variables. Unparsable values are
    /// rejected rather than silently ignored.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(origin) = get(ENV_PAGE_ORIGIN) {
            config.page_origin = origin.trim_end_matches('/').to_string();
        }

        if let Some(host) = get(ENV_BACKEND_URL) {
            let port = get(ENV_BACKEND_PORT).unwrap_or_default();
            let endpoint = BackendEndpoint::new(host, port);
            if !endpoint.port.is_empty() && endpoint.port_number().is_none() {
                return Err(parse_error(ENV_BACKEND_PORT, "not a port number"));
            }
            config.backend = Some(endpoint);
        }

        if let Some(raw) = get(ENV_DEV_MODE) {
            config.dev_mode = match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(parse_error(ENV_DEV_MODE, "expected a boolean")),
            };
        }

        if let Some(raw) = get(ENV_REGISTRATION_TIMEOUT_MS) {
            let ms: u64 = raw
                .parse()
                .map_err(|e: std::num::ParseIntError| parse_error(ENV_REGISTRATION_TIMEOUT_MS, e))?;
            config.registration_timeout = Duration::from_millis(ms);
        }

        if let Some(path) = get(ENV_STORAGE_PATH) {
            config.storage_path = PathBuf::from(path);
        }

        Ok(config)
    }

    pub fn worker_config(&self) -> WorkerManagerConfig {
        WorkerManagerConfig {
            script_url: self.worker_script.clone(),
            origin: self.page_origin.clone(),
            registration_timeout: self.registration_timeout,
            dev_mode: self.dev_mode,
        }
    }
}

fn default_storage_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("proxydeck")
}

fn parse_error(key: &str, reason: impl ToString) -> InterceptionError {
    InterceptionError::ConfigParse {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ALL_VARS: &[&str] = &[
        ENV_PAGE_ORIGIN,
        ENV_BACKEND_URL,
        ENV_BACKEND_PORT,
        ENV_DEV_MODE,
        ENV_REGISTRATION_TIMEOUT_MS,
        ENV_STORAGE_PATH,
    ];

    fn clear_env() {
        for key in ALL_VARS {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn empty_environment_gives_defaults() {
        clear_env();
        let config = ConsoleConfig::from_env().unwrap();
        assert_eq!(config, ConsoleConfig::default());
        assert!(config.storage_path.ends_with("proxydeck"));
    }

    #[test]
    #[serial]
    fn environment_overrides_apply() {
        clear_env();
        std::env::set_var(ENV_PAGE_ORIGIN, "https://console.example.com/");
        std::env::set_var(ENV_BACKEND_URL, "api.example.com");
        std::env::set_var(ENV_BACKEND_PORT, "443");
        std::env::set_var(ENV_DEV_MODE, "off");
        std::env::set_var(ENV_REGISTRATION_TIMEOUT_MS, "2500");
        std::env::set_var(ENV_STORAGE_PATH, "/tmp/proxydeck-test");

        let config = ConsoleConfig::from_env().unwrap();
        clear_env();

        assert_eq!(config.page_origin, "https://console.example.com");
        assert_eq!(config.backend, Some(BackendEndpoint::new("api.example.com", "443")));
        assert!(!config.dev_mode);
        assert_eq!(config.registration_timeout, Duration::from_millis(2500));
        assert_eq!(config.storage_path, PathBuf::from("/tmp/proxydeck-test"));

        let worker = config.worker_config();
        assert_eq!(worker.origin, "https://console.example.com");
        assert_eq!(worker.registration_timeout, Duration::from_millis(2500));
    }

    #[test]
    #[serial]
    fn port_without_host_is_ignored() {
        clear_env();
        std::env::set_var(ENV_BACKEND_PORT, "9000");
        let config = ConsoleConfig::from_env().unwrap();
        clear_env();
        assert_eq!(config.backend, None);
    }

    #[test]
    fn bad_values_are_rejected() {
        let lookup = |pairs: &'static [(&'static str, &'static str)]| {
            move |key: &str| {
                pairs
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, v)| v.to_string())
            }
        };

        let err = ConsoleConfig::from_lookup(lookup(&[(ENV_REGISTRATION_TIMEOUT_MS, "soon")]))
            .unwrap_err();
        assert!(matches!(err, InterceptionError::ConfigParse { ref key, .. } if key == ENV_REGISTRATION_TIMEOUT_MS));

        let err = ConsoleConfig::from_lookup(lookup(&[(ENV_DEV_MODE, "maybe")])).unwrap_err();
        assert!(matches!(err, InterceptionError::ConfigParse { ref key, .. } if key == ENV_DEV_MODE));

        let err = ConsoleConfig::from_lookup(lookup(&[
            (ENV_BACKEND_URL, "api.example.com"),
            (ENV_BACKEND_PORT, "https"),
        ]))
        .unwrap_err();
        assert!(matches!(err, InterceptionError::ConfigParse { ref key, .. } if key == ENV_BACKEND_PORT));
    }
}
