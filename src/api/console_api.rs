//! Console runtime API
//!
//! [`ConsoleRuntime`] is the one place the interception subsystem is
//! assembled. The application shell creates it once, calls
//! [`ConsoleRuntime::bootstrap`], and hands the [`ApiClient`] to the domain
//! services.

use crate::config::ConsoleConfig;
use crate::endpoint::EndpointSwitcher;
use crate::error::Result;
use crate::events::{EventBus, Subscription};
use crate::http::ApiClient;
use crate::lifecycle::{LifecycleController, RetryPolicy};
use crate::models::{
    BackendEndpoint, ConsoleEvent, EndpointConfig, EndpointSource, InterceptionState,
};
use crate::storage::{KeyValueStore, PreferenceStore, SqliteKeyValueStore};
use crate::worker::{HandlerSet, InterceptionWorkerManager, LocalWorkerRegistry, WorkerPlatform};
use anyhow::Context;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Get the version of the ProxyDeck core library
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Initialize logging (call once at startup).
///
/// Debug builds log to stderr. Release builds write a daily rolling file
/// under `<log_dir>/logs`. The level comes from `RUST_LOG`.
#[allow(unused_variables)]
pub fn init_core(log_dir: Option<&Path>) -> anyhow::Result<()> {
    let level = resolve_log_level(std::env::var("RUST_LOG").ok().as_deref());

    #[cfg(debug_assertions)]
    {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .try_init();
    }

    #[cfg(not(debug_assertions))]
    {
        let log_dir = log_dir
            .map(|p| p.join("logs"))
            .unwrap_or_else(|| std::path::PathBuf::from("logs"));

        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
        let file_appender = tracing_appender::rolling::daily(&log_dir, "proxydeck_core");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        // Logging lasts until process exit.
        std::mem::forget(guard);

        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(non_blocking)
            .try_init();
    }

    tracing::info!("ProxyDeck core initialized v{}", env!("CARGO_PKG_VERSION"));
    Ok(())
}

/// Map a `RUST_LOG` value to a level, defaulting to info.
pub fn resolve_log_level(value: Option<&str>) -> tracing::level_filters::LevelFilter {
    use tracing::level_filters::LevelFilter;

    match value.map(|v| v.trim().to_lowercase()) {
        Some(val) => match val.as_str() {
            "trace" => LevelFilter::TRACE,
            "debug" => LevelFilter::DEBUG,
            "info" => LevelFilter::INFO,
            "warn" | "warning" => LevelFilter::WARN,
            "error" => LevelFilter::ERROR,
            _ => LevelFilter::INFO,
        },
        None => LevelFilter::INFO,
    }
}

/// Everything a status panel shows about interception.
#[derive(Debug, Clone, Serialize)]
pub struct ConsoleStatus {
    pub state: InterceptionState,
    pub retry_budget: u32,
    pub base_url: String,
    pub endpoint: EndpointConfig,
    pub backend_source: EndpointSource,
    pub worker_alive: bool,
    pub handler_count: usize,
    pub last_error: Option<String>,
}

pub struct ConsoleRuntime {
    config: ConsoleConfig,
    bus: EventBus<ConsoleEvent>,
    preferences: PreferenceStore,
    manager: Arc<InterceptionWorkerManager>,
    controller: LifecycleController,
    switcher: Arc<EndpointSwitcher>,
    client: ApiClient,
    _switcher_subscription: Subscription,
}

impl ConsoleRuntime {
    pub fn new(
        config: ConsoleConfig,
        platform: Arc<dyn WorkerPlatform>,
        store: Arc<dyn KeyValueStore>,
        handlers: HandlerSet,
    ) -> Self {
        Self::with_policy(config, platform, store, handlers, RetryPolicy::default())
    }

    pub fn with_policy(
        config: ConsoleConfig,
        platform: Arc<dyn WorkerPlatform>,
        store: Arc<dyn KeyValueStore>,
        handlers: HandlerSet,
        policy: RetryPolicy,
    ) -> Self {
        let bus = EventBus::new();
        let preferences = PreferenceStore::new(store);
        let manager = Arc::new(InterceptionWorkerManager::new(
            platform,
            config.worker_config(),
        ));

        let switcher = Arc::new(EndpointSwitcher::new(
            config.page_origin.clone(),
            config.backend.clone(),
            preferences.clone(),
            bus.clone(),
        ));
        let switcher_subscription = switcher.attach(&bus);

        let controller = LifecycleController::new(
            manager.clone(),
            preferences.clone(),
            bus.clone(),
            handlers,
            policy,
        );
        let client = ApiClient::new(switcher.clone()).with_interceptor(manager.clone());

        Self {
            config,
            bus,
            preferences,
            manager,
            controller,
            switcher,
            client,
            _switcher_subscription: switcher_subscription,
        }
    }

    /// Production wiring: SQLite preferences under the configured storage
    /// path, the in-process worker registry and the console's own handlers.
    pub fn open(config: ConsoleConfig) -> anyhow::Result<Self> {
        let storage_path = config.storage_path.to_string_lossy().into_owned();
        let store = SqliteKeyValueStore::new(&storage_path)
            .with_context(|| format!("opening preference store in {storage_path}"))?;
        Ok(Self::new(
            config,
            Arc::new(LocalWorkerRegistry::new()),
            Arc::new(store),
            HandlerSet::console_defaults(),
        ))
    }

    /// Apply the stored preference and report where things settled.
    pub async fn bootstrap(&self) -> ConsoleStatus {
        let state = self.controller.bootstrap().await;
        tracing::info!(
            "Console bootstrapped: interception {}, API base {}",
            state,
            self.switcher.get_current_base_url()
        );
        self.status().await
    }

    pub async fn status(&self) -> ConsoleStatus {
        let snapshot = self.controller.snapshot();
        ConsoleStatus {
            state: snapshot.state,
            retry_budget: snapshot.retry_budget,
            base_url: self.switcher.get_current_base_url(),
            endpoint: self.switcher.endpoint_config(),
            backend_source: self.switcher.effective_backend().source,
            worker_alive: self.manager.is_alive().await,
            handler_count: self.manager.list_handlers(),
            last_error: snapshot.last_error,
        }
    }

    /// Save (or clear) the backend override and retarget the client.
    pub fn set_backend(&self, endpoint: Option<BackendEndpoint>) -> Result<String> {
        self.switcher.set_override(endpoint)
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus<ConsoleEvent> {
        &self.bus
    }

    pub fn preferences(&self) -> &PreferenceStore {
        &self.preferences
    }

    pub fn controller(&self) -> &LifecycleController {
        &self.controller
    }

    pub fn switcher(&self) -> &Arc<EndpointSwitcher> {
        &self.switcher
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }
}
