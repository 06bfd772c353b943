//! Endpoint switching
//!
//! [`EndpointSwitcher`] owns the base URL every [`crate::http::ApiClient`]
//! request is resolved against. While interception is running requests go
//! to the page origin, where the worker can see them; otherwise they go
//! straight to the configured backend.
//!
//! The base URL, its parsed form and the pooled HTTP client live under one
//! lock. Changing the URL drops the derived parts in the same critical
//! section, so a reader sees either the old triple or the new one.

mod resolve;

pub use resolve::{
    compose_base_url, resolve_backend, ResolvedBackend, FALLBACK_BACKEND_HOST,
    FALLBACK_BACKEND_PORT,
};

use crate::error::Result;
use crate::events::{EventBus, Subscription};
use crate::models::{
    BackendEndpoint, ConsoleEvent, EndpointChange, EndpointConfig, EndpointMode,
    InterceptionState, TOPIC_STATE,
};
use crate::storage::PreferenceStore;
use reqwest::Url;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Per-request timeout applied by the pooled client.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

struct Cache {
    base_url: String,
    parsed: Option<Url>,
    client: Option<reqwest::Client>,
    generation: u64,
}

/// Consistent view of the current target, taken under one read.
#[derive(Debug, Clone)]
pub struct EndpointSnapshot {
    pub base_url: String,
    pub parsed: Option<Url>,
    pub client: reqwest::Client,
    pub generation: u64,
}

pub struct EndpointSwitcher {
    page_origin: String,
    environment: Option<BackendEndpoint>,
    preferences: PreferenceStore,
    bus: EventBus<ConsoleEvent>,
    user_override: RwLock<Option<BackendEndpoint>>,
    state: RwLock<InterceptionState>,
    cache: RwLock<Cache>,
    clears: AtomicU64,
}

impl EndpointSwitcher {
    /// Build a switcher in direct mode, reading the stored override once.
    pub fn new(
        page_origin: impl Into<String>,
        environment: Option<BackendEndpoint>,
        preferences: PreferenceStore,
        bus: EventBus<ConsoleEvent>,
    ) -> Self {
        let page_origin: String = page_origin.into();
        let user_override = preferences.load().endpoint;
        let resolved = resolve_backend(user_override.as_ref(), environment.as_ref());
        let base_url = compose_base_url(&resolved.endpoint);
        tracing::info!(
            "Backend endpoint {} (source={:?})",
            base_url,
            resolved.source
        );

        Self {
            page_origin: page_origin.trim_end_matches('/').to_string(),
            environment,
            preferences,
            bus,
            user_override: RwLock::new(user_override),
            state: RwLock::new(InterceptionState::Idle),
            cache: RwLock::new(Cache {
                base_url,
                parsed: None,
                client: None,
                generation: 0,
            }),
            clears: AtomicU64::new(0),
        }
    }

    /// Recompute on every lifecycle state event. The subscription holds the
    /// switcher weakly.
    pub fn attach(self: &Arc<Self>, bus: &EventBus<ConsoleEvent>) -> Subscription {
        let switcher = Arc::downgrade(self);
        bus.subscribe(TOPIC_STATE, move |event: &ConsoleEvent| {
            let Some(change) = event.as_state_change() else {
                return;
            };
            if let Some(switcher) = switcher.upgrade() {
                switcher.apply_state(change.state);
            }
        })
    }

    pub fn get_current_base_url(&self) -> String {
        self.read_cache().base_url.clone()
    }

    /// Swap the base URL. Returns `false` (and touches nothing) when `url`
    /// is already current.
    pub fn update_base_url(&self, url: &str) -> bool {
        let url = url.trim_end_matches('/');
        {
            let mut cache = self.write_cache();
            if cache.base_url == url {
                return false;
            }
            tracing::info!("Switching API base URL {} -> {}", cache.base_url, url);
            cache.base_url = url.to_string();
            self.invalidate(&mut cache);
        }

        let event = ConsoleEvent::EndpointChanged(EndpointChange {
            base_url: url.to_string(),
            mode: self.mode(),
        });
        self.bus.emit(event.topic(), &event);
        true
    }

    /// Drop the parsed URL and pooled client; the next request rebuilds them.
    pub fn clear_cache(&self) {
        let mut cache = self.write_cache();
        self.invalidate(&mut cache);
    }

    /// How many times the derived cache has been dropped.
    pub fn cache_clears(&self) -> u64 {
        self.clears.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> reqwest::Result<EndpointSnapshot> {
        {
            let cache = self.read_cache();
            if let Some(client) = &cache.client {
                return Ok(EndpointSnapshot {
                    base_url: cache.base_url.clone(),
                    parsed: cache.parsed.clone(),
                    client: client.clone(),
                    generation: cache.generation,
                });
            }
        }

        let mut cache = self.write_cache();
        let client = match &cache.client {
            Some(client) => client.clone(),
            None => {
                let client = reqwest::Client::builder()
                    .timeout(REQUEST_TIMEOUT)
                    .build()?;
                cache.parsed = Url::parse(&cache.base_url).ok();
                cache.client = Some(client.clone());
                tracing::debug!(
                    "Built HTTP client for {} (generation {})",
                    cache.base_url,
                    cache.generation
                );
                client
            }
        };
        Ok(EndpointSnapshot {
            base_url: cache.base_url.clone(),
            parsed: cache.parsed.clone(),
            client,
            generation: cache.generation,
        })
    }

    pub fn mode(&self) -> EndpointMode {
        if *self.read_state() == InterceptionState::Running {
            EndpointMode::Intercepted
        } else {
            EndpointMode::Direct
        }
    }

    pub fn effective_backend(&self) -> ResolvedBackend {
        let user = self
            .user_override
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        resolve_backend(user.as_ref(), self.environment.as_ref())
    }

    /// Derived view: mode follows the lifecycle state, host and port are the
    /// effective backend's.
    pub fn endpoint_config(&self) -> EndpointConfig {
        let backend = self.effective_backend().endpoint;
        EndpointConfig {
            mode: self.mode(),
            port: backend.port_number(),
            host: backend.host,
        }
    }

    /// Store (or clear, with `None`) the user's backend override and point
    /// the client at the result. Returns the base URL now in effect.
    pub fn set_override(&self, endpoint: Option<BackendEndpoint>) -> Result<String> {
        let endpoint = endpoint.filter(|e| !e.is_empty());
        self.preferences.set_endpoint(endpoint.as_ref())?;
        *self
            .user_override
            .write()
            .unwrap_or_else(PoisonError::into_inner) = endpoint;

        self.update_base_url(&self.target_url());
        Ok(self.get_current_base_url())
    }

    /// Track a lifecycle state and retarget. Returns whether the URL changed.
    pub fn apply_state(&self, state: InterceptionState) -> bool {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
        self.update_base_url(&self.target_url())
    }

    fn target_url(&self) -> String {
        match self.mode() {
            EndpointMode::Intercepted => self.page_origin.clone(),
            EndpointMode::Direct => compose_base_url(&self.effective_backend().endpoint),
        }
    }

    fn invalidate(&self, cache: &mut Cache) {
        cache.parsed = None;
        cache.client = None;
        cache.generation += 1;
        self.clears.fetch_add(1, Ordering::SeqCst);
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, Cache> {
        self.cache.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, Cache> {
        self.cache.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_state(&self) -> RwLockReadGuard<'_, InterceptionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{StateChange, TOPIC_ENDPOINT};
    use crate::storage::{MemoryKeyValueStore, KEY_BACKEND_CONFIG};
    use chrono::Utc;
    use std::sync::Mutex;

    const ORIGIN: &str = "http://localhost:5173";

    fn switcher_with(kv: MemoryKeyValueStore, env: Option<BackendEndpoint>) -> EndpointSwitcher {
        EndpointSwitcher::new(
            ORIGIN,
            env,
            PreferenceStore::new(Arc::new(kv)),
            EventBus::new(),
        )
    }

    fn state_event(previous: InterceptionState, state: InterceptionState) -> ConsoleEvent {
        ConsoleEvent::StateChanged(StateChange {
            previous,
            state,
            retry_budget: 3,
            error: None,
            at: Utc::now(),
        })
    }

    #[test]
    fn repeated_values_clear_once_per_distinct_value() {
        let switcher = switcher_with(MemoryKeyValueStore::new(), None);
        let sequence = [
            "https://a.example.com",
            "https://a.example.com",
            "https://a.example.com",
            "https://b.example.com",
            "https://b.example.com",
        ];

        let changed: Vec<bool> = sequence.iter().map(|u| switcher.update_base_url(u)).collect();
        assert_eq!(changed, vec![true, false, false, true, false]);
        assert_eq!(switcher.cache_clears(), 2);
        assert_eq!(switcher.get_current_base_url(), "https://b.example.com");
    }

    #[test]
    fn snapshot_reuses_client_until_invalidated() {
        let switcher = switcher_with(MemoryKeyValueStore::new(), None);
        let first = switcher.snapshot().unwrap();
        let again = switcher.snapshot().unwrap();
        assert_eq!(first.generation, again.generation);
        assert_eq!(first.parsed.as_ref().map(|u| u.port()), Some(Some(8080)));

        switcher.clear_cache();
        let rebuilt = switcher.snapshot().unwrap();
        assert_eq!(rebuilt.generation, first.generation + 1);
        assert_eq!(rebuilt.base_url, first.base_url);
    }

    #[test]
    fn running_targets_page_origin_and_back() {
        let switcher = switcher_with(
            MemoryKeyValueStore::new(),
            Some(BackendEndpoint::new("api.internal", "9000")),
        );
        assert_eq!(switcher.get_current_base_url(), "http://api.internal:9000");

        assert!(switcher.apply_state(InterceptionState::Running));
        assert_eq!(switcher.get_current_base_url(), ORIGIN);
        assert_eq!(switcher.endpoint_config().mode, EndpointMode::Intercepted);

        assert!(switcher.apply_state(InterceptionState::Stopped));
        assert_eq!(switcher.get_current_base_url(), "http://api.internal:9000");
        assert_eq!(
            switcher.endpoint_config(),
            EndpointConfig {
                mode: EndpointMode::Direct,
                host: "api.internal".to_string(),
                port: Some(9000),
            }
        );
    }

    #[test]
    fn stored_override_wins_at_startup() {
        let kv = MemoryKeyValueStore::with_entries([(
            KEY_BACKEND_CONFIG,
            r#"{"url":"api.example.com","port":"443"}"#,
        )]);
        let switcher = switcher_with(kv, Some(BackendEndpoint::new("env.local", "8000")));
        assert_eq!(switcher.get_current_base_url(), "https://api.example.com");
        assert_eq!(switcher.effective_backend().source, crate::models::EndpointSource::User);
    }

    #[test]
    fn set_override_persists_and_retargets() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let preferences = PreferenceStore::new(kv.clone());
        let switcher = EndpointSwitcher::new(ORIGIN, None, preferences.clone(), EventBus::new());

        let url = switcher
            .set_override(Some(BackendEndpoint::new("staging.example.com", "8443")))
            .unwrap();
        assert_eq!(url, "http://staging.example.com:8443");
        assert_eq!(
            preferences.load().endpoint,
            Some(BackendEndpoint::new("staging.example.com", "8443"))
        );

        let url = switcher.set_override(None).unwrap();
        assert_eq!(url, "http://localhost:8080");
        assert_eq!(preferences.load().endpoint, None);
    }

    #[test]
    fn override_while_running_keeps_page_origin() {
        let switcher = switcher_with(MemoryKeyValueStore::new(), None);
        switcher.apply_state(InterceptionState::Running);
        let url = switcher
            .set_override(Some(BackendEndpoint::new("api.example.com", "443")))
            .unwrap();
        assert_eq!(url, ORIGIN);
    }

    #[test]
    fn attached_switcher_follows_bus_and_announces_changes() {
        let bus = EventBus::new();
        let switcher = Arc::new(EndpointSwitcher::new(
            ORIGIN,
            None,
            PreferenceStore::new(Arc::new(MemoryKeyValueStore::new())),
            bus.clone(),
        ));
        let _attached = switcher.attach(&bus);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let _listener = bus.subscribe(TOPIC_ENDPOINT, {
            let seen = seen.clone();
            move |event: &ConsoleEvent| {
                if let ConsoleEvent::EndpointChanged(change) = event {
                    seen.lock().unwrap().push((change.base_url.clone(), change.mode));
                }
            }
        });

        bus.emit(TOPIC_STATE, &state_event(InterceptionState::Idle, InterceptionState::Starting));
        bus.emit(TOPIC_STATE, &state_event(InterceptionState::Starting, InterceptionState::Running));
        assert_eq!(switcher.get_current_base_url(), ORIGIN);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(ORIGIN.to_string(), EndpointMode::Intercepted)]
        );
    }

    #[test]
    fn dropped_switcher_is_ignored_by_bus() {
        let bus = EventBus::new();
        let switcher = Arc::new(switcher_with(MemoryKeyValueStore::new(), None));
        let _attached = switcher.attach(&bus);
        drop(switcher);

        assert_eq!(
            bus.emit(TOPIC_STATE, &state_event(InterceptionState::Idle, InterceptionState::Starting)),
            1
        );
    }
}
