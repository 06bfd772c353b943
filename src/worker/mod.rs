//! Interception worker ownership
//!
//! [`InterceptionWorkerManager`] owns the one background worker registration
//! for this origin. Nothing else touches the registry: the lifecycle
//! controller asks the manager to spawn, dispose or hard-reset, and the API
//! client asks it to classify same-origin requests while a worker is live.

pub mod classifier;
pub mod handlers;
pub mod platform;

pub use classifier::{Classification, ClassificationMiss, RequestBucket, RequestClassifier};
pub use handlers::{HandlerSet, MockHandler};
pub use platform::{LocalWorkerRegistry, Registration, WorkerPlatform};

use crate::error::{InterceptionError, Result};
use crate::models::{ApiResponse, HttpMethod};
use chrono::{DateTime, Utc};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;

pub const DEFAULT_WORKER_SCRIPT: &str = "/mockServiceWorker.js";
pub const DEFAULT_REGISTRATION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct WorkerManagerConfig {
    /// Worker script path, relative to the origin
    pub script_url: String,
    /// Page origin the worker is scoped to, e.g. `http://localhost:5173`
    pub origin: String,
    pub registration_timeout: Duration,
    /// Log passthrough of unclassified requests
    pub dev_mode: bool,
}

impl Default for WorkerManagerConfig {
    fn default() -> Self {
        Self {
            script_url: DEFAULT_WORKER_SCRIPT.to_string(),
            origin: crate::config::DEFAULT_PAGE_ORIGIN.to_string(),
            registration_timeout: DEFAULT_REGISTRATION_TIMEOUT,
            dev_mode: false,
        }
    }
}

/// The live registration. Never leaves this module.
#[derive(Debug)]
struct WorkerHandle {
    registration_id: String,
    scope: String,
    spawned_at: DateTime<Utc>,
}

/// Hook the API client uses to let a live worker answer a request first.
pub trait RequestInterceptor: Send + Sync {
    fn intercept(&self, method: HttpMethod, url: &str) -> Option<ApiResponse>;
}

pub struct InterceptionWorkerManager {
    platform: Arc<dyn WorkerPlatform>,
    config: WorkerManagerConfig,
    handle: Mutex<Option<WorkerHandle>>,
    classifier: RwLock<Option<Arc<RequestClassifier>>>,
}

impl InterceptionWorkerManager {
    pub fn new(platform: Arc<dyn WorkerPlatform>, config: WorkerManagerConfig) -> Self {
        Self {
            platform,
            config,
            handle: Mutex::new(None),
            classifier: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &WorkerManagerConfig {
        &self.config
    }

    fn scope(&self) -> String {
        format!("{}/", self.config.origin.trim_end_matches('/'))
    }

    /// Register a fresh worker serving `handlers`. Any handle still held is
    /// released first, so at most one registration is ever tracked.
    pub async fn spawn(&self, handlers: &HandlerSet) -> Result<()> {
        let mut guard = self.handle.lock().await;
        if let Some(previous) = guard.take() {
            tracing::warn!(
                "Replacing live worker registration {} before spawning",
                previous.registration_id
            );
            self.set_classifier(None);
            if let Err(err) = self.platform.unregister(&previous.registration_id).await {
                tracing::warn!(
                    "Failed to unregister previous worker {}: {:#}",
                    previous.registration_id,
                    err
                );
            }
        }

        let scope = self.scope();
        let timeout = self.config.registration_timeout;
        let registration = match tokio::time::timeout(
            timeout,
            self.platform.register(&self.config.script_url, &scope),
        )
        .await
        {
            Ok(Ok(registration)) => registration,
            Ok(Err(err)) => return Err(InterceptionError::WorkerRegistration(format!("{err:#}"))),
            Err(_) => {
                return Err(InterceptionError::WorkerRegistration(format!(
                    "registration did not complete within {}ms",
                    timeout.as_millis()
                )))
            }
        };

        tracing::info!(
            "Interception worker registered (id={}, scope={}, handlers={})",
            registration.id,
            registration.scope,
            handlers.len()
        );
        *guard = Some(WorkerHandle {
            registration_id: registration.id,
            scope: registration.scope,
            spawned_at: Utc::now(),
        });
        self.set_classifier(Some(Arc::new(RequestClassifier::new(
            handlers.clone(),
            self.config.dev_mode,
        ))));
        Ok(())
    }

    /// Unregister the tracked worker. On failure the handle is kept and
    /// interception keeps running.
    pub async fn dispose(&self) -> Result<()> {
        let mut guard = self.handle.lock().await;
        let Some(handle) = guard.take() else {
            tracing::debug!("Dispose requested with no live worker");
            return Ok(());
        };

        match self.platform.unregister(&handle.registration_id).await {
            Ok(found) => {
                if !found {
                    tracing::warn!(
                        "Worker {} was already gone from the registry",
                        handle.registration_id
                    );
                }
                self.set_classifier(None);
                tracing::info!(
                    "Interception worker {} disposed (scope={}, up since {})",
                    handle.registration_id,
                    handle.scope,
                    handle.spawned_at.to_rfc3339()
                );
                Ok(())
            }
            Err(err) => {
                let message = format!("{err:#}");
                *guard = Some(handle);
                Err(InterceptionError::StopFailed(message))
            }
        }
    }

    /// Unregister every registration the platform reports, including ones
    /// left behind by earlier sessions or builds. Returns how many were
    /// removed. Individual failures are logged and skipped.
    pub async fn hard_reset(&self) -> usize {
        let mut guard = self.handle.lock().await;
        let tracked = guard.take();
        self.set_classifier(None);

        let ids: Vec<String> = match self.platform.registrations().await {
            Ok(registrations) => registrations.into_iter().map(|r| r.id).collect(),
            Err(err) => {
                tracing::warn!("Could not enumerate worker registrations: {:#}", err);
                tracked.map(|h| h.registration_id).into_iter().collect()
            }
        };

        let mut cleared = 0;
        for id in ids {
            match self.platform.unregister(&id).await {
                Ok(true) => cleared += 1,
                Ok(false) => {}
                Err(err) => tracing::warn!("Failed to unregister worker {}: {:#}", id, err),
            }
        }
        tracing::info!("Hard reset cleared {} worker registration(s)", cleared);
        cleared
    }

    /// Number of mock handlers installed by the live worker.
    pub fn list_handlers(&self) -> usize {
        self.classifier().map(|c| c.handler_count()).unwrap_or(0)
    }

    pub async fn is_alive(&self) -> bool {
        self.handle.lock().await.is_some()
    }

    /// Classify a same-origin request path. Without a live worker nothing is
    /// intercepted and nothing is logged.
    pub fn classify(&self, method: HttpMethod, path: &str) -> Classification {
        match self.classifier() {
            Some(classifier) => classifier.classify(method, path),
            None => Classification::Passthrough(RequestClassifier::bucket(path)),
        }
    }

    fn classifier(&self) -> Option<Arc<RequestClassifier>> {
        self.classifier
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_classifier(&self, classifier: Option<Arc<RequestClassifier>>) {
        *self
            .classifier
            .write()
            .unwrap_or_else(PoisonError::into_inner) = classifier;
    }
}

impl RequestInterceptor for InterceptionWorkerManager {
    fn intercept(&self, method: HttpMethod, url: &str) -> Option<ApiResponse> {
        // The worker only observes traffic for its own origin.
        let origin = self.config.origin.trim_end_matches('/');
        let rest = url.strip_prefix(origin)?;
        if !(rest.is_empty() || rest.starts_with('/') || rest.starts_with('?')) {
            return None;
        }
        let path = if rest.is_empty() { "/" } else { rest };

        match self.classify(method, path) {
            Classification::Mocked(handler) => Some(handler.respond()),
            _ => None,
        }
    }
}
