//! Worker registration platform.
//!
//! The manager never talks to a concrete registration mechanism directly; it
//! is handed a [`WorkerPlatform`] at construction.

use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use uuid::Uuid;

/// One registration as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub id: String,
    pub script_url: String,
    pub scope: String,
}

pub trait WorkerPlatform: Send + Sync {
    /// Register a worker script for `scope`, resolving once the platform
    /// handshake completes.
    fn register<'a>(
        &'a self,
        script_url: &'a str,
        scope: &'a str,
    ) -> BoxFuture<'a, Result<Registration>>;

    /// Unregister by id. `Ok(false)` when the id was unknown.
    fn unregister<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<bool>>;

    /// Every registration visible to this origin, including ones this
    /// process did not create.
    fn registrations(&self) -> BoxFuture<'_, Result<Vec<Registration>>>;
}

/// In-process registry with the same semantics as a browser's worker
/// container. Failure injection hooks let callers rehearse rejected
/// registrations and failed unregisters.
#[derive(Default)]
pub struct LocalWorkerRegistry {
    entries: Mutex<Vec<Registration>>,
    register_delay: Mutex<Duration>,
    unregister_delay: Mutex<Duration>,
    fail_registrations: AtomicUsize,
    fail_unregistrations: AtomicUsize,
    register_calls: AtomicUsize,
    unregister_calls: AtomicUsize,
}

impl LocalWorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `count` registrations.
    pub fn fail_next_registrations(&self, count: usize) {
        self.fail_registrations.store(count, Ordering::SeqCst);
    }

    /// Reject every registration from now on.
    pub fn fail_all_registrations(&self) {
        self.fail_registrations.store(usize::MAX, Ordering::SeqCst);
    }

    /// Fail the next `count` unregister calls.
    pub fn fail_next_unregistrations(&self, count: usize) {
        self.fail_unregistrations.store(count, Ordering::SeqCst);
    }

    /// Simulated handshake latency for every registration.
    pub fn set_register_delay(&self, delay: Duration) {
        *self.register_delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Simulated teardown latency for every unregister call.
    pub fn set_unregister_delay(&self, delay: Duration) {
        *self.unregister_delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Plant a registration as if a previous session had left it behind.
    pub fn seed_orphan(&self, script_url: &str, scope: &str) -> String {
        let registration = Registration {
            id: Uuid::new_v4().to_string(),
            script_url: script_url.to_string(),
            scope: scope.to_string(),
        };
        let id = registration.id.clone();
        self.entries().push(registration);
        id
    }

    pub fn live_count(&self) -> usize {
        self.entries().len()
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn unregister_calls(&self) -> usize {
        self.unregister_calls.load(Ordering::SeqCst)
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, Vec<Registration>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

impl WorkerPlatform for LocalWorkerRegistry {
    fn register<'a>(
        &'a self,
        script_url: &'a str,
        scope: &'a str,
    ) -> BoxFuture<'a, Result<Registration>> {
        async move {
            self.register_calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.register_delay.lock().unwrap_or_else(PoisonError::into_inner);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if Self::take_failure(&self.fail_registrations) {
                return Err(anyhow!("registration of {} rejected by platform", script_url));
            }

            let registration = Registration {
                id: Uuid::new_v4().to_string(),
                script_url: script_url.to_string(),
                scope: scope.to_string(),
            };
            self.entries().push(registration.clone());
            Ok(registration)
        }
        .boxed()
    }

    fn unregister<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<bool>> {
        async move {
            self.unregister_calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.unregister_delay.lock().unwrap_or_else(PoisonError::into_inner);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if Self::take_failure(&self.fail_unregistrations) {
                return Err(anyhow!("unregister of {} failed", id));
            }
            let mut entries = self.entries();
            let before = entries.len();
            entries.retain(|r| r.id != id);
            Ok(before != entries.len())
        }
        .boxed()
    }

    fn registrations(&self) -> BoxFuture<'_, Result<Vec<Registration>>> {
        async move { Ok(self.entries().clone()) }.boxed()
    }
}
