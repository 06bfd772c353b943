//! Interception lifecycle controller
//!
//! The single authority over [`InterceptionState`]. Start, stop and reset
//! requests from any number of callers are funnelled through here and turned
//! into worker operations, with a bounded retry policy on startup.
//!
//! Only one start and one stop can be in flight. A start runs as a detached
//! task behind a shared future: the caller that began it awaits the outcome
//! directly, later callers await the same future under a fixed ceiling, and
//! a caller giving up never cancels the attempt itself.

mod retry;

pub use retry::*;

use crate::error::{InterceptionError, Result};
use crate::events::EventBus;
use crate::models::{ConsoleEvent, InterceptionState, StateChange};
use crate::storage::PreferenceStore;
use crate::worker::{HandlerSet, InterceptionWorkerManager};
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type StartOutcome = Result<InterceptionState>;
type SharedStart = Shared<BoxFuture<'static, StartOutcome>>;

/// Point-in-time view for status panels and diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerSnapshot {
    pub state: InterceptionState,
    pub retry_budget: u32,
    pub busy_starting: bool,
    pub busy_stopping: bool,
    pub last_error: Option<String>,
}

struct Machine {
    state: InterceptionState,
    budget: RetryBudget,
    last_error: Option<String>,
}

struct ControllerInner {
    manager: Arc<InterceptionWorkerManager>,
    preferences: PreferenceStore,
    bus: EventBus<ConsoleEvent>,
    handlers: HandlerSet,
    policy: RetryPolicy,
    machine: Mutex<Machine>,
    busy_starting: AtomicBool,
    busy_stopping: AtomicBool,
    in_flight: Mutex<Option<SharedStart>>,
}

#[derive(Clone)]
pub struct LifecycleController {
    inner: Arc<ControllerInner>,
}

/// Clears a busy flag when the operation holding it ends, however it ends.
struct BusyFlag<'a>(&'a AtomicBool);

impl Drop for BusyFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Releases the in-flight start slot when the start task finishes or unwinds.
struct StartSlot(Arc<ControllerInner>);

impl Drop for StartSlot {
    fn drop(&mut self) {
        *self.0.in_flight_slot() = None;
        self.0.busy_starting.store(false, Ordering::SeqCst);
    }
}

impl LifecycleController {
    pub fn new(
        manager: Arc<InterceptionWorkerManager>,
        preferences: PreferenceStore,
        bus: EventBus<ConsoleEvent>,
        handlers: HandlerSet,
        policy: RetryPolicy,
    ) -> Self {
        let budget = RetryBudget::new(policy.max_attempts);
        Self {
            inner: Arc::new(ControllerInner {
                manager,
                preferences,
                bus,
                handlers,
                policy,
                machine: Mutex::new(Machine {
                    state: InterceptionState::Idle,
                    budget,
                    last_error: None,
                }),
                busy_starting: AtomicBool::new(false),
                busy_stopping: AtomicBool::new(false),
                in_flight: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> InterceptionState {
        self.inner.machine().state
    }

    pub fn retry_budget(&self) -> u32 {
        self.inner.machine().budget.remaining()
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        let machine = self.inner.machine();
        ControllerSnapshot {
            state: machine.state,
            retry_budget: machine.budget.remaining(),
            busy_starting: self.inner.busy_starting.load(Ordering::SeqCst),
            busy_stopping: self.inner.busy_stopping.load(Ordering::SeqCst),
            last_error: machine.last_error.clone(),
        }
    }

    pub fn manager(&self) -> &Arc<InterceptionWorkerManager> {
        &self.inner.manager
    }

    /// Apply the stored preference: start the worker if interception is
    /// enabled, otherwise settle in `Stopped`. Startup failures are logged,
    /// not returned; the console then keeps working against the backend.
    pub async fn bootstrap(&self) -> InterceptionState {
        let preference = self.inner.preferences.load();
        if preference.enabled {
            tracing::info!("Interception enabled in preferences; starting worker");
            if let Err(err) = self.request_start().await {
                tracing::error!("Interception unavailable, using direct backend: {}", err);
            }
        } else {
            tracing::info!("Interception disabled in preferences; using direct backend");
            if self.state() == InterceptionState::Idle {
                if let Err(err) = self.inner.transition(InterceptionState::Stopped, None) {
                    tracing::warn!("Could not settle bootstrap state: {}", err);
                }
            }
        }
        self.state()
    }

    /// Start interception, or join the start already in flight.
    pub async fn request_start(&self) -> Result<InterceptionState> {
        if self.state() == InterceptionState::Running {
            tracing::debug!("Interception already running");
            return Ok(InterceptionState::Running);
        }

        let (attempt, owner) = self.join_or_begin_start();
        if owner {
            attempt.await
        } else {
            tracing::info!("Start already in flight; waiting for its outcome");
            self.await_with_ceiling(attempt, "start").await
        }
    }

    /// Stop interception. Only valid from `Running`; when a start is still in
    /// flight the stop is applied once that start resolves.
    pub async fn request_stop(&self) -> Result<InterceptionState> {
        if self.inner.busy_stopping.swap(true, Ordering::SeqCst) {
            tracing::info!("Stop already in flight; waiting for it to finish");
            return self.wait_for_stop().await;
        }
        let _busy = BusyFlag(&self.inner.busy_stopping);

        let pending = self.inner.in_flight_start();
        let deferred = pending.is_some();
        if let Some(pending) = pending {
            tracing::info!("Stop requested during start; stopping once the start resolves");
            // Registration cannot be aborted, only waited out.
            let _ = pending.await;
        }

        let current = self.state();
        if current != InterceptionState::Running {
            if deferred {
                return Ok(current);
            }
            return Err(InterceptionError::InvalidTransition {
                from: current,
                action: "stop",
            });
        }

        match self.inner.manager.dispose().await {
            Ok(()) => {
                let current = self.state();
                if current != InterceptionState::Running {
                    // A force reset took over while the worker was torn down.
                    tracing::info!("Stop superseded by {}; leaving it in charge", current);
                    return Ok(current);
                }
                self.inner.transition(InterceptionState::Stopped, None)?;
                self.inner.persist_enabled(false);
                tracing::info!("Interception stopped");
                Ok(InterceptionState::Stopped)
            }
            Err(err) => {
                tracing::warn!("Stop failed, interception stays running: {}", err);
                self.inner.machine().last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Clear every worker registration on the origin, refill the retry
    /// budget and start from scratch. Valid from any state.
    pub async fn request_force_reset(&self) -> Result<InterceptionState> {
        tracing::warn!("Force reset requested (state={})", self.state());
        if let Some(pending) = self.inner.in_flight_start() {
            tracing::info!("Waiting for the in-flight start before resetting");
            let _ = pending.await;
        }
        if self.inner.busy_stopping.load(Ordering::SeqCst) {
            tracing::info!("Waiting for the in-flight stop before resetting");
            self.wait_for_stop().await?;
        }

        self.inner.transition(InterceptionState::Restarting, None)?;
        let cleared = self.inner.manager.hard_reset().await;
        self.inner.machine().budget.reset();
        tracing::info!(
            "Force reset cleared {} registration(s); starting fresh",
            cleared
        );
        self.request_start().await
    }

    fn join_or_begin_start(&self) -> (SharedStart, bool) {
        let mut slot = self.inner.in_flight_slot();
        if let Some(existing) = slot.as_ref() {
            return (existing.clone(), false);
        }

        self.inner.busy_starting.store(true, Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let _slot = StartSlot(Arc::clone(&inner));
            inner.run_start().await
        });
        let attempt = async move {
            task.await.unwrap_or_else(|err| {
                Err(InterceptionError::WorkerRegistration(format!(
                    "start task ended abnormally: {err}"
                )))
            })
        }
        .boxed()
        .shared();

        *slot = Some(attempt.clone());
        (attempt, true)
    }

    async fn await_with_ceiling<F>(&self, fut: F, operation: &'static str) -> StartOutcome
    where
        F: Future<Output = StartOutcome>,
    {
        let ceiling = self.inner.policy.wait_ceiling();
        match tokio::time::timeout(ceiling, fut).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    "Gave up waiting {}ms for in-flight {}; it keeps running",
                    ceiling.as_millis(),
                    operation
                );
                Err(InterceptionError::WaitTimeout {
                    operation,
                    waited_ms: ceiling.as_millis() as u64,
                })
            }
        }
    }

    async fn wait_for_stop(&self) -> Result<InterceptionState> {
        let policy = self.inner.policy;
        for _ in 0..policy.wait_poll_limit {
            tokio::time::sleep(policy.wait_poll_interval).await;
            if !self.inner.busy_stopping.load(Ordering::SeqCst) {
                return Ok(self.state());
            }
        }
        Err(InterceptionError::WaitTimeout {
            operation: "stop",
            waited_ms: policy.wait_ceiling().as_millis() as u64,
        })
    }
}

impl ControllerInner {
    fn machine(&self) -> MutexGuard<'_, Machine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn in_flight_slot(&self) -> MutexGuard<'_, Option<SharedStart>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn in_flight_start(&self) -> Option<SharedStart> {
        self.in_flight_slot().clone()
    }

    async fn run_start(&self) -> StartOutcome {
        {
            let mut machine = self.machine();
            if machine.state == InterceptionState::Running {
                return Ok(InterceptionState::Running);
            }
            machine.budget.reset();
        }

        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.transition(InterceptionState::Starting, None)?;

            if attempt == max_attempts && max_attempts > 1 {
                tracing::warn!(
                    "Final start attempt {}/{}: clearing every worker registration first",
                    attempt,
                    max_attempts
                );
                self.manager.hard_reset().await;
            }

            match self.manager.spawn(&self.handlers).await {
                Ok(()) => {
                    self.transition(InterceptionState::Running, None)?;
                    self.persist_enabled(true);
                    tracing::info!("Interception running after {} attempt(s)", attempt);
                    return Ok(InterceptionState::Running);
                }
                Err(err) => {
                    let (remaining, exhausted) = {
                        let mut machine = self.machine();
                        let remaining = machine.budget.consume();
                        (remaining, machine.budget.is_exhausted())
                    };
                    tracing::warn!(
                        "Start attempt {}/{} failed: {} ({} left)",
                        attempt,
                        max_attempts,
                        err,
                        remaining
                    );

                    if exhausted || attempt >= max_attempts {
                        let exhausted = InterceptionError::RetryExhausted {
                            attempts: attempt,
                            last: err.to_string(),
                        };
                        tracing::error!("{}", exhausted);
                        self.transition(InterceptionState::Error, Some(exhausted.to_string()))?;
                        return Err(exhausted);
                    }

                    self.transition(InterceptionState::Restarting, Some(err.to_string()))?;
                    tokio::time::sleep(self.policy.retry_delay).await;
                }
            }
        }
    }

    /// Move to `next` and announce it. Emission happens after the lock is
    /// released so subscribers may read the controller.
    fn transition(&self, next: InterceptionState, error: Option<String>) -> Result<()> {
        let change = {
            let mut machine = self.machine();
            let previous = machine.state;
            if previous == next {
                return Ok(());
            }
            if !previous.can_transition_to(next) {
                tracing::error!("Rejected lifecycle transition {} -> {}", previous, next);
                return Err(InterceptionError::IllegalTransition {
                    from: previous,
                    to: next,
                });
            }

            machine.state = next;
            if let Some(message) = &error {
                machine.last_error = Some(message.clone());
            } else if next == InterceptionState::Running {
                machine.last_error = None;
            }

            StateChange {
                previous,
                state: next,
                retry_budget: machine.budget.remaining(),
                error,
                at: Utc::now(),
            }
        };

        tracing::debug!("Interception state {} -> {}", change.previous, change.state);
        let event = ConsoleEvent::StateChanged(change);
        self.bus.emit(event.topic(), &event);
        Ok(())
    }

    fn persist_enabled(&self, enabled: bool) {
        if let Err(err) = self.preferences.set_enabled(enabled) {
            tracing::warn!("Failed to persist mock-enabled={}: {}", enabled, err);
        }
    }
}
