//! Interception lifecycle state

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the interception worker.
///
/// Every other piece of derived state (endpoint mode, base URL, the
/// persisted `mock-enabled` flag) follows from this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterceptionState {
    /// Nothing has been attempted yet in this session
    #[default]
    Idle,
    /// A spawn attempt is in flight
    Starting,
    /// The worker is registered and intercepting same-origin traffic
    Running,
    /// The worker was disposed on request
    Stopped,
    /// Every start attempt failed
    Error,
    /// Waiting between attempts, or tearing down for a forced reset
    Restarting,
}

impl InterceptionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterceptionState::Idle => "idle",
            InterceptionState::Starting => "starting",
            InterceptionState::Running => "running",
            InterceptionState::Stopped => "stopped",
            InterceptionState::Error => "error",
            InterceptionState::Restarting => "restarting",
        }
    }

    /// Whether `self -> next` is an edge of the lifecycle graph.
    ///
    /// `Idle -> Stopped` is only taken at bootstrap when the stored
    /// preference has interception disabled.
    pub fn can_transition_to(self, next: InterceptionState) -> bool {
        use InterceptionState::*;
        matches!(
            (self, next),
            (_, Restarting)
                | (Idle, Starting)
                | (Idle, Stopped)
                | (Starting, Running)
                | (Starting, Error)
                | (Restarting, Starting)
                | (Running, Stopped)
                | (Stopped, Starting)
                | (Error, Starting)
        )
    }
}

impl fmt::Display for InterceptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
