//! Error taxonomy for the interception subsystem.

use crate::models::InterceptionState;
use thiserror::Error;

/// Errors surfaced by the lifecycle controller and its collaborators.
///
/// Variants carry rendered messages rather than source errors so the type
/// stays `Clone`: a single start outcome is shared by every concurrent
/// caller awaiting it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InterceptionError {
    /// The platform refused or failed the worker registration.
    #[error("worker registration failed: {0}")]
    WorkerRegistration(String),

    /// Every bounded start attempt failed.
    #[error("interception worker failed to start after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: String },

    /// Disposing the worker failed; interception is still running.
    #[error("failed to stop interception worker: {0}")]
    StopFailed(String),

    /// A stored preference or environment value could not be decoded.
    #[error("invalid value for `{key}`: {reason}")]
    ConfigParse { key: String, reason: String },

    /// The requested operation is not valid from the current state.
    #[error("cannot {action} while interception is {from}")]
    InvalidTransition {
        from: InterceptionState,
        action: &'static str,
    },

    /// The lifecycle graph has no edge between the two states.
    #[error("illegal lifecycle transition {from} -> {to}")]
    IllegalTransition {
        from: InterceptionState,
        to: InterceptionState,
    },

    /// A caller gave up waiting on another caller's operation.
    #[error("gave up after {waited_ms}ms waiting for an in-flight {operation}")]
    WaitTimeout {
        operation: &'static str,
        waited_ms: u64,
    },

    /// The preference backend failed to read or write.
    #[error("preference storage error: {0}")]
    Storage(String),
}

/// Result type for interception operations.
pub type Result<T> = std::result::Result<T, InterceptionError>;

impl From<anyhow::Error> for InterceptionError {
    fn from(err: anyhow::Error) -> Self {
        InterceptionError::Storage(format!("{err:#}"))
    }
}
