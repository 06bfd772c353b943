//! Events published on the console event bus.

use crate::models::endpoint::EndpointMode;
use crate::models::state::InterceptionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Topic carrying [`StateChange`] payloads.
pub const TOPIC_STATE: &str = "interception.state";
/// Topic carrying [`EndpointChange`] payloads.
pub const TOPIC_ENDPOINT: &str = "endpoint.changed";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChange {
    pub previous: InterceptionState,
    pub state: InterceptionState,
    pub retry_budget: u32,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointChange {
    pub base_url: String,
    pub mode: EndpointMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsoleEvent {
    StateChanged(StateChange),
    EndpointChanged(EndpointChange),
}

impl ConsoleEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            ConsoleEvent::StateChanged(_) => TOPIC_STATE,
            ConsoleEvent::EndpointChanged(_) => TOPIC_ENDPOINT,
        }
    }

    pub fn as_state_change(&self) -> Option<&StateChange> {
        match self {
            ConsoleEvent::StateChanged(change) => Some(change),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_event_names_its_own_topic() {
        let state = ConsoleEvent::StateChanged(StateChange {
            previous: InterceptionState::Idle,
            state: InterceptionState::Starting,
            retry_budget: 3,
            error: None,
            at: Utc::now(),
        });
        let endpoint = ConsoleEvent::EndpointChanged(EndpointChange {
            base_url: "http://localhost:8080".to_string(),
            mode: EndpointMode::Direct,
        });

        assert_eq!(state.topic(), TOPIC_STATE);
        assert!(state.as_state_change().is_some());
        assert_eq!(endpoint.topic(), TOPIC_ENDPOINT);
        assert!(endpoint.as_state_change().is_none());
    }
}
