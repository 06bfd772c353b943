//! Data models for ProxyDeck core
//!
//! Plain value types shared by the lifecycle controller, the endpoint
//! switcher and the API client.

pub mod endpoint;
pub mod event;
pub mod http;
pub mod preference;
pub mod state;

pub use endpoint::*;
pub use event::*;
pub use http::*;
pub use preference::*;
pub use state::*;
