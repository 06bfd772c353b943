//! # ProxyDeck Core

//! Request-interception lifecycle for the ProxyDeck administrative console.
//! Starts and stops the mock-serving interception worker, retries failed
//! startups, and keeps the REST client pointed at the right target.
//!
//! ## Features
//!
//! - Single background worker shared by any number of concurrent callers
//! - Bounded startup retries with a hard reset before the last attempt
//! - Atomic switching between intercepted and direct backend addressing
//! - Durable on/off and backend preference (SQLite)
//! - Synchronous event bus for status observers
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              Console shell / domain services            │
//! ├─────────────────────────────────────────────────────────┤
//! │                 ConsoleRuntime (api)                    │
//! │  ┌────────────┐  ┌─────────┐  ┌──────────┐  ┌─────────┐ │
//! │  │ Lifecycle  │──│ Worker  │  │ Endpoint │──│ApiClient│ │
//! │  │ Controller │  │ Manager │  │ Switcher │  │         │ │
//! │  └────────────┘  └─────────┘  └──────────┘  └─────────┘ │
//! │        │   EventBus (interception.state)  ▲             │
//! │        └──────────────────────────────────┘             │
//! │                 PreferenceStore (SQLite)                │
//! └─────────────────────────────────────────────────────────┘
//! ```

// Public modules
pub mod api;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod http;
pub mod lifecycle;
pub mod models;
pub mod storage;
pub mod worker;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
