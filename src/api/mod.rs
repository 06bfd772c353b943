//! ProxyDeck core API
//!
//! Entry points the application shell calls: logging setup, version, and
//! the [`ConsoleRuntime`] that owns every interception component.

pub mod console_api;

pub use console_api::{get_version, init_core, resolve_log_level, ConsoleRuntime, ConsoleStatus};
