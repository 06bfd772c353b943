//! Preference persistence
//!
//! A flat key/value record (`mock-enabled`, `backend-config`) behind a
//! synchronous backend, so a reload always sees the last confirmed state.

mod kv_store;
mod preference_store;

pub use kv_store::{KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore};
pub use preference_store::{PreferenceStore, KEY_BACKEND_CONFIG, KEY_MOCK_ENABLED};
