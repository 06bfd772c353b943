use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

const DB_FILE_NAME: &str = "proxydeck_prefs.sqlite";

/// Synchronous string key/value backend behind the preference store.
///
/// Writes must be durable by the time `set` returns so a reload always sees
/// the last confirmed state.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;
}

/// SQLite-backed store, one row per key.
pub struct SqliteKeyValueStore {
    db: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteKeyValueStore {
    pub fn new(base_path: &str) -> anyhow::Result<Self> {
        let dir = Path::new(base_path);
        if !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating storage directory {:?}", dir))?;
        }
        let db_path = dir.join(DB_FILE_NAME);
        let conn = Connection::open(&db_path)
            .with_context(|| format!("opening database at {:?}", db_path))?;
        Self::init_schema(&conn)?;
        tracing::debug!("Preference database ready at {}", db_path.display());

        Ok(Self {
            db: Mutex::new(conn),
            db_path,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn init_schema(conn: &Connection) -> anyhow::Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS preferences (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            ",
        )
        .context("creating preferences table")?;
        Ok(())
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT value FROM preferences WHERE key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .with_context(|| format!("reading preference {key}"))
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO preferences (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            params![key, value, chrono::Utc::now().timestamp_millis()],
        )
        .with_context(|| format!("writing preference {key}"))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        let conn = self.conn();
        conn.execute("DELETE FROM preferences WHERE key = ?1", params![key])
            .with_context(|| format!("deleting preference {key}"))?;
        Ok(())
    }
}

/// Process-local store used by tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryKeyValueStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            values: Mutex::new(values),
        }
    }

    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.values().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.values().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sqlite_store_survives_reopen() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().to_str().unwrap();

        {
            let store = SqliteKeyValueStore::new(path).expect("store initializes");
            store.set("mock-enabled", "false").expect("write ok");
            store.set("mock-enabled", "true").expect("overwrite ok");
            store.set("scratch", "1").expect("write ok");
            store.remove("scratch").expect("remove ok");
        }

        let reopened = SqliteKeyValueStore::new(path).expect("store reopens");
        assert_eq!(
            reopened.get("mock-enabled").unwrap().as_deref(),
            Some("true")
        );
        assert_eq!(reopened.get("scratch").unwrap(), None);
        assert!(reopened.db_path().ends_with(DB_FILE_NAME));
    }

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryKeyValueStore::with_entries([("a", "1")]);
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
    }
}
