// Durable key/value storage for session credentials

use anyhow::{Context, Result};
use dashmap::DashMap;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

/// Key/value persistence that survives process restart
pub trait DurableStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> Result<()>;
    /// Removing a missing key is not an error
    fn remove_item(&self, key: &str) -> Result<()>;
}

/// SQLite-backed storage using a single `auth_kv` table
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (or create) the session database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create session directory: {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database: {}", path.display()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS auth_kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create auth_kv table")?;

        tracing::debug!("Session storage opened: {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl DurableStorage for SqliteStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        conn.query_row("SELECT value FROM auth_kv WHERE key = ?", [key], |row| {
            row.get(0)
        })
        .optional()
        .with_context(|| format!("Failed to read {} from SQLite", key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let updated_at = chrono::Utc::now().to_rfc3339();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO auth_kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            [key, value, updated_at.as_str()],
        )
        .with_context(|| format!("Failed to write {} to SQLite", key))?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM auth_kv WHERE key = ?", [key])
            .with_context(|| format!("Failed to remove {} from SQLite", key))?;
        Ok(())
    }
}

/// Process-local storage, used for tests and embedding without persistence
#[derive(Default)]
pub struct MemoryStorage {
    items: DashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-populated with one entry
    pub fn with_item(key: &str, value: &str) -> Self {
        let storage = Self::new();
        storage.items.insert(key.to_string(), value.to_string());
        storage
    }
}

impl DurableStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.get(key).map(|entry| entry.value().clone()))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.items.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteStorage::open(&dir.path().join("session.sqlite3")).unwrap();

        assert_eq!(storage.get_item("userToken").unwrap(), None);

        storage.set_item("userToken", "first").unwrap();
        storage.set_item("userToken", "second").unwrap();
        assert_eq!(
            storage.get_item("userToken").unwrap().as_deref(),
            Some("second")
        );

        storage.remove_item("userToken").unwrap();
        assert_eq!(storage.get_item("userToken").unwrap(), None);

        // Removing twice is fine
        storage.remove_item("userToken").unwrap();
    }

    #[test]
    fn test_sqlite_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.sqlite3");

        {
            let storage = SqliteStorage::open(&path).unwrap();
            storage.set_item("userToken", "persisted").unwrap();
        }

        let storage = SqliteStorage::open(&path).unwrap();
        assert_eq!(
            storage.get_item("userToken").unwrap().as_deref(),
            Some("persisted")
        );
    }

    #[test]
    fn test_memory_storage() {
        let storage = MemoryStorage::with_item("userToken", "abc");
        assert_eq!(storage.get_item("userToken").unwrap().as_deref(), Some("abc"));
        assert_eq!(storage.get_item("other").unwrap(), None);

        storage.remove_item("userToken").unwrap();
        storage.remove_item("userToken").unwrap();
        assert_eq!(storage.get_item("userToken").unwrap(), None);
    }
}
