//! SQLite key-value storage.
//!
//! Holds the durable scalars that must survive a client reload, most
//! importantly the last subsession auto-join acted on.

use std::path::Path;

use rusqlite::{params, Connection};

use super::data_dir;
use crate::error::DatabaseError;

const LAST_JOINED_KEY: &str = "last_joined_subsession_id";

/// SQLite database for durable engine state.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at `~/.config/irefined/irefined.db`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, DatabaseError> {
        let path = data_dir()?.join("irefined.db");
        Self::open_at(&path)
    }

    /// Open the database at an explicit path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let mut stmt = self.conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let result = stmt.query_row(params![key], |row| row.get::<_, String>(0));
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Delete a value from the kv store. Returns whether it existed.
    pub fn kv_delete(&self, key: &str) -> Result<bool, DatabaseError> {
        let changed = self.conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(changed > 0)
    }

    // ── Auto-join state ──────────────────────────────────────────────

    /// Last subsession auto-join recorded. Unparseable values read as unset.
    pub fn last_joined_subsession(&self) -> Result<Option<i64>, DatabaseError> {
        Ok(self
            .kv_get(LAST_JOINED_KEY)?
            .and_then(|v| v.parse::<i64>().ok()))
    }

    pub fn set_last_joined_subsession(&self, subsession_id: i64) -> Result<(), DatabaseError> {
        self.kv_set(LAST_JOINED_KEY, &subsession_id.to_string())
    }

    pub fn clear_last_joined_subsession(&self) -> Result<bool, DatabaseError> {
        self.kv_delete(LAST_JOINED_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kv_store() {
        let db = Database::open_memory().unwrap();
        assert!(db.kv_get("test").unwrap().is_none());
        db.kv_set("test", "hello").unwrap();
        assert_eq!(db.kv_get("test").unwrap().unwrap(), "hello");
        assert!(db.kv_delete("test").unwrap());
        assert!(!db.kv_delete("test").unwrap());
    }

    #[test]
    fn last_joined_roundtrip() {
        let db = Database::open_memory().unwrap();
        assert_eq!(db.last_joined_subsession().unwrap(), None);
        db.set_last_joined_subsession(100).unwrap();
        assert_eq!(db.last_joined_subsession().unwrap(), Some(100));
        db.set_last_joined_subsession(101).unwrap();
        assert_eq!(db.last_joined_subsession().unwrap(), Some(101));
        assert!(db.clear_last_joined_subsession().unwrap());
        assert_eq!(db.last_joined_subsession().unwrap(), None);
    }

    #[test]
    fn garbage_last_joined_reads_as_unset() {
        let db = Database::open_memory().unwrap();
        db.kv_set(LAST_JOINED_KEY, "NaN").unwrap();
        assert_eq!(db.last_joined_subsession().unwrap(), None);
    }

    #[test]
    fn survives_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("irefined.db");
        {
            let db = Database::open_at(&path).unwrap();
            db.set_last_joined_subsession(77).unwrap();
        }
        let db = Database::open_at(&path).unwrap();
        assert_eq!(db.last_joined_subsession().unwrap(), Some(77));
    }
}
