//! Database connection management

use crate::error::Result;
use rusqlite::Connection;
use std::path::Path;

use super::migrations;

/// Database wrapper for `SQLite` connections
///
/// Owns a single connection; callers that need one from multiple tasks wrap
/// the whole `Database` in an async mutex.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open a database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let database = Self { conn };
        database.configure()?;
        database.migrate()?;
        Ok(database)
    }

    /// Open an in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let database = Self { conn };
        database.configure()?;
        database.migrate()?;
        Ok(database)
    }

    /// Configure `SQLite` for this workload
    fn configure(&self) -> Result<()> {
        // WAL silently degrades to `memory` for in-memory databases
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        migrations::run(&self.conn)
    }

    /// Cheap liveness probe for health reporting
    pub fn ping(&self) -> Result<()> {
        self.conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        db.ping().unwrap();
    }

    #[test]
    fn test_open_creates_file_and_reopens() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("wellness.db");

        {
            let db = Database::open(&path).unwrap();
            db.ping().unwrap();
        }
        assert!(path.exists());

        // Re-opening an already-migrated file must succeed
        let db = Database::open(&path).unwrap();
        db.ping().unwrap();
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let db = Database::open_in_memory().unwrap();
        let enabled: i64 = db
            .connection()
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }
}
