//! Database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version')",
        [],
        |row| row.get::<_, i64>(0).map(|v| v != 0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

/// Migration to version 1: Initial schema
fn migrate_v1(conn: &Connection) -> Result<()> {
    let batch = "BEGIN;
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS clients (
            id TEXT PRIMARY KEY,
            external_id TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            phone TEXT NOT NULL,
            notes TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            last_synced_at INTEGER,
            external_data TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_clients_active ON clients(active);
        CREATE INDEX IF NOT EXISTS idx_clients_created ON clients(created_at DESC);
        CREATE TABLE IF NOT EXISTS appointments (
            id TEXT PRIMARY KEY,
            external_id TEXT NOT NULL UNIQUE,
            client_id TEXT NOT NULL REFERENCES clients(id) ON DELETE CASCADE,
            start_time INTEGER NOT NULL,
            end_time INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'scheduled',
            appointment_type TEXT NOT NULL,
            notes TEXT,
            last_synced_at INTEGER,
            external_data TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            CHECK (end_time > start_time)
        );
        CREATE INDEX IF NOT EXISTS idx_appointments_client ON appointments(client_id);
        CREATE INDEX IF NOT EXISTS idx_appointments_start ON appointments(start_time);
        CREATE INDEX IF NOT EXISTS idx_appointments_status ON appointments(status);
        INSERT INTO schema_version (version, applied_at)
            VALUES (1, CAST(strftime('%s','now') AS INTEGER) * 1000);
        COMMIT;";

    if let Err(e) = conn.execute_batch(batch) {
        conn.execute_batch("ROLLBACK").ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version 1");
    Ok(())
}
