//! Client repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde_json::Value;

use super::{from_millis, from_optional_millis, to_millis};
use crate::error::{Error, Result};
use crate::models::{Client, ClientId, FieldViolation};

/// Trait for client storage operations
pub trait ClientRepository {
    /// Insert a new client; external ids must be unique
    fn insert(&self, client: &Client) -> Result<()>;

    /// Overwrite an existing client row
    fn update(&self, client: &Client) -> Result<()>;

    /// Get a client by ID
    fn get(&self, id: &ClientId) -> Result<Option<Client>>;

    /// Look up a client by its external scheduling-system id
    fn find_by_external_id(&self, external_id: &str) -> Result<Option<Client>>;

    /// List active clients, newest first, optionally narrowed by a
    /// case-insensitive name/email/phone substring search
    fn list_active(&self, search: Option<&str>, limit: usize, offset: usize) -> Result<Vec<Client>>;

    /// Count all active clients (ignores any search narrowing)
    fn count_active(&self) -> Result<usize>;

    /// Substring search across name, email, and phone
    ///
    /// Unlike listings, this spans inactive clients too.
    fn search(&self, query: &str, limit: usize) -> Result<Vec<Client>>;

    /// Record a successful outbound push at the given instant
    fn mark_synced(&self, id: &ClientId, at: DateTime<Utc>) -> Result<()>;

    /// Delete a client; their appointments go with them
    fn delete(&self, id: &ClientId) -> Result<()>;
}

/// `SQLite` implementation of `ClientRepository`
pub struct SqliteClientRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteClientRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a client from a database row
    fn parse_client(row: &rusqlite::Row<'_>) -> rusqlite::Result<Client> {
        let id: String = row.get(0)?;
        let external_data: Value = row.get(8)?;
        Ok(Client {
            id: id.parse().unwrap_or_default(),
            external_id: row.get(1)?,
            name: row.get(2)?,
            email: row.get(3)?,
            phone: row.get(4)?,
            notes: row.get(5)?,
            active: row.get(6)?,
            last_synced_at: from_optional_millis(row.get(7)?),
            external_data: match external_data {
                Value::Object(map) => map,
                _ => serde_json::Map::new(),
            },
            created_at: from_millis(row.get(9)?),
            updated_at: from_millis(row.get(10)?),
        })
    }
}

impl ClientRepository for SqliteClientRepository<'_> {
    fn insert(&self, client: &Client) -> Result<()> {
        if self.find_by_external_id(&client.external_id)?.is_some() {
            return Err(Error::Validation(vec![FieldViolation::new(
                "external_id",
                "has already been taken",
            )]));
        }

        self.conn.execute(
            "INSERT INTO clients (id, external_id, name, email, phone, notes, active,
                                  last_synced_at, external_data, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                client.id.as_str(),
                client.external_id,
                client.name,
                client.email,
                client.phone,
                client.notes,
                client.active,
                client.last_synced_at.map(to_millis),
                Value::Object(client.external_data.clone()),
                to_millis(client.created_at),
                to_millis(client.updated_at),
            ],
        )?;

        Ok(())
    }

    fn update(&self, client: &Client) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE clients
             SET external_id = ?, name = ?, email = ?, phone = ?, notes = ?, active = ?,
                 last_synced_at = ?, external_data = ?, updated_at = ?
             WHERE id = ?",
            params![
                client.external_id,
                client.name,
                client.email,
                client.phone,
                client.notes,
                client.active,
                client.last_synced_at.map(to_millis),
                Value::Object(client.external_data.clone()),
                to_millis(client.updated_at),
                client.id.as_str(),
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(format!("client {}", client.id)));
        }

        Ok(())
    }

    fn get(&self, id: &ClientId) -> Result<Option<Client>> {
        let result = self.conn.query_row(
            "SELECT id, external_id, name, email, phone, notes, active,
                    last_synced_at, external_data, created_at, updated_at
             FROM clients WHERE id = ?",
            params![id.as_str()],
            Self::parse_client,
        );

        match result {
            Ok(client) => Ok(Some(client)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn find_by_external_id(&self, external_id: &str) -> Result<Option<Client>> {
        let result = self.conn.query_row(
            "SELECT id, external_id, name, email, phone, notes, active,
                    last_synced_at, external_data, created_at, updated_at
             FROM clients WHERE external_id = ?",
            params![external_id],
            Self::parse_client,
        );

        match result {
            Ok(client) => Ok(Some(client)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_active(&self, search: Option<&str>, limit: usize, offset: usize) -> Result<Vec<Client>> {
        if let Some(query) = search.map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = like_pattern(query);
            let mut stmt = self.conn.prepare(
                "SELECT id, external_id, name, email, phone, notes, active,
                        last_synced_at, external_data, created_at, updated_at
                 FROM clients
                 WHERE active = 1
                   AND (name LIKE ?1 ESCAPE '\\'
                        OR email LIKE ?1 ESCAPE '\\'
                        OR phone LIKE ?1 ESCAPE '\\')
                 ORDER BY created_at DESC
                 LIMIT ?2 OFFSET ?3",
            )?;

            let clients = stmt
                .query_map(
                    params![pattern, limit as i64, offset as i64],
                    Self::parse_client,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            return Ok(clients);
        }

        let mut stmt = self.conn.prepare(
            "SELECT id, external_id, name, email, phone, notes, active,
                    last_synced_at, external_data, created_at, updated_at
             FROM clients
             WHERE active = 1
             ORDER BY created_at DESC
             LIMIT ? OFFSET ?",
        )?;

        let clients = stmt
            .query_map(params![limit as i64, offset as i64], Self::parse_client)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(clients)
    }

    fn count_active(&self) -> Result<usize> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM clients WHERE active = 1",
            [],
            |row| row.get::<_, usize>(0),
        )?;

        Ok(count)
    }

    fn search(&self, query: &str, limit: usize) -> Result<Vec<Client>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let pattern = like_pattern(query);
        let mut stmt = self.conn.prepare(
            "SELECT id, external_id, name, email, phone, notes, active,
                    last_synced_at, external_data, created_at, updated_at
             FROM clients
             WHERE name LIKE ?1 ESCAPE '\\'
                OR email LIKE ?1 ESCAPE '\\'
                OR phone LIKE ?1 ESCAPE '\\'
             ORDER BY created_at DESC
             LIMIT ?2",
        )?;

        let clients = stmt
            .query_map(params![pattern, limit as i64], Self::parse_client)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(clients)
    }

    fn mark_synced(&self, id: &ClientId, at: DateTime<Utc>) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE clients SET last_synced_at = ?1, updated_at = ?1 WHERE id = ?2",
            params![to_millis(at), id.as_str()],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(format!("client {id}")));
        }

        Ok(())
    }

    fn delete(&self, id: &ClientId) -> Result<()> {
        let rows = self
            .conn
            .execute("DELETE FROM clients WHERE id = ?", params![id.as_str()])?;

        if rows == 0 {
            return Err(Error::NotFound(format!("client {id}")));
        }

        Ok(())
    }
}

/// Escape LIKE wildcards so user input matches literally
fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}
