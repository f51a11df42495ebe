//! SQLite-backed store implementation.
//!
//! Implements the same collaborator traits as [`crate::storage::MemoryStore`]
//! against a single SQLite database. Chat aggregates are stored whole as
//! serialized blobs; the engine gives the store no cross-entity atomicity
//! to uphold.

use crate::crypto::{KeyKind, KeyRecord};
use crate::error::{Error, Result};
use crate::identity::{ContactId, Location};
use crate::messaging::{Chat, ChatId, Contact};
use crate::storage::schema::{CREATE_SCHEMA, SCHEMA_VERSION};
use crate::storage::{BlockedContactStore, ChatStore, ContactStore, FileStore, KeyStore};
use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the database file.
    pub path: String,
    /// Whether to use an in-memory database (for testing).
    pub in_memory: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: super::DEFAULT_DB_NAME.to_string(),
            in_memory: false,
        }
    }
}

/// SQLite database handle.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let conn = if config.in_memory {
            Connection::open_in_memory()
        } else {
            if let Some(parent) = Path::new(&config.path).parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::Storage(format!("failed to create directory: {}", e)))?;
            }
            Connection::open_with_flags(
                &config.path,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
        }
        .map_err(|e| Error::Storage(format!("failed to open database: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn()?
            .execute_batch(&CREATE_SCHEMA.replace('?', &SCHEMA_VERSION.to_string()))
            .map_err(|e| Error::Storage(format!("failed to create schema: {}", e)))?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Storage("connection lock poisoned".into()))
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[async_trait]
impl ChatStore for Database {
    async fn chat(&self, id: &ChatId) -> Result<Option<Chat>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT data FROM chats WHERE chat_id = ?")?;
        let result = stmt.query_row(params![id.as_str()], |row| row.get::<_, Vec<u8>>(0));
        match result {
            Ok(data) => Ok(Some(
                bincode::deserialize(&data).map_err(|e| Error::Encoding(e.to_string()))?,
            )),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::Storage(e.to_string())),
        }
    }

    async fn save_chat(&self, chat: &Chat) -> Result<()> {
        let data = bincode::serialize(chat).map_err(|e| Error::Encoding(e.to_string()))?;
        self.conn()?.execute(
            r#"
            INSERT OR REPLACE INTO chats (chat_id, is_group, data, updated_at)
            VALUES (?, ?, ?, ?)
            "#,
            params![chat.id.as_str(), chat.is_group as i32, data, now()],
        )?;
        Ok(())
    }

    async fn remove_chat(&self, id: &ChatId) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM chats WHERE chat_id = ?", params![id.as_str()])?;
        Ok(())
    }

    async fn chats(&self, offset: usize, count: usize) -> Result<Vec<Chat>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT data FROM chats ORDER BY chat_id LIMIT ? OFFSET ?")?;
        let rows = stmt.query_map(params![count as i64, offset as i64], |row| {
            row.get::<_, Vec<u8>>(0)
        })?;

        let mut chats = Vec::new();
        for row in rows {
            let data = row.map_err(|e| Error::Storage(e.to_string()))?;
            chats.push(bincode::deserialize(&data).map_err(|e| Error::Encoding(e.to_string()))?);
        }
        Ok(chats)
    }
}

fn contact_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Contact> {
    let id: String = row.get(0)?;
    let location: String = row.get(1)?;
    let alias: Option<String> = row.get(2)?;
    Ok(Contact {
        id: ContactId::new(id),
        location: Location::new(location),
        alias,
    })
}

#[async_trait]
impl ContactStore for Database {
    async fn contact(&self, id: &ContactId) -> Result<Option<Contact>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT contact_id, location, alias FROM contacts WHERE contact_id = ?")?;
        let result = stmt.query_row(params![id.as_str()], contact_from_row);
        match result {
            Ok(contact) => Ok(Some(contact)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::Storage(e.to_string())),
        }
    }

    async fn save_contact(&self, contact: &Contact) -> Result<()> {
        self.conn()?.execute(
            r#"
            INSERT OR REPLACE INTO contacts (contact_id, location, alias, updated_at)
            VALUES (?, ?, ?, ?)
            "#,
            params![
                contact.id.as_str(),
                contact.location.as_str(),
                contact.alias,
                now(),
            ],
        )?;
        Ok(())
    }

    async fn save_pending_request(&self, contact: &Contact) -> Result<()> {
        self.conn()?.execute(
            r#"
            INSERT OR REPLACE INTO pending_requests (contact_id, location, alias, received_at)
            VALUES (?, ?, ?, ?)
            "#,
            params![
                contact.id.as_str(),
                contact.location.as_str(),
                contact.alias,
                now(),
            ],
        )?;
        Ok(())
    }

    async fn pending_request(&self, id: &ContactId) -> Result<Option<Contact>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT contact_id, location, alias FROM pending_requests WHERE contact_id = ?",
        )?;
        let result = stmt.query_row(params![id.as_str()], contact_from_row);
        match result {
            Ok(contact) => Ok(Some(contact)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::Storage(e.to_string())),
        }
    }

    async fn clear_pending_request(&self, id: &ContactId) -> Result<()> {
        self.conn()?.execute(
            "DELETE FROM pending_requests WHERE contact_id = ?",
            params![id.as_str()],
        )?;
        Ok(())
    }
}

impl Database {
    fn key(&self, owner: &ContactId, kind: KeyKind) -> Result<Option<KeyRecord>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT material FROM keys WHERE owner = ? AND kind = ?")?;
        let result = stmt.query_row(params![owner.as_str(), kind.as_str()], |row| {
            row.get::<_, String>(0)
        });
        match result {
            Ok(material) => Ok(Some(KeyRecord {
                owner: owner.clone(),
                material,
                kind,
            })),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::Storage(e.to_string())),
        }
    }
}

#[async_trait]
impl KeyStore for Database {
    async fn private_key(&self, owner: &ContactId) -> Result<Option<KeyRecord>> {
        self.key(owner, KeyKind::Private)
    }

    async fn public_key(&self, owner: &ContactId) -> Result<Option<KeyRecord>> {
        self.key(owner, KeyKind::Public)
    }

    async fn save_key(&self, record: &KeyRecord) -> Result<()> {
        self.conn()?.execute(
            r#"
            INSERT OR REPLACE INTO keys (owner, kind, material, created_at)
            VALUES (?, ?, ?, ?)
            "#,
            params![
                record.owner.as_str(),
                record.kind.as_str(),
                record.material,
                now(),
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl BlockedContactStore for Database {
    async fn list_blocked(&self, offset: usize, count: usize) -> Result<Vec<ContactId>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT contact_id FROM blocked_contacts ORDER BY contact_id LIMIT ? OFFSET ?",
        )?;
        let rows = stmt.query_map(params![count as i64, offset as i64], |row| {
            row.get::<_, String>(0)
        })?;

        let mut blocked = Vec::new();
        for row in rows {
            blocked.push(ContactId::new(
                row.map_err(|e| Error::Storage(e.to_string()))?,
            ));
        }
        Ok(blocked)
    }

    async fn block(&self, id: &ContactId) -> Result<()> {
        self.conn()?.execute(
            "INSERT OR IGNORE INTO blocked_contacts (contact_id, blocked_at) VALUES (?, ?)",
            params![id.as_str(), now()],
        )?;
        Ok(())
    }

    async fn unblock(&self, id: &ContactId) -> Result<()> {
        self.conn()?.execute(
            "DELETE FROM blocked_contacts WHERE contact_id = ?",
            params![id.as_str()],
        )?;
        Ok(())
    }
}

#[async_trait]
impl FileStore for Database {
    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO files (path, bytes, written_at) VALUES (?, ?, ?)",
            params![path, bytes, now()],
        )?;
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT bytes FROM files WHERE path = ?")?;
        let result = stmt.query_row(params![path], |row| row.get::<_, Vec<u8>>(0));
        match result {
            Ok(bytes) => Ok(bytes),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Err(Error::NotFound(format!("file {}", path)))
            }
            Err(e) => Err(Error::Storage(e.to_string())),
        }
    }
}
