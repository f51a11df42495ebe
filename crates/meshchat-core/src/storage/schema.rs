//! Database schema definitions.

/// Schema version for migrations.
pub const SCHEMA_VERSION: u32 = 1;

/// SQL to create the database schema.
pub const CREATE_SCHEMA: &str = r#"
-- Chat aggregates, stored whole: the aggregate is the unit of consistency.
CREATE TABLE IF NOT EXISTS chats (
    chat_id TEXT PRIMARY KEY,
    is_group INTEGER NOT NULL DEFAULT 0,
    data BLOB NOT NULL,
    updated_at INTEGER NOT NULL
);

-- Known contacts.
CREATE TABLE IF NOT EXISTS contacts (
    contact_id TEXT PRIMARY KEY,
    location TEXT NOT NULL,
    alias TEXT,
    updated_at INTEGER NOT NULL
);

-- Contact requests awaiting acceptance.
CREATE TABLE IF NOT EXISTS pending_requests (
    contact_id TEXT PRIMARY KEY,
    location TEXT NOT NULL,
    alias TEXT,
    received_at INTEGER NOT NULL
);

-- Signing keys: one private row for the local identity, cached public
-- rows for contacts.
CREATE TABLE IF NOT EXISTS keys (
    owner TEXT NOT NULL,
    kind TEXT NOT NULL,
    material TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (owner, kind)
);

-- Blocked contact set, scanned by the admission gate.
CREATE TABLE IF NOT EXISTS blocked_contacts (
    contact_id TEXT PRIMARY KEY,
    blocked_at INTEGER NOT NULL
);

-- Opaque file payload blobs.
CREATE TABLE IF NOT EXISTS files (
    path TEXT PRIMARY KEY,
    bytes BLOB NOT NULL,
    written_at INTEGER NOT NULL
);

-- Settings table
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL
);

-- Schema version
INSERT OR REPLACE INTO settings (key, value) VALUES ('schema_version', ?);
"#;
