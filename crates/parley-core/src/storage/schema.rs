//! Database schema definitions.

/// Schema version, stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: u32 = 1;

/// SQL to create the database schema.
pub const CREATE_SCHEMA: &str = r#"
-- The local identity (only one allowed)
CREATE TABLE IF NOT EXISTS identity (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    uuid TEXT NOT NULL,
    nickname TEXT NOT NULL,
    secret_key BLOB NOT NULL,
    created_at INTEGER NOT NULL
);

-- Known peers
CREATE TABLE IF NOT EXISTS contacts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid TEXT NOT NULL UNIQUE,
    nickname TEXT NOT NULL,
    public_key TEXT NOT NULL,
    host TEXT NOT NULL,
    port INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_contacts_uuid ON contacts(uuid);

-- Conversations; is_host distinguishes locally hosted groups from
-- direct conversations owned by the counterpart
CREATE TABLE IF NOT EXISTS conversations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    is_host INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_conversations_uuid ON conversations(uuid);

CREATE TABLE IF NOT EXISTS conversation_participants (
    conversation_id INTEGER NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
    contact_id INTEGER NOT NULL REFERENCES contacts(id) ON DELETE CASCADE,
    UNIQUE(conversation_id, contact_id)
);

-- Message history, keyed by the wire-format fields
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_uuid TEXT NOT NULL,
    sender_uuid TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    is_command INTEGER NOT NULL,
    content TEXT NOT NULL,
    sent INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation
    ON messages(conversation_uuid, timestamp, sender_uuid);
"#;
