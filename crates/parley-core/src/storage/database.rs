//! Database operations.

use super::schema::{CREATE_SCHEMA, SCHEMA_VERSION};
use crate::conversation::{Conversation, ConversationInfo};
use crate::error::{Error, Result};
use crate::identity::LocalIdentity;
use crate::peer::{Peer, PeerDirectory};
use crate::protocol::PlainMessage;
use rusqlite::{params, Connection, OpenFlags};
use std::path::Path;

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the database file.
    pub path: String,
    /// Whether to use an in-memory database (for testing).
    pub in_memory: bool,
}

impl DatabaseConfig {
    /// A file-backed database at `path`.
    pub fn at(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            in_memory: false,
        }
    }

    /// An in-memory database.
    pub fn in_memory() -> Self {
        Self {
            path: String::new(),
            in_memory: true,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::at(super::DEFAULT_DB_NAME)
    }
}

/// Handle to the peer's sqlite database.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create the database and ensure the schema exists.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let conn = if config.in_memory {
            Connection::open_in_memory()
        } else {
            if let Some(parent) = Path::new(&config.path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        Error::Storage(format!("failed to create directory: {}", e))
                    })?;
                }
            }
            Connection::open_with_flags(
                &config.path,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
        }
        .map_err(|e| Error::Storage(format!("failed to open database: {}", e)))?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| Error::Storage(format!("failed to set pragmas: {}", e)))?;

        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_SCHEMA)
            .map_err(|e| Error::Storage(format!("failed to create schema: {}", e)))?;
        self.conn
            .execute_batch(&format!("PRAGMA user_version = {};", SCHEMA_VERSION))
            .map_err(|e| Error::Storage(format!("failed to set schema version: {}", e)))?;
        Ok(())
    }

    /// Store the local identity (only one allowed).
    pub fn store_identity(&self, identity: &LocalIdentity) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        self.conn
            .execute(
                "INSERT OR REPLACE INTO identity (id, uuid, nickname, secret_key, created_at)
                 VALUES (1, ?, ?, ?, ?)",
                params![
                    identity.id(),
                    identity.nickname(),
                    identity.keypair().secret_bytes().as_slice(),
                    now
                ],
            )
            .map_err(|e| Error::Storage(format!("failed to store identity: {}", e)))?;
        Ok(())
    }

    /// Load the local identity, if one was ever stored.
    pub fn load_identity(&self) -> Result<Option<LocalIdentity>> {
        let mut stmt = self
            .conn
            .prepare("SELECT uuid, nickname, secret_key FROM identity WHERE id = 1")?;

        let row = stmt.query_row([], |row| {
            let uuid: String = row.get(0)?;
            let nickname: String = row.get(1)?;
            let secret: Vec<u8> = row.get(2)?;
            Ok((uuid, nickname, secret))
        });

        match row {
            Ok((uuid, nickname, secret)) => {
                let secret: [u8; 32] = secret
                    .try_into()
                    .map_err(|_| Error::Storage("stored secret key has wrong length".into()))?;
                Ok(Some(LocalIdentity::from_parts(uuid, nickname, secret)))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Add a contact. Fails on a duplicate peer id.
    pub fn add_contact(&self, peer: &Peer) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        self.conn
            .execute(
                "INSERT INTO contacts (uuid, nickname, public_key, host, port, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![peer.id, peer.nickname, peer.public_key, peer.host, peer.port, now, now],
            )
            .map_err(|e| Error::Storage(format!("failed to add contact: {}", e)))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Get a contact by peer id.
    pub fn get_contact(&self, uuid: &str) -> Result<Option<Peer>> {
        let mut stmt = self.conn.prepare(
            "SELECT uuid, nickname, public_key, host, port FROM contacts WHERE uuid = ?",
        )?;
        let row = stmt.query_row([uuid], row_to_peer);
        match row {
            Ok(peer) => Ok(Some(peer)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All contacts, ordered by nickname.
    pub fn list_contacts(&self) -> Result<Vec<Peer>> {
        let mut stmt = self.conn.prepare(
            "SELECT uuid, nickname, public_key, host, port FROM contacts ORDER BY nickname",
        )?;
        let rows = stmt.query_map([], row_to_peer)?;
        let mut contacts = Vec::new();
        for row in rows {
            contacts.push(row?);
        }
        Ok(contacts)
    }

    /// Store a conversation and its participant links.
    ///
    /// Every participant must already be a stored contact.
    pub fn add_conversation(&self, conversation: &Conversation) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        self.conn
            .execute(
                "INSERT INTO conversations (uuid, name, is_host, created_at) VALUES (?, ?, ?, ?)",
                params![
                    conversation.id(),
                    conversation.name(),
                    conversation.is_host(),
                    now
                ],
            )
            .map_err(|e| Error::Storage(format!("failed to add conversation: {}", e)))?;
        let conversation_row = self.conn.last_insert_rowid();

        for peer in conversation.participants() {
            let contact_row: i64 = self
                .conn
                .query_row(
                    "SELECT id FROM contacts WHERE uuid = ?",
                    [&peer.id],
                    |row| row.get(0),
                )
                .map_err(|_| Error::NotFound(format!("no contact with id {}", peer.id)))?;
            self.conn
                .execute(
                    "INSERT INTO conversation_participants (conversation_id, contact_id)
                     VALUES (?, ?)",
                    params![conversation_row, contact_row],
                )
                .map_err(|e| Error::Storage(format!("failed to link participant: {}", e)))?;
        }
        Ok(conversation_row)
    }

    /// Load a conversation with its participants.
    pub fn get_conversation(&self, uuid: &str) -> Result<Option<Conversation>> {
        let row = self.conn.query_row(
            "SELECT id, uuid, name, is_host FROM conversations WHERE uuid = ?",
            [uuid],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, bool>(3)?,
                ))
            },
        );
        let (conversation_row, uuid, name, is_host) = match row {
            Ok(parts) => parts,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut stmt = self.conn.prepare(
            "SELECT c.uuid, c.nickname, c.public_key, c.host, c.port
             FROM contacts c
             JOIN conversation_participants cp ON cp.contact_id = c.id
             WHERE cp.conversation_id = ?",
        )?;
        let rows = stmt.query_map([conversation_row], row_to_peer)?;
        let mut participants = Vec::new();
        for row in rows {
            participants.push(row?);
        }

        let info = ConversationInfo { id: uuid, name };
        let conversation = if is_host {
            Conversation::group_with_info(info, participants)
                .ok_or_else(|| Error::Storage("conversation has no participants".into()))?
        } else {
            let host = participants
                .into_iter()
                .next()
                .ok_or_else(|| Error::Storage("conversation has no participants".into()))?;
            Conversation::direct_with_info(info, host)
        };
        Ok(Some(conversation))
    }

    /// All conversations, ordered by name.
    pub fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let mut stmt = self
            .conn
            .prepare("SELECT uuid FROM conversations ORDER BY name")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut conversations = Vec::new();
        for row in rows {
            let uuid = row?;
            if let Some(conversation) = self.get_conversation(&uuid)? {
                conversations.push(conversation);
            }
        }
        Ok(conversations)
    }

    /// Append a message to the history.
    pub fn add_message(&self, msg: &PlainMessage) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        self.conn
            .execute(
                "INSERT INTO messages
                 (conversation_uuid, sender_uuid, timestamp, is_command, content, sent, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    msg.conversation_id,
                    msg.sender_id,
                    msg.timestamp,
                    msg.is_command,
                    msg.content,
                    msg.sent,
                    now
                ],
            )
            .map_err(|e| Error::Storage(format!("failed to add message: {}", e)))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Get one message by its row id.
    pub fn get_message(&self, id: i64) -> Result<Option<PlainMessage>> {
        let mut stmt = self.conn.prepare(
            "SELECT conversation_uuid, sender_uuid, timestamp, is_command, content, sent
             FROM messages WHERE id = ?",
        )?;
        let row = stmt.query_row([id], row_to_message);
        match row {
            Ok(msg) => Ok(Some(msg)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Message history for a conversation in `(timestamp, sender)` order,
    /// the order message merges rely on.
    pub fn messages_for_conversation(
        &self,
        conversation_uuid: &str,
        limit: u32,
    ) -> Result<Vec<PlainMessage>> {
        let mut stmt = self.conn.prepare(
            "SELECT conversation_uuid, sender_uuid, timestamp, is_command, content, sent
             FROM messages WHERE conversation_uuid = ?
             ORDER BY timestamp, sender_uuid
             LIMIT ?",
        )?;
        let rows = stmt.query_map(params![conversation_uuid, limit], row_to_message)?;
        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }
}

impl PeerDirectory for Database {
    fn lookup(&self, peer_id: &str) -> Result<Peer> {
        self.get_contact(peer_id)?
            .ok_or_else(|| Error::NotFound(format!("no contact with id {}", peer_id)))
    }
}

fn row_to_peer(row: &rusqlite::Row<'_>) -> rusqlite::Result<Peer> {
    Ok(Peer {
        id: row.get(0)?,
        nickname: row.get(1)?,
        public_key: row.get(2)?,
        host: row.get(3)?,
        port: row.get(4)?,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<PlainMessage> {
    let mut msg = PlainMessage::from_parts(
        row.get::<_, String>(4)?,
        row.get::<_, String>(0)?,
        row.get::<_, String>(1)?,
        row.get::<_, bool>(3)?,
        row.get::<_, i64>(2)?,
    );
    if row.get::<_, bool>(5)? {
        msg.mark_sent();
    }
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open(&DatabaseConfig::in_memory()).expect("open in-memory db")
    }

    fn peer(id: &str, nick: &str) -> Peer {
        Peer::new(id, nick, "a2V5a2V5", "127.0.0.1", 1337, 64)
    }

    #[test]
    fn test_identity_roundtrip() {
        let db = db();
        assert!(db.load_identity().expect("load").is_none());

        let identity = LocalIdentity::generate("me", 64);
        db.store_identity(&identity).expect("store");

        let loaded = db.load_identity().expect("load").expect("present");
        assert_eq!(loaded.id(), identity.id());
        assert_eq!(loaded.public_key_text(), identity.public_key_text());
    }

    #[test]
    fn test_contact_roundtrip() {
        let db = db();
        let alice = peer("aaaa", "alice");
        db.add_contact(&alice).expect("add");

        assert_eq!(db.get_contact("aaaa").expect("get"), Some(alice.clone()));
        assert_eq!(db.get_contact("missing").expect("get"), None);
        assert_eq!(db.list_contacts().expect("list"), vec![alice]);
    }

    #[test]
    fn test_duplicate_contact_rejected() {
        let db = db();
        db.add_contact(&peer("aaaa", "alice")).expect("add");
        assert!(db.add_contact(&peer("aaaa", "alias")).is_err());
    }

    #[test]
    fn test_directory_lookup() {
        let db = db();
        db.add_contact(&peer("aaaa", "alice")).expect("add");

        assert!(db.lookup("aaaa").is_ok());
        assert!(matches!(db.lookup("missing"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_group_conversation_roundtrip() {
        let db = db();
        db.add_contact(&peer("aaaa", "alice")).expect("add");
        db.add_contact(&peer("bbbb", "bob")).expect("add");

        let group = Conversation::group(
            "team",
            vec![peer("aaaa", "alice"), peer("bbbb", "bob")],
        )
        .expect("non-empty");
        db.add_conversation(&group).expect("add conversation");

        let loaded = db
            .get_conversation(group.id())
            .expect("get")
            .expect("present");
        assert!(loaded.is_host());
        assert_eq!(loaded.name(), "team");
        let mut ids = loaded.participant_ids();
        ids.sort();
        assert_eq!(ids, vec!["aaaa", "bbbb"]);
    }

    #[test]
    fn test_direct_conversation_roundtrip() {
        let db = db();
        db.add_contact(&peer("aaaa", "alice")).expect("add");

        let direct = Conversation::direct(peer("aaaa", "alice"));
        db.add_conversation(&direct).expect("add conversation");

        let loaded = db
            .get_conversation(direct.id())
            .expect("get")
            .expect("present");
        assert!(!loaded.is_host());
        assert_eq!(loaded.participant_ids(), vec!["aaaa"]);
    }

    #[test]
    fn test_conversation_requires_known_contacts() {
        let db = db();
        let group = Conversation::group("team", vec![peer("aaaa", "alice")]).expect("non-empty");
        assert!(db.add_conversation(&group).is_err());
    }

    #[test]
    fn test_message_history_order() {
        let db = db();
        let conv = "11111111-1111-1111-1111-111111111111";

        for (content, sender, ts) in [
            ("late", "bbbb", 200i64),
            ("early", "aaaa", 100),
            ("tie-second", "bbbb", 150),
            ("tie-first", "aaaa", 150),
        ] {
            db.add_message(&PlainMessage::from_parts(content, conv, sender, false, ts))
                .expect("add");
        }

        let history = db.messages_for_conversation(conv, 10).expect("list");
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["early", "tie-first", "tie-second", "late"]);
    }

    #[test]
    fn test_message_by_id_and_sent_flag() {
        let db = db();
        let conv = "11111111-1111-1111-1111-111111111111";
        let mut msg = PlainMessage::from_parts("hi", conv, "aaaa", false, 1);
        msg.mark_sent();

        let id = db.add_message(&msg).expect("add");
        let loaded = db.get_message(id).expect("get").expect("present");
        assert_eq!(loaded, msg);
        assert!(loaded.sent);
        assert!(db.get_message(id + 1).expect("get").is_none());
    }

    #[test]
    fn test_file_backed_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("parley.db");
        let config = DatabaseConfig::at(path.to_string_lossy().to_string());

        {
            let db = Database::open(&config).expect("open");
            db.add_contact(&peer("aaaa", "alice")).expect("add");
        }
        let db = Database::open(&config).expect("reopen");
        assert!(db.get_contact("aaaa").expect("get").is_some());
    }
}
