//! Persistence for identity, contacts, conversations and message history.
//!
//! A single sqlite file per peer. The database doubles as the peer
//! directory consumed by the delivery layer.

mod database;
mod schema;

pub use database::{Database, DatabaseConfig};

/// Default database file name.
pub const DEFAULT_DB_NAME: &str = "parley.db";
