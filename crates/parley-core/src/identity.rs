//! The local user's identity.
//!
//! An identity is a UUID, a nickname and an X25519 keypair. It is generated
//! automatically on first run and persisted in the database; there is no
//! account and no recovery mechanism.

use crate::crypto::{fingerprint, StaticKeypair, PUBLIC_KEY_SIZE};
use crate::error::Result;
use crate::peer::clamp_nickname;
use crate::storage::Database;
use std::fmt;
use tracing::info;
use uuid::Uuid;

/// The local user: who outgoing messages are from and which private key
/// inbound envelopes are opened with.
pub struct LocalIdentity {
    id: String,
    nickname: String,
    keypair: StaticKeypair,
}

impl LocalIdentity {
    /// Generate a fresh identity with a random UUID and keypair.
    pub fn generate(nickname: &str, nick_len_limit: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            nickname: clamp_nickname(nickname, nick_len_limit),
            keypair: StaticKeypair::generate(),
        }
    }

    /// Restore an identity from stored parts.
    pub fn from_parts(
        id: impl Into<String>,
        nickname: impl Into<String>,
        secret_bytes: [u8; PUBLIC_KEY_SIZE],
    ) -> Self {
        Self {
            id: id.into(),
            nickname: nickname.into(),
            keypair: StaticKeypair::from_secret_bytes(secret_bytes),
        }
    }

    /// UUID used as the sender id of outgoing messages.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name.
    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    /// The long-term keypair.
    pub fn keypair(&self) -> &StaticKeypair {
        &self.keypair
    }

    /// Public key as base64 text, the form contacts exchange.
    pub fn public_key_text(&self) -> String {
        self.keypair.public_key().to_text()
    }

    /// SHA-256 fingerprint of the public key for out-of-band comparison.
    pub fn fingerprint(&self) -> String {
        fingerprint(self.keypair.public_key())
    }
}

impl fmt::Debug for LocalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalIdentity")
            .field("id", &self.id)
            .field("nickname", &self.nickname)
            .field("keypair", &self.keypair)
            .finish()
    }
}

/// Load the stored identity, generating and persisting one on first run.
pub fn load_or_generate(db: &Database, nickname: &str, nick_len_limit: usize) -> Result<LocalIdentity> {
    if let Some(identity) = db.load_identity()? {
        return Ok(identity);
    }

    let identity = LocalIdentity::generate(nickname, nick_len_limit);
    db.store_identity(&identity)?;
    info!(
        id = %identity.id(),
        fingerprint = %identity.fingerprint(),
        "generated new identity"
    );
    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Database, DatabaseConfig};

    #[test]
    fn test_generate_clamps_nickname() {
        let identity = LocalIdentity::generate("averylongnickname", 5);
        assert_eq!(identity.nickname(), "avery");
    }

    #[test]
    fn test_restore_preserves_keys() {
        let original = LocalIdentity::generate("me", 64);
        let restored = LocalIdentity::from_parts(
            original.id(),
            original.nickname(),
            original.keypair().secret_bytes(),
        );
        assert_eq!(original.public_key_text(), restored.public_key_text());
        assert_eq!(original.fingerprint(), restored.fingerprint());
    }

    #[test]
    fn test_load_or_generate_is_stable() {
        let db = Database::open(&DatabaseConfig::in_memory()).expect("open");

        let first = load_or_generate(&db, "me", 64).expect("first run");
        let second = load_or_generate(&db, "ignored", 64).expect("second run");

        assert_eq!(first.id(), second.id());
        assert_eq!(first.public_key_text(), second.public_key_text());
        assert_eq!(second.nickname(), "me");
    }

    #[test]
    fn test_debug_never_prints_secret() {
        let identity = LocalIdentity::generate("me", 64);
        let dump = format!("{:?}", identity);
        assert!(dump.contains("[REDACTED]"));
        assert!(!dump.contains(&hex::encode(identity.keypair().secret_bytes())));
    }
}
