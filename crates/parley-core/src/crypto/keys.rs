//! X25519 key types and their text encoding.
//!
//! The contact directory stores public keys as base64 text, so the key
//! types here carry their own text codec. Secret material is zeroized on
//! drop.

use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use x25519_dalek::StaticSecret;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of X25519 keys in bytes.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// An X25519 public key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    /// Encode as base64 text for the contact directory.
    pub fn to_text(&self) -> String {
        BASE64.encode(self.0)
    }

    /// Decode from base64 text.
    ///
    /// Fails with [`Error::InvalidKey`] for anything that is not exactly a
    /// base64-encoded 32-byte key.
    pub fn from_text(text: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(text)
            .map_err(|_| Error::InvalidKey("public key is not valid base64".into()))?;
        let bytes: [u8; PUBLIC_KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| Error::InvalidKey("public key has the wrong length".into()))?;
        Ok(Self(bytes))
    }

    pub(crate) fn to_dalek(&self) -> x25519_dalek::PublicKey {
        x25519_dalek::PublicKey::from(self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Only show first 8 bytes in debug output
        write!(f, "PublicKey({}...)", hex::encode(&self.0[..8]))
    }
}

impl From<x25519_dalek::PublicKey> for PublicKey {
    fn from(key: x25519_dalek::PublicKey) -> Self {
        Self(*key.as_bytes())
    }
}

/// A shared secret from X25519 key exchange, zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; PUBLIC_KEY_SIZE]);

impl SharedSecret {
    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedSecret([REDACTED])")
    }
}

/// A long-term X25519 keypair identifying the local user.
#[derive(ZeroizeOnDrop)]
pub struct StaticKeypair {
    #[zeroize(skip)]
    secret: StaticSecret,
    public: PublicKey,
}

impl StaticKeypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(x25519_dalek::PublicKey::from(&secret));
        Self { secret, public }
    }

    /// Restore from secret key bytes.
    pub fn from_secret_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(x25519_dalek::PublicKey::from(&secret));
        Self { secret, public }
    }

    /// Get the public key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Perform Diffie-Hellman key exchange.
    pub fn diffie_hellman(&self, their_public: &PublicKey) -> SharedSecret {
        let shared = self.secret.diffie_hellman(&their_public.to_dalek());
        SharedSecret(*shared.as_bytes())
    }

    /// Export secret key bytes for storage.
    ///
    /// # Security
    /// The database file is the trust boundary; keep it private.
    pub fn secret_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.secret.to_bytes()
    }
}

impl fmt::Debug for StaticKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticKeypair")
            .field("public", &self.public)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Compute the SHA-256 fingerprint of a public key.
///
/// Hex-encoded; users compare it out-of-band to verify they are talking to
/// the intended peer.
pub fn fingerprint(public_key: &PublicKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(public_key.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_codec_roundtrip() {
        let kp = StaticKeypair::generate();
        let text = kp.public_key().to_text();
        let parsed = PublicKey::from_text(&text).expect("should parse");
        assert_eq!(kp.public_key(), &parsed);
    }

    #[test]
    fn test_text_codec_rejects_garbage() {
        assert!(PublicKey::from_text("not base64 !!!").is_err());
        // Valid base64, wrong length.
        assert!(PublicKey::from_text("c2hvcnQ=").is_err());
    }

    #[test]
    fn test_dh_agreement() {
        let alice = StaticKeypair::generate();
        let bob = StaticKeypair::generate();

        let alice_shared = alice.diffie_hellman(bob.public_key());
        let bob_shared = bob.diffie_hellman(alice.public_key());

        assert_eq!(alice_shared.as_bytes(), bob_shared.as_bytes());
    }

    #[test]
    fn test_keypair_persistence() {
        let original = StaticKeypair::generate();
        let restored = StaticKeypair::from_secret_bytes(original.secret_bytes());
        assert_eq!(original.public_key(), restored.public_key());
    }

    #[test]
    fn test_fingerprint_stable() {
        let kp = StaticKeypair::generate();
        assert_eq!(fingerprint(kp.public_key()), fingerprint(kp.public_key()));
        assert_eq!(fingerprint(kp.public_key()).len(), 64);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let kp = StaticKeypair::generate();
        let dump = format!("{:?}", kp);
        assert!(dump.contains("[REDACTED]"));
        assert!(!dump.contains(&hex::encode(kp.secret_bytes())));
    }
}
