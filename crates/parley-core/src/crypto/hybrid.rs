//! Hybrid encryption of messages.
//!
//! A fresh random session key is generated per message, the serialized
//! message is sealed symmetrically under it, and the session key itself is
//! wrapped asymmetrically for exactly one recipient. Session keys are never
//! reused across messages or recipients.

use super::keys::{PublicKey, StaticKeypair};
use super::{hkdf_derive, random_session_key, CIPHER_KEY_SIZE};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::peer::Peer;
use crate::protocol::{EncryptedEnvelope, MessageCodec, PlainMessage};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand::RngCore;
use tracing::debug;
use zeroize::Zeroizing;

/// Size of AEAD nonces in bytes.
const NONCE_SIZE: usize = 12;

/// Size of AEAD authentication tags in bytes.
const TAG_SIZE: usize = 16;

/// Domain separation for the session-key derived cipher key.
const SESSION_INFO: &[u8] = b"parley-session-v1";

/// Domain separation for the wrap key derived from the DH shared secret.
const WRAP_INFO: &[u8] = b"parley-wrap-v1";

/// Seals and opens a payload under a session key.
pub trait SymmetricCipher: Send + Sync {
    /// Encrypt `plaintext` under `session_key`.
    fn seal(&self, session_key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>;
    /// Decrypt data produced by [`SymmetricCipher::seal`].
    fn open(&self, session_key: &[u8], data: &[u8]) -> Result<Zeroizing<Vec<u8>>>;
}

/// Wraps a session key for one recipient and unwraps it locally.
pub trait KeyWrap: Send + Sync {
    /// Encrypt `session_key` so only the holder of the private key matching
    /// `recipient` can recover it.
    fn wrap(&self, session_key: &[u8], recipient: &PublicKey) -> Result<Vec<u8>>;
    /// Recover a session key using the local private key.
    fn unwrap_key(&self, wrapped: &[u8], local: &StaticKeypair) -> Result<Zeroizing<Vec<u8>>>;
}

/// ChaCha20-Poly1305 over an HKDF-derived cipher key.
///
/// The configured session key length is independent of the cipher's key
/// width; HKDF stretches whatever entropy the session key carries to the
/// full 32 bytes. Output layout: `nonce (12) || ciphertext || tag (16)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionCipher;

impl SessionCipher {
    fn cipher_for(&self, session_key: &[u8]) -> Result<ChaCha20Poly1305> {
        let key = hkdf_derive(None, session_key, SESSION_INFO, CIPHER_KEY_SIZE)?;
        ChaCha20Poly1305::new_from_slice(&key)
            .map_err(|_| Error::Crypto("cipher initialization failed".into()))
    }
}

impl SymmetricCipher for SessionCipher {
    fn seal(&self, session_key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = self.cipher_for(session_key)?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| Error::Crypto("encryption failed".into()))?;

        let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(&ciphertext);
        Ok(output)
    }

    fn open(&self, session_key: &[u8], data: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        if data.len() < NONCE_SIZE + TAG_SIZE {
            return Err(Error::Crypto("ciphertext too short".into()));
        }
        let cipher = self.cipher_for(session_key)?;

        let plaintext = cipher
            .decrypt(Nonce::from_slice(&data[..NONCE_SIZE]), &data[NONCE_SIZE..])
            .map_err(|_| Error::Crypto("decryption failed".into()))?;
        Ok(Zeroizing::new(plaintext))
    }
}

/// X25519-based key wrap.
///
/// An ephemeral keypair performs DH with the recipient's static public key;
/// the shared secret drives HKDF-SHA256 into a wrap key, which seals the
/// session key with ChaCha20-Poly1305. Output layout:
/// `ephemeral public (32) || nonce (12) || ciphertext || tag (16)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EciesWrap;

impl EciesWrap {
    fn wrap_cipher(shared: &[u8; 32]) -> Result<ChaCha20Poly1305> {
        // An all-zero shared secret means a low-order public key.
        if shared.iter().all(|&b| b == 0) {
            return Err(Error::InvalidKey("unusable public key".into()));
        }
        let key = hkdf_derive(None, shared, WRAP_INFO, CIPHER_KEY_SIZE)?;
        ChaCha20Poly1305::new_from_slice(&key)
            .map_err(|_| Error::Crypto("cipher initialization failed".into()))
    }
}

impl KeyWrap for EciesWrap {
    fn wrap(&self, session_key: &[u8], recipient: &PublicKey) -> Result<Vec<u8>> {
        let ephemeral = x25519_dalek::EphemeralSecret::random_from_rng(rand::rngs::OsRng);
        let ephemeral_public = x25519_dalek::PublicKey::from(&ephemeral);
        let shared = ephemeral.diffie_hellman(&recipient.to_dalek());

        let cipher = Self::wrap_cipher(shared.as_bytes())?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), session_key)
            .map_err(|_| Error::Crypto("session key wrap failed".into()))?;

        let mut output =
            Vec::with_capacity(super::PUBLIC_KEY_SIZE + NONCE_SIZE + ciphertext.len());
        output.extend_from_slice(ephemeral_public.as_bytes());
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(&ciphertext);
        Ok(output)
    }

    fn unwrap_key(&self, wrapped: &[u8], local: &StaticKeypair) -> Result<Zeroizing<Vec<u8>>> {
        if wrapped.len() < super::PUBLIC_KEY_SIZE + NONCE_SIZE + TAG_SIZE {
            return Err(Error::InvalidKey("wrapped session key too short".into()));
        }
        let (eph, rest) = wrapped.split_at(super::PUBLIC_KEY_SIZE);
        let (nonce, ciphertext) = rest.split_at(NONCE_SIZE);

        let eph: [u8; 32] = eph
            .try_into()
            .map_err(|_| Error::InvalidKey("malformed ephemeral key".into()))?;
        let shared = local.diffie_hellman(&PublicKey::from_bytes(eph));

        let cipher = Self::wrap_cipher(shared.as_bytes())?;
        let session_key = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::InvalidKey("session key does not unwrap with this key".into()))?;
        Ok(Zeroizing::new(session_key))
    }
}

/// Encrypts messages for one recipient and decrypts inbound envelopes.
#[derive(Debug, Clone)]
pub struct HybridCipher<S = SessionCipher, W = EciesWrap> {
    codec: MessageCodec,
    session_key_len: usize,
    symmetric: S,
    wrap: W,
}

impl HybridCipher {
    /// Create a cipher with the default algorithm pair and configured
    /// codec limits and session key length.
    pub fn new(settings: &Settings) -> Self {
        Self {
            codec: MessageCodec::new(settings),
            session_key_len: settings.session_key_len(),
            symmetric: SessionCipher,
            wrap: EciesWrap,
        }
    }
}

impl Default for HybridCipher {
    fn default() -> Self {
        Self::new(&Settings::default())
    }
}

impl<S: SymmetricCipher, W: KeyWrap> HybridCipher<S, W> {
    /// Assemble a cipher from explicit capabilities.
    pub fn with_parts(codec: MessageCodec, session_key_len: usize, symmetric: S, wrap: W) -> Self {
        Self {
            codec,
            session_key_len,
            symmetric,
            wrap,
        }
    }

    /// Encrypt a message for one recipient.
    ///
    /// Generates a fresh session key on every call. Fails with
    /// [`Error::InvalidKey`] when the recipient's stored public key is
    /// malformed or unusable.
    pub fn encrypt(&self, msg: &PlainMessage, recipient: &Peer) -> Result<EncryptedEnvelope> {
        let recipient_key = PublicKey::from_text(&recipient.public_key)?;
        let session_key = random_session_key(self.session_key_len);
        debug!(
            session_key = %crate::logging::RedactedBytes(&session_key),
            recipient = %recipient.nickname,
            "fresh session key generated"
        );

        let formatted = self.codec.encode(msg)?;
        let sealed = self.symmetric.seal(&session_key, formatted.as_bytes())?;
        let wrapped = self.wrap.wrap(&session_key, &recipient_key)?;

        EncryptedEnvelope::new(BASE64.encode(wrapped), BASE64.encode(sealed))
    }

    /// Decrypt an inbound envelope with the local private key.
    ///
    /// Fails with [`Error::InvalidKey`] when the local key cannot unwrap
    /// the session key (wrong key, corrupted envelope) and with
    /// [`Error::Format`] when the decrypted text fails wire validation.
    pub fn decrypt(
        &self,
        envelope: &EncryptedEnvelope,
        local: &StaticKeypair,
    ) -> Result<PlainMessage> {
        let wrapped = BASE64
            .decode(&envelope.wrapped_session_key)
            .map_err(|_| Error::InvalidKey("wrapped session key is not valid base64".into()))?;
        let session_key = self.wrap.unwrap_key(&wrapped, local)?;

        let sealed = BASE64
            .decode(&envelope.cipher_text)
            .map_err(|_| Error::Format("ciphertext is not valid base64".into()))?;
        let plaintext = self.symmetric.open(&session_key, &sealed)?;

        let text = String::from_utf8(plaintext.to_vec())
            .map_err(|_| Error::Format("decrypted payload is not UTF-8".into()))?;
        self.codec.decode(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONV: &str = "11111111-1111-1111-1111-111111111111";
    const SENDER: &str = "22222222-2222-2222-2222-222222222222";

    fn peer_for(keypair: &StaticKeypair) -> Peer {
        Peer {
            id: "33333333-3333-3333-3333-333333333333".into(),
            nickname: "alice".into(),
            public_key: keypair.public_key().to_text(),
            host: "127.0.0.1".into(),
            port: 1337,
        }
    }

    fn msg(content: &str) -> PlainMessage {
        PlainMessage::from_parts(content, CONV, SENDER, false, 1_700_000_000)
    }

    #[test]
    fn test_hybrid_roundtrip() {
        let cipher = HybridCipher::default();
        let recipient_keys = StaticKeypair::generate();

        let original = msg("hello over the wire");
        let envelope = cipher
            .encrypt(&original, &peer_for(&recipient_keys))
            .expect("encrypt");
        let decrypted = cipher.decrypt(&envelope, &recipient_keys).expect("decrypt");

        assert_eq!(original, decrypted);
    }

    #[test]
    fn test_command_flag_survives_encryption() {
        let cipher = HybridCipher::default();
        let keys = StaticKeypair::generate();

        let original = PlainMessage::from_parts("/exit", CONV, SENDER, true, 7);
        let envelope = cipher.encrypt(&original, &peer_for(&keys)).expect("encrypt");
        assert!(cipher.decrypt(&envelope, &keys).expect("decrypt").is_command);
    }

    #[test]
    fn test_fresh_session_key_per_call() {
        let cipher = HybridCipher::default();
        let keys = StaticKeypair::generate();
        let message = msg("same message twice");

        let a = cipher.encrypt(&message, &peer_for(&keys)).expect("encrypt");
        let b = cipher.encrypt(&message, &peer_for(&keys)).expect("encrypt");

        assert_ne!(a.wrapped_session_key, b.wrapped_session_key);
        assert_ne!(a.cipher_text, b.cipher_text);
    }

    #[test]
    fn test_wrong_key_fails_never_garbles() {
        let cipher = HybridCipher::default();
        let intended = StaticKeypair::generate();
        let other = StaticKeypair::generate();

        let envelope = cipher
            .encrypt(&msg("for intended eyes"), &peer_for(&intended))
            .expect("encrypt");

        match cipher.decrypt(&envelope, &other) {
            Err(Error::InvalidKey(_)) => {}
            other => panic!("expected InvalidKey, got {:?}", other.map(|m| m.content)),
        }
    }

    #[test]
    fn test_same_key_length_still_isolated() {
        // Two recipients share the session key length configuration; an
        // envelope for one must still fail under the other's private key.
        let settings = Settings::default();
        let cipher = HybridCipher::new(&settings);
        let p1 = StaticKeypair::generate();
        let p2 = StaticKeypair::generate();

        let envelope = cipher.encrypt(&msg("p1 only"), &peer_for(&p1)).expect("encrypt");
        assert!(cipher.decrypt(&envelope, &p1).is_ok());
        assert!(matches!(
            cipher.decrypt(&envelope, &p2),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn test_malformed_recipient_key() {
        let cipher = HybridCipher::default();
        let mut peer = peer_for(&StaticKeypair::generate());
        peer.public_key = "definitely not a key".into();

        assert!(matches!(
            cipher.encrypt(&msg("x"), &peer),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let cipher = HybridCipher::default();
        let keys = StaticKeypair::generate();

        let mut envelope = cipher.encrypt(&msg("x"), &peer_for(&keys)).expect("encrypt");
        envelope.cipher_text = {
            let mut bytes = BASE64.decode(&envelope.cipher_text).expect("base64");
            bytes[0] ^= 0xFF;
            BASE64.encode(bytes)
        };

        assert!(cipher.decrypt(&envelope, &keys).is_err());
    }

    #[test]
    fn test_session_cipher_standalone() {
        let sym = SessionCipher;
        let key = random_session_key(16);

        let sealed = sym.seal(&key, b"payload").expect("seal");
        assert_eq!(&*sym.open(&key, &sealed).expect("open"), b"payload");

        let other = random_session_key(16);
        assert!(sym.open(&other, &sealed).is_err());
    }

    #[test]
    fn test_key_wrap_standalone() {
        let wrap = EciesWrap;
        let local = StaticKeypair::generate();
        let session_key = random_session_key(16);

        let wrapped = wrap.wrap(&session_key, local.public_key()).expect("wrap");
        let recovered = wrap.unwrap_key(&wrapped, &local).expect("unwrap");
        assert_eq!(&*recovered, &*session_key);

        assert!(wrap
            .unwrap_key(&wrapped, &StaticKeypair::generate())
            .is_err());
        assert!(wrap.unwrap_key(&wrapped[..10], &local).is_err());
    }
}
