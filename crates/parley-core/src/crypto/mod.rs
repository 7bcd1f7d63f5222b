//! Cryptographic primitives for parley.
//!
//! Well-audited primitives only:
//!
//! - **X25519**: key exchange used to wrap session keys per recipient
//! - **ChaCha20-Poly1305**: authenticated encryption (AEAD)
//! - **HKDF-SHA256**: key derivation
//!
//! One symmetric and one asymmetric algorithm are fixed, but both sit
//! behind the [`SymmetricCipher`] and [`KeyWrap`] capability traits so a
//! substitute never changes call sites. Secret key material is zeroized on
//! drop and redacted in Debug output.

mod hybrid;
mod keys;

pub use hybrid::{EciesWrap, HybridCipher, KeyWrap, SessionCipher, SymmetricCipher};
pub use keys::{fingerprint, PublicKey, SharedSecret, StaticKeypair, PUBLIC_KEY_SIZE};

use crate::error::{Error, Result};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

/// Key size for ChaCha20-Poly1305.
pub const CIPHER_KEY_SIZE: usize = 32;

/// Derive keys using HKDF-SHA256.
pub fn hkdf_derive(
    salt: Option<&[u8]>,
    input_key_material: &[u8],
    info: &[u8],
    output_length: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    let hkdf = Hkdf::<Sha256>::new(salt, input_key_material);
    let mut output = Zeroizing::new(vec![0u8; output_length]);
    hkdf.expand(info, &mut output)
        .map_err(|_| Error::Crypto("HKDF expansion failed".into()))?;
    Ok(output)
}

/// Generate cryptographically secure random bytes.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut bytes);
    bytes
}

/// Generate a fresh random session key of `len` bytes.
pub fn random_session_key(len: usize) -> Zeroizing<Vec<u8>> {
    let mut key = Zeroizing::new(vec![0u8; len]);
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut key[..]);
    key
}
