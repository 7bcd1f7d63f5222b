//! The wire-transportable encrypted message.

use super::DELIMITER;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// An encrypted message, always scoped to exactly one recipient.
///
/// Both fields are base64 text produced by the hybrid transform; neither may
/// contain the delimiter or a newline. The envelope is meaningless without
/// the recipient's private key and carries no back-reference to the message
/// it was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    /// The symmetric session key, asymmetrically encrypted for the
    /// recipient, then text-encoded.
    pub wrapped_session_key: String,
    /// The serialized message, symmetrically encrypted under the session
    /// key, then text-encoded.
    pub cipher_text: String,
}

impl EncryptedEnvelope {
    /// Build an envelope, validating both fields against the wire grammar.
    pub fn new(wrapped_session_key: String, cipher_text: String) -> Result<Self> {
        for field in [&wrapped_session_key, &cipher_text] {
            if field.is_empty() {
                return Err(Error::Format("empty envelope section".into()));
            }
            if field.contains(DELIMITER) || field.contains('\n') || field.contains('\r') {
                return Err(Error::Format(
                    "envelope section contains a reserved character".into(),
                ));
            }
        }
        Ok(Self {
            wrapped_session_key,
            cipher_text,
        })
    }

    /// Serialize to the wire line: `wrapped session key ␝ ciphertext`
    /// (without the trailing newline; the transport adds it).
    pub fn to_wire(&self) -> String {
        format!(
            "{}{}{}",
            self.wrapped_session_key, DELIMITER, self.cipher_text
        )
    }

    /// Parse an envelope from a wire line.
    pub fn from_wire(line: &str) -> Result<Self> {
        let mut sections = line.split(DELIMITER);
        match (sections.next(), sections.next(), sections.next()) {
            (Some(key), Some(body), None) => Self::new(key.to_string(), body.to_string()),
            _ => Err(Error::Format(format!(
                "illegal envelope format ({} bytes)",
                line.len()
            ))),
        }
    }
}
