//! Wire protocol for parley.
//!
//! A line-oriented text protocol. Fields are joined by a reserved,
//! non-printable delimiter that is never permitted inside a field value.
//!
//! ## Plaintext message layout
//!
//! ```text
//! ┌───┬──────────────┬───┬──────────────┬───┬───────────┬───┬──────┬───┬─────────┐
//! │ ␝ │ hex(seconds) │ ␝ │ conversation │ ␝ │ sender id │ ␝ │ 0|1  │ ␝ │ content │
//! └───┴──────────────┴───┴──────────────┴───┴───────────┴───┴──────┴───┴─────────┘
//! ```
//!
//! The plaintext layout never travels over the network directly; it is the
//! input to the hybrid encryption transform. What goes on the wire is the
//! envelope: `wrapped session key ␝ ciphertext`, newline terminated.
//!
//! Malformed input is rejected with [`Error::Format`](crate::Error::Format)
//! and never crashes the receiving side.

mod codec;
mod envelope;
mod message;

pub use codec::{escape_pattern_chars, unescape_pattern_chars, MessageCodec, HEADER_MIN_LEN};
pub use envelope::EncryptedEnvelope;
pub use message::PlainMessage;

/// Character separating the sections of a message (U+001D, group separator).
pub const DELIMITER: char = '\u{1D}';

/// Returns true if `s` is non-empty lowercase hexadecimal.
pub(crate) fn is_lower_hex(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

/// Returns true if `s` has the 8-4-4-4-12 lowercase-hex UUID shape.
pub(crate) fn is_uuid(s: &str) -> bool {
    let groups: Vec<&str> = s.split('-').collect();
    if groups.len() != 5 {
        return false;
    }
    let lens = [8, 4, 4, 4, 12];
    groups
        .iter()
        .zip(lens.iter())
        .all(|(g, len)| g.len() == *len && is_lower_hex(g))
}
