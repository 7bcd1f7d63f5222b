//! Serialization of [`PlainMessage`] to and from the delimiter-joined wire
//! text, with strict validation in both directions.
//!
//! Encoding fails for content that is empty, over the configured limit, or
//! contains the delimiter; decoding re-checks the full header and content
//! grammar so a malformed line can never produce a half-valid message.

use super::message::PlainMessage;
use super::{is_lower_hex, is_uuid, DELIMITER};
use crate::config::Settings;
use crate::error::{Error, Result};

/// Minimum accepted header length in bytes (leading delimiter through flag).
pub const HEADER_MIN_LEN: usize = 9;

/// Characters that are special in a pattern representation of the grammar.
///
/// Content is escaped for these before emission and unescaped after
/// parsing, so encode/decode round-trips losslessly.
const PATTERN_CHARS: &[char] = &[
    '{', '}', '(', ')', '[', ']', '.', '+', '*', '?', '^', '$', '\\', '|',
];

/// Escape pattern-special characters with a preceding backslash.
pub fn escape_pattern_chars(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if PATTERN_CHARS.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Reverse [`escape_pattern_chars`]. A backslash not followed by a
/// pattern-special character is kept as-is.
pub fn unescape_pattern_chars(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if PATTERN_CHARS.contains(&next) {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

/// Deterministic, lossless text codec for [`PlainMessage`].
#[derive(Debug, Clone)]
pub struct MessageCodec {
    msg_len_limit: usize,
    header_len_limit: usize,
}

impl MessageCodec {
    /// Create a codec using the configured length limits.
    pub fn new(settings: &Settings) -> Self {
        Self {
            msg_len_limit: settings.msg_len_limit(),
            header_len_limit: settings.header_len_limit(),
        }
    }

    /// Create a codec with explicit limits.
    pub fn with_limits(msg_len_limit: usize, header_len_limit: usize) -> Self {
        Self {
            msg_len_limit,
            header_len_limit,
        }
    }

    /// Serialize a message to its wire text.
    ///
    /// Format: `␝ + hex(timestamp) + ␝ + conversation + ␝ + sender + ␝ +
    /// ("1"|"0") + ␝ + content`, where content is pattern-escaped.
    pub fn encode(&self, msg: &PlainMessage) -> Result<String> {
        self.validate_content(&msg.content)?;

        if msg.timestamp < 0 {
            return Err(Error::Format("negative timestamp".into()));
        }
        if !is_uuid(&msg.conversation_id) {
            return Err(Error::Format("malformed conversation id".into()));
        }
        if !is_uuid(&msg.sender_id) {
            return Err(Error::Format("malformed sender id".into()));
        }

        let flag = if msg.is_command { '1' } else { '0' };
        let header = format!(
            "{d}{ts:x}{d}{conv}{d}{sender}{d}{flag}",
            d = DELIMITER,
            ts = msg.timestamp,
            conv = msg.conversation_id,
            sender = msg.sender_id,
        );
        self.validate_header_len(header.len())?;

        Ok(format!(
            "{header}{d}{content}",
            d = DELIMITER,
            content = escape_pattern_chars(&msg.content)
        ))
    }

    /// Parse wire text back into a message.
    ///
    /// Fails with [`Error::Format`] when the header grammar (lowercase hex
    /// timestamp, UUID-shaped ids, flag exactly `0` or `1`) or the content
    /// grammar is violated.
    pub fn decode(&self, text: &str) -> Result<PlainMessage> {
        let sections: Vec<&str> = text.split(DELIMITER).collect();
        if sections.len() != 6 || !sections[0].is_empty() {
            return Err(Error::Format("wrong number of message sections".into()));
        }

        let (ts_hex, conversation, sender, flag, escaped) =
            (sections[1], sections[2], sections[3], sections[4], sections[5]);

        if !is_lower_hex(ts_hex) || ts_hex.len() > 16 {
            return Err(Error::Format("timestamp is not lowercase hex".into()));
        }
        let timestamp = u64::from_str_radix(ts_hex, 16)
            .ok()
            .and_then(|ts| i64::try_from(ts).ok())
            .ok_or_else(|| Error::Format("timestamp out of range".into()))?;

        if !is_uuid(conversation) {
            return Err(Error::Format("malformed conversation id".into()));
        }
        if !is_uuid(sender) {
            return Err(Error::Format("malformed sender id".into()));
        }

        let is_command = match flag {
            "0" => false,
            "1" => true,
            _ => return Err(Error::Format("command flag must be 0 or 1".into())),
        };

        // Header = leading delimiter through the flag, excluding the
        // delimiter that introduces the content.
        let header_len = 4 + ts_hex.len() + conversation.len() + sender.len() + flag.len();
        self.validate_header_len(header_len)?;

        let content = unescape_pattern_chars(escaped);
        self.validate_content(&content)?;

        Ok(PlainMessage::from_parts(
            content,
            conversation,
            sender,
            is_command,
            timestamp,
        ))
    }

    fn validate_content(&self, content: &str) -> Result<()> {
        if content.is_empty() {
            return Err(Error::Format("empty message content".into()));
        }
        let len = content.chars().count();
        if len > self.msg_len_limit {
            return Err(Error::Format(format!(
                "content length {} exceeds limit {}",
                len, self.msg_len_limit
            )));
        }
        if content.contains(DELIMITER) {
            return Err(Error::Format("content contains the delimiter".into()));
        }
        Ok(())
    }

    fn validate_header_len(&self, len: usize) -> Result<()> {
        if len < HEADER_MIN_LEN || len > self.header_len_limit {
            return Err(Error::Format(format!(
                "header length {} outside {}..={}",
                len, HEADER_MIN_LEN, self.header_len_limit
            )));
        }
        Ok(())
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new(&Settings::default())
    }
}
