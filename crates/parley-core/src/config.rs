//! Program settings.
//!
//! An explicit struct with validated setters, loaded from a plain
//! `key = value` file by an ordinary parser. Every value has a default so
//! a peer can start with zero configuration. Out-of-range values are
//! clamped to the documented bounds with a warning rather than rejected.

use crate::error::{Error, Result};
use std::fmt::Display;
use std::path::Path;
use tracing::warn;

/// Default server port.
pub const DEFAULT_PORT: u16 = 1337;
/// Default connect/read timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;
/// Default message content length limit in characters.
pub const DEFAULT_MSG_LEN_LIMIT: usize = 4096;
/// Default header length limit in bytes.
pub const DEFAULT_HEADER_LEN_LIMIT: usize = 256;
/// Default nickname length limit in characters.
pub const DEFAULT_NICK_LEN_LIMIT: usize = 64;
/// Default session key length in bytes (128 bits of entropy).
pub const DEFAULT_SESSION_KEY_LEN: usize = 16;

/// Runtime settings for a parley peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    port: u16,
    host: String,
    connection_timeout_ms: u64,
    msg_len_limit: usize,
    header_len_limit: usize,
    nick_len_limit: usize,
    session_key_len: usize,
    db_path: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            host: "127.0.0.1".to_string(),
            connection_timeout_ms: DEFAULT_TIMEOUT_MS,
            msg_len_limit: DEFAULT_MSG_LEN_LIMIT,
            header_len_limit: DEFAULT_HEADER_LEN_LIMIT,
            nick_len_limit: DEFAULT_NICK_LEN_LIMIT,
            session_key_len: DEFAULT_SESSION_KEY_LEN,
            db_path: "parley.db".to_string(),
        }
    }
}

impl Settings {
    /// Port the server listens on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Set the server port. Clamped to `1025..=49151`.
    pub fn set_port(&mut self, port: u16) {
        self.port = clamp("port", u64::from(port), 1025, 49151) as u16;
    }

    /// Host the server binds to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Set the bind host (an IP address or `localhost`).
    pub fn set_host(&mut self, host: impl Into<String>) {
        self.host = host.into();
    }

    /// Socket timeout in milliseconds, bounding both connect and read.
    pub fn connection_timeout_ms(&self) -> u64 {
        self.connection_timeout_ms
    }

    /// Set the socket timeout. The minimum is 1000 ms.
    pub fn set_connection_timeout_ms(&mut self, ms: u64) {
        self.connection_timeout_ms = clamp("connection_timeout_ms", ms, 1000, u64::MAX);
    }

    /// Message content length limit in characters.
    pub fn msg_len_limit(&self) -> usize {
        self.msg_len_limit
    }

    /// Set the message length limit. The minimum is 1.
    pub fn set_msg_len_limit(&mut self, limit: usize) {
        self.msg_len_limit = clamp("message_length_limit", limit as u64, 1, u64::MAX) as usize;
    }

    /// Header length limit in bytes.
    pub fn header_len_limit(&self) -> usize {
        self.header_len_limit
    }

    /// Set the header length limit. The minimum is 64.
    pub fn set_header_len_limit(&mut self, limit: usize) {
        self.header_len_limit = clamp("header_length_limit", limit as u64, 64, u64::MAX) as usize;
    }

    /// Nickname length limit in characters.
    pub fn nick_len_limit(&self) -> usize {
        self.nick_len_limit
    }

    /// Set the nickname length limit. The minimum is 1.
    pub fn set_nick_len_limit(&mut self, limit: usize) {
        self.nick_len_limit = clamp("nickname_length_limit", limit as u64, 1, u64::MAX) as usize;
    }

    /// Session key length in bytes.
    pub fn session_key_len(&self) -> usize {
        self.session_key_len
    }

    /// Set the session key length. The minimum is 8 bytes.
    pub fn set_session_key_len(&mut self, len: usize) {
        self.session_key_len = clamp("session_key_length", len as u64, 8, u64::MAX) as usize;
    }

    /// Path of the sqlite database file.
    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Set the database path.
    pub fn set_db_path(&mut self, path: impl Into<String>) {
        self.db_path = path.into();
    }

    /// Load settings from a `key = value` file.
    ///
    /// Blank lines and lines starting with `#` are skipped. Unknown keys
    /// and unparsable values produce a warning and keep the default.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("cannot read settings file: {}", e)))?;

        let mut settings = Self::default();
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                warn!(line = lineno + 1, "settings line has no '=', skipping");
                continue;
            };
            settings.apply(key.trim(), value.trim(), lineno + 1);
        }
        Ok(settings)
    }

    /// Write settings to a `key = value` file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_file_string())
            .map_err(|e| Error::Config(format!("cannot write settings file: {}", e)))
    }

    fn to_file_string(&self) -> String {
        format!(
            "port = {}\n\
             host = {}\n\
             connection_timeout_ms = {}\n\
             message_length_limit = {}\n\
             header_length_limit = {}\n\
             nickname_length_limit = {}\n\
             session_key_length = {}\n\
             database_path = {}\n",
            self.port,
            self.host,
            self.connection_timeout_ms,
            self.msg_len_limit,
            self.header_len_limit,
            self.nick_len_limit,
            self.session_key_len,
            self.db_path,
        )
    }

    fn apply(&mut self, key: &str, value: &str, lineno: usize) {
        match key {
            "port" => apply_num(key, value, lineno, |v| self.set_port(v)),
            "host" => self.set_host(value),
            "connection_timeout_ms" => {
                apply_num(key, value, lineno, |v| self.set_connection_timeout_ms(v))
            }
            "message_length_limit" => apply_num(key, value, lineno, |v| self.set_msg_len_limit(v)),
            "header_length_limit" => {
                apply_num(key, value, lineno, |v| self.set_header_len_limit(v))
            }
            "nickname_length_limit" => {
                apply_num(key, value, lineno, |v| self.set_nick_len_limit(v))
            }
            "session_key_length" => apply_num(key, value, lineno, |v| self.set_session_key_len(v)),
            "database_path" => self.set_db_path(value),
            _ => warn!(key, line = lineno, "unknown settings key, ignoring"),
        }
    }
}

fn apply_num<T: std::str::FromStr>(key: &str, value: &str, lineno: usize, set: impl FnOnce(T)) {
    match value.parse::<T>() {
        Ok(v) => set(v),
        Err(_) => warn!(key, value, line = lineno, "unparsable value, keeping default"),
    }
}

fn clamp<T>(key: &str, value: T, min: T, max: T) -> T
where
    T: Ord + Copy + Display,
{
    if value < min {
        warn!(key, %value, %min, "value below minimum, clamping");
        min
    } else if value > max {
        warn!(key, %value, %max, "value above maximum, clamping");
        max
    } else {
        value
    }
}
