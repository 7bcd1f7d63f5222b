//! Remote peers and the directory that resolves them.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};

/// A remote peer as stored in the contact directory.
///
/// Identity (`id`) is immutable for the session; the same peer may appear
/// in any number of conversations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    /// UUID identifying this peer.
    pub id: String,
    /// User-friendly display name.
    pub nickname: String,
    /// Base64-encoded public key.
    pub public_key: String,
    /// Hostname or IP address.
    pub host: String,
    /// Server port.
    pub port: u16,
}

impl Peer {
    /// Create a peer, clamping the nickname to `nick_len_limit` characters.
    pub fn new(
        id: impl Into<String>,
        nickname: &str,
        public_key: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        nick_len_limit: usize,
    ) -> Self {
        Self {
            id: id.into(),
            nickname: clamp_nickname(nickname, nick_len_limit),
            public_key: public_key.into(),
            host: host.into(),
            port,
        }
    }

    /// Resolve this peer's network address.
    ///
    /// Fails with [`Error::Transport`] when the host does not resolve;
    /// callers at the delivery boundary translate that into a failed send.
    pub fn resolve(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| Error::Transport(format!("cannot resolve {}: {}", self.host, e)))?
            .next()
            .ok_or_else(|| Error::Transport(format!("no address for {}", self.host)))
    }
}

/// Clamp a display name to at most `limit` characters.
///
/// Display names are the one place where over-long input is truncated
/// instead of rejected.
pub fn clamp_nickname(nickname: &str, limit: usize) -> String {
    nickname.chars().take(limit).collect()
}

/// The contact directory consumed by the delivery layer.
pub trait PeerDirectory {
    /// Look up a peer by id.
    fn lookup(&self, peer_id: &str) -> Result<Peer>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nickname_clamp() {
        assert_eq!(clamp_nickname("short", 64), "short");
        assert_eq!(clamp_nickname("abcdefgh", 3), "abc");
        assert_eq!(clamp_nickname("", 3), "");
    }

    #[test]
    fn test_resolve_numeric_host() {
        let peer = Peer::new("id", "nick", "key", "127.0.0.1", 1337, 64);
        let addr = peer.resolve().expect("should resolve");
        assert_eq!(addr.port(), 1337);
    }

    #[test]
    fn test_resolve_bad_host_fails() {
        let peer = Peer::new("id", "nick", "key", "definitely-not-resolvable.invalid", 1, 64);
        assert!(peer.resolve().is_err());
    }
}
