//! Fan-out of one logical message to every conversation participant.
//!
//! At-most-once, best-effort: no durable outbox, no retry, no ordering
//! guarantee across participants. One participant failing never prevents
//! attempts to the others.

use crate::conversation::Conversation;
use crate::crypto::{HybridCipher, KeyWrap, SymmetricCipher};
use crate::protocol::PlainMessage;
use crate::transport::DeliveryClient;
use tracing::{debug, warn};

/// Per-participant outcome of a broadcast.
///
/// Callers that retry do so selectively from the `failed` list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Ids of participants that acknowledged the message.
    pub delivered: Vec<String>,
    /// Ids of participants whose delivery failed.
    pub failed: Vec<String>,
}

impl DeliveryReport {
    /// True iff every participant's delivery succeeded.
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of deliveries attempted.
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }
}

/// Delivers one outgoing message to every participant of a conversation.
pub struct Fanout<S = crate::crypto::SessionCipher, W = crate::crypto::EciesWrap> {
    cipher: HybridCipher<S, W>,
    client: DeliveryClient,
}

impl<S: SymmetricCipher, W: KeyWrap> Fanout<S, W> {
    /// Build a fanout from its two capabilities.
    pub fn new(cipher: HybridCipher<S, W>, client: DeliveryClient) -> Self {
        Self { cipher, client }
    }

    /// Encrypt and send `msg` to each participant independently and
    /// sequentially.
    ///
    /// Encryption failures, unresolved addresses, and transport failures
    /// all count as a failed delivery for that participant only; there is
    /// no short-circuit. A direct conversation degenerates to delivery to
    /// the single host peer.
    pub async fn broadcast(
        &self,
        msg: &PlainMessage,
        conversation: &Conversation,
    ) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for peer in conversation.participants() {
            let acked = match self.cipher.encrypt(msg, peer) {
                Ok(envelope) => match peer.resolve() {
                    Ok(addr) => self.client.send(&envelope, addr).await,
                    Err(e) => {
                        warn!(peer = %peer.nickname, error = %e, "address did not resolve");
                        false
                    }
                },
                Err(e) => {
                    warn!(peer = %peer.nickname, error = %e, "encryption failed");
                    false
                }
            };

            if acked {
                debug!(peer = %peer.nickname, "message delivered");
                report.delivered.push(peer.id.clone());
            } else {
                warn!(peer = %peer.nickname, "sending failed");
                report.failed.push(peer.id.clone());
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_aggregate() {
        let mut report = DeliveryReport::default();
        assert!(report.all_delivered());
        assert_eq!(report.attempted(), 0);

        report.delivered.push("a".into());
        assert!(report.all_delivered());

        report.failed.push("b".into());
        assert!(!report.all_delivered());
        assert_eq!(report.attempted(), 2);
    }
}
