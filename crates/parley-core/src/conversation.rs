//! Conversations: who a message goes to.
//!
//! A conversation is either direct (we are the guest; the single host peer
//! owns the conversation id) or a group we host ourselves. The participant
//! set is only mutated through the explicit add/remove operations and is
//! never empty after construction.

use crate::peer::Peer;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fields shared by both conversation variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationInfo {
    /// UUID of the conversation.
    pub id: String,
    /// User-friendly display name.
    pub name: String,
}

/// A conversation between two or more peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Conversation {
    /// A two-party conversation where the remote peer owns the id.
    Direct {
        /// Shared id + name.
        info: ConversationInfo,
        /// The counterpart peer.
        host: Peer,
    },
    /// A multi-party conversation hosted locally.
    Group {
        /// Shared id + name.
        info: ConversationInfo,
        /// Participants, unique by peer id, never empty.
        participants: Vec<Peer>,
    },
}

impl Conversation {
    /// Create a direct conversation with `host`, named after them.
    pub fn direct(host: Peer) -> Self {
        Self::Direct {
            info: ConversationInfo {
                id: Uuid::new_v4().to_string(),
                name: host.nickname.clone(),
            },
            host,
        }
    }

    /// Restore a direct conversation from stored parts.
    pub fn direct_with_info(info: ConversationInfo, host: Peer) -> Self {
        Self::Direct { info, host }
    }

    /// Create a group conversation. Participants are deduplicated by id;
    /// returns `None` when that leaves nobody to talk to.
    pub fn group(name: impl Into<String>, participants: Vec<Peer>) -> Option<Self> {
        Self::group_with_info(
            ConversationInfo {
                id: Uuid::new_v4().to_string(),
                name: name.into(),
            },
            participants,
        )
    }

    /// Restore a group conversation from stored parts.
    pub fn group_with_info(info: ConversationInfo, participants: Vec<Peer>) -> Option<Self> {
        let mut unique: Vec<Peer> = Vec::with_capacity(participants.len());
        for peer in participants {
            if !unique.iter().any(|p| p.id == peer.id) {
                unique.push(peer);
            }
        }
        if unique.is_empty() {
            return None;
        }
        Some(Self::Group {
            info,
            participants: unique,
        })
    }

    /// UUID of the conversation.
    pub fn id(&self) -> &str {
        &self.info().id
    }

    /// Display name of the conversation.
    pub fn name(&self) -> &str {
        &self.info().name
    }

    /// Shared fields of either variant.
    pub fn info(&self) -> &ConversationInfo {
        match self {
            Self::Direct { info, .. } | Self::Group { info, .. } => info,
        }
    }

    /// Whether this conversation is hosted locally.
    pub fn is_host(&self) -> bool {
        matches!(self, Self::Group { .. })
    }

    /// The peers a message to this conversation is delivered to.
    pub fn participants(&self) -> &[Peer] {
        match self {
            Self::Direct { host, .. } => std::slice::from_ref(host),
            Self::Group { participants, .. } => participants,
        }
    }

    /// Ids of all participants.
    pub fn participant_ids(&self) -> Vec<String> {
        self.participants().iter().map(|p| p.id.clone()).collect()
    }

    /// Add a participant to a group. Returns false for direct
    /// conversations and for peers already present.
    pub fn add_participant(&mut self, peer: Peer) -> bool {
        match self {
            Self::Direct { .. } => false,
            Self::Group { participants, .. } => {
                if participants.iter().any(|p| p.id == peer.id) {
                    false
                } else {
                    participants.push(peer);
                    true
                }
            }
        }
    }

    /// Remove a participant from a group by id. Refuses to remove the last
    /// participant, so the set is never empty; returns whether a removal
    /// happened.
    pub fn remove_participant(&mut self, peer_id: &str) -> bool {
        match self {
            Self::Direct { .. } => false,
            Self::Group { participants, .. } => {
                if participants.len() <= 1 {
                    return false;
                }
                let before = participants.len();
                participants.retain(|p| p.id != peer_id);
                participants.len() < before
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(id: &str) -> Peer {
        Peer::new(id, id, "a2V5", "127.0.0.1", 1337, 64)
    }

    #[test]
    fn test_direct_single_participant() {
        let conv = Conversation::direct(peer("alice"));
        assert!(!conv.is_host());
        assert_eq!(conv.participant_ids(), vec!["alice"]);
        assert_eq!(conv.name(), "alice");
    }

    #[test]
    fn test_group_dedups_participants() {
        let conv =
            Conversation::group("team", vec![peer("a"), peer("b"), peer("a")]).expect("non-empty");
        assert!(conv.is_host());
        assert_eq!(conv.participant_ids(), vec!["a", "b"]);
    }

    #[test]
    fn test_group_rejects_empty() {
        assert!(Conversation::group("nobody", vec![]).is_none());
    }

    #[test]
    fn test_add_remove_participants() {
        let mut conv = Conversation::group("team", vec![peer("a")]).expect("non-empty");

        assert!(conv.add_participant(peer("b")));
        assert!(!conv.add_participant(peer("b")));
        assert!(conv.remove_participant("b"));
        assert!(!conv.remove_participant("b"));

        // The last participant cannot be removed.
        assert!(!conv.remove_participant("a"));
        assert_eq!(conv.participants().len(), 1);
    }

    #[test]
    fn test_direct_rejects_mutation() {
        let mut conv = Conversation::direct(peer("alice"));
        assert!(!conv.add_participant(peer("bob")));
        assert!(!conv.remove_participant("alice"));
        assert_eq!(conv.participants().len(), 1);
    }
}
