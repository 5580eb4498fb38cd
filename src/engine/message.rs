use serde::{Deserialize, Serialize};
use std::fmt;

/// Type alias for consensus participant identifiers
pub type ParticipantId = usize;

/// Where a message is headed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    Participant(ParticipantId),
    /// The external client that submitted the request
    Client,
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipient::Participant(id) => write!(f, "{id}"),
            Recipient::Client => write!(f, "client"),
        }
    }
}

/// A previously accepted proposal reported inside a promise
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorAccept {
    pub round: u64,
    pub value: String,
}

/// Protocol messages drawn between participants. They carry no side effects:
/// the simulators apply state changes when a round of messages is processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Paxos phase 1a
    Prepare {
        from: ParticipantId,
        to: Recipient,
        round: u64,
    },
    /// Paxos phase 1b, optionally reporting the highest accepted proposal
    Promise {
        from: ParticipantId,
        to: Recipient,
        round: u64,
        prior: Option<PriorAccept>,
    },
    /// Paxos phase 2a
    Accept {
        from: ParticipantId,
        to: Recipient,
        round: u64,
        value: String,
    },
    /// Paxos phase 2b, also used to inform learners
    Accepted {
        from: ParticipantId,
        to: Recipient,
        round: u64,
        value: String,
    },
    /// PBFT primary ordering a client request
    PrePrepare {
        from: ParticipantId,
        to: Recipient,
        view: u64,
        seq: u64,
        value: String,
    },
    /// PBFT prepare vote
    PrepareVote {
        from: ParticipantId,
        to: Recipient,
        view: u64,
        seq: u64,
        value: String,
    },
    /// PBFT commit vote
    Commit {
        from: ParticipantId,
        to: Recipient,
        view: u64,
        seq: u64,
    },
    /// PBFT reply to the client
    Reply {
        from: ParticipantId,
        to: Recipient,
        view: u64,
        seq: u64,
        value: String,
    },
}

impl Message {
    /// Gets the sender participant ID for this message
    pub fn from(&self) -> ParticipantId {
        match self {
            Self::Prepare { from, .. }
            | Self::Promise { from, .. }
            | Self::Accept { from, .. }
            | Self::Accepted { from, .. }
            | Self::PrePrepare { from, .. }
            | Self::PrepareVote { from, .. }
            | Self::Commit { from, .. }
            | Self::Reply { from, .. } => *from,
        }
    }

    /// Gets the recipient for this message
    pub fn to(&self) -> Recipient {
        match self {
            Self::Prepare { to, .. }
            | Self::Promise { to, .. }
            | Self::Accept { to, .. }
            | Self::Accepted { to, .. }
            | Self::PrePrepare { to, .. }
            | Self::PrepareVote { to, .. }
            | Self::Commit { to, .. }
            | Self::Reply { to, .. } => *to,
        }
    }

    /// Returns the message type label drawn next to the arrow
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::Prepare { .. } => "PREPARE",
            Self::Promise { .. } => "PROMISE",
            Self::Accept { .. } => "ACCEPT",
            Self::Accepted { .. } => "ACCEPTED",
            Self::PrePrepare { .. } => "PRE-PREPARE",
            Self::PrepareVote { .. } => "PREPARE",
            Self::Commit { .. } => "COMMIT",
            Self::Reply { .. } => "REPLY",
        }
    }

    /// True if the message is addressed to `id`
    pub fn is_for(&self, id: ParticipantId) -> bool {
        self.to() == Recipient::Participant(id)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} → {}", self.message_type(), self.from(), self.to())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        let message = Message::Promise {
            from: 2,
            to: Recipient::Participant(0),
            round: 3,
            prior: Some(PriorAccept {
                round: 1,
                value: "Value-A".to_string(),
            }),
        };
        assert_eq!(message.from(), 2);
        assert_eq!(message.to(), Recipient::Participant(0));
        assert_eq!(message.message_type(), "PROMISE");
        assert!(message.is_for(0));
        assert!(!message.is_for(2));
        assert_eq!(message.to_string(), "PROMISE 2 → 0");
    }

    #[test]
    fn test_reply_goes_to_client() {
        let message = Message::Reply {
            from: 1,
            to: Recipient::Client,
            view: 0,
            seq: 1,
            value: "Transaction-X".to_string(),
        };
        assert!(!message.is_for(1));
        assert_eq!(message.to_string(), "REPLY 1 → client");

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "reply");
        assert_eq!(json["to"]["kind"], "client");
    }
}
