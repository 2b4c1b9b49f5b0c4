use serde::{Deserialize, Serialize};

use crate::crypto::PublicKey;
use crate::types::validator::{NodeEndpoint, NodeId};

/// Numeric committee identifier. Zero is reserved as "any retiring committee".
pub type CommitteeId = u64;

/// A member as elected into a committee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitteeMember {
    pub coinbase: PublicKey,
    pub public_key: PublicKey,
}

/// A committee member together with its transport endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitteeNode {
    pub coinbase: PublicKey,
    pub public_key: PublicKey,
    pub ip: String,
    pub port: u16,
}

impl CommitteeNode {
    /// A member with no endpoint known yet
    pub fn from_member(member: &CommitteeMember) -> Self {
        CommitteeNode {
            coinbase: member.coinbase,
            public_key: member.public_key,
            ip: String::new(),
            port: 0,
        }
    }

    pub fn has_endpoint(&self) -> bool {
        !self.ip.is_empty()
    }

    /// Endpoint keyed by hex public key, if one is known
    pub fn endpoint(&self) -> Option<NodeEndpoint> {
        self.has_endpoint().then(|| {
            NodeEndpoint::new(NodeId::new(self.public_key.to_hex()), &self.ip, self.port)
        })
    }
}

/// The committee as handed over by election
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitteeInfo {
    pub id: CommitteeId,
    pub members: Vec<CommitteeMember>,
}
