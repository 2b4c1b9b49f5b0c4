use serde::{Deserialize, Serialize};
use vigil_core::Sig;

/// Leader request carrying a candidate block to the agreement engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMsg {
    /// Hex public key of the requesting node
    pub client_id: String,
    /// Unix seconds
    pub timestamp: i64,
    /// Hex of the bincode-encoded block
    pub operation: String,
    pub height: i64,
}

impl RequestMsg {
    /// Height as an unsigned store key. Negative heights never match a stored block.
    pub fn block_height(&self) -> Option<u64> {
        u64::try_from(self.height).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrePrepareMsg {
    pub view_id: i64,
    pub sequence_id: i64,
    pub digest: String,
    pub request: RequestMsg,
}

/// Final decision of the engine on a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteResult {
    Agree,
    Against,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedVoteMsg {
    pub height: i64,
    pub result: VoteResult,
    pub signature: Sig,
}
