use serde::{Deserialize, Serialize};

use crate::crypto::{hash_blake3, hash_encoded, merkle_root, Hash, PublicKey};
use crate::error::CoreError;

/// Block header containing metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Chain identifier
    pub chain_id: u64,
    /// Block height (0 for genesis)
    pub height: u64,
    /// Hash of the parent block header
    pub parent_hash: Hash,
    /// Unix timestamp in seconds
    pub timestamp: u64,
    /// Merkle root of the payload items
    pub payload_root: Hash,
    /// Proposer's public key
    pub proposer: PublicKey,
}

impl BlockHeader {
    pub fn hash(&self) -> Result<Hash, CoreError> {
        hash_encoded(self)
    }
}

/// A candidate block as seen by the round coordinator.
///
/// The payload is opaque here; executing it is the agent's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub payload: Vec<Vec<u8>>,
}

impl Block {
    pub fn new(header: BlockHeader, payload: Vec<Vec<u8>>) -> Self {
        Block { header, payload }
    }

    /// Build a child of `parent` carrying `payload`, with the payload root filled in
    pub fn child_of(
        parent: &BlockHeader,
        proposer: PublicKey,
        timestamp: u64,
        payload: Vec<Vec<u8>>,
    ) -> Result<Self, CoreError> {
        let header = BlockHeader {
            chain_id: parent.chain_id,
            height: parent.height + 1,
            parent_hash: parent.hash()?,
            timestamp,
            payload_root: Self::payload_root_of(&payload),
            proposer,
        };
        Ok(Block::new(header, payload))
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    /// Compute the block hash (hash of header)
    pub fn hash(&self) -> Result<Hash, CoreError> {
        self.header.hash()
    }

    pub fn verify_payload_root(&self) -> bool {
        Self::payload_root_of(&self.payload) == self.header.payload_root
    }

    fn payload_root_of(payload: &[Vec<u8>]) -> Hash {
        let leaves: Vec<Hash> = payload.iter().map(|item| hash_blake3(item)).collect();
        merkle_root(&leaves)
    }
}

/// Header of the chain's first block
pub fn genesis_header(chain_id: u64, timestamp: u64) -> BlockHeader {
    BlockHeader {
        chain_id,
        height: 0,
        parent_hash: Hash::ZERO,
        timestamp,
        payload_root: Hash::ZERO,
        proposer: PublicKey::default(),
    }
}
