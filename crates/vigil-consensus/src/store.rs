use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use vigil_core::Block;

use crate::error::ConsensusError;

/// Candidate blocks in flight for one committee, keyed by height.
///
/// The lock is held for map operations only, never across agent calls.
#[derive(Debug, Default)]
pub struct RoundStore {
    blocks: Mutex<BTreeMap<u64, Block>>,
}

impl RoundStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<u64, Block>> {
        self.blocks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, height: u64) -> Option<Block> {
        self.lock().get(&height).cloned()
    }

    pub fn contains(&self, height: u64) -> bool {
        self.lock().contains_key(&height)
    }

    /// Store a block received from the leader, replacing any candidate at that height
    pub fn put(&self, block: Block) {
        self.lock().insert(block.height(), block);
    }

    /// Store a locally proposed block.
    ///
    /// Rejects a height already pending and, when the store is not empty,
    /// any height other than `last + 1`. Check and insert happen under one lock.
    pub fn insert_next(&self, block: Block) -> Result<(), ConsensusError> {
        let mut blocks = self.lock();
        let height = block.height();

        if blocks.contains_key(&height) {
            return Err(ConsensusError::DuplicateHeight(height));
        }
        if let Some((&last, _)) = blocks.last_key_value() {
            let expected = last
                .checked_add(1)
                .ok_or(ConsensusError::HeightOutOfRange(last))?;
            if height != expected {
                return Err(ConsensusError::HeightDiscontinuity {
                    expected,
                    got: height,
                });
            }
        }

        blocks.insert(height, block);
        Ok(())
    }

    pub fn remove(&self, height: u64) -> Option<Block> {
        self.lock().remove(&height)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn last_height(&self) -> Option<u64> {
        self.lock().keys().next_back().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::{genesis_header, BlockHeader, KeyPair};

    fn block_at(height: u64) -> Block {
        let mut header: BlockHeader = genesis_header(1, 0);
        header.height = height;
        header.proposer = KeyPair::generate().public;
        Block::new(header, vec![vec![height as u8]])
    }

    #[test]
    fn test_insert_next_sequence() {
        let store = RoundStore::new();
        store.insert_next(block_at(11)).unwrap();
        store.insert_next(block_at(12)).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.last_height(), Some(12));
    }

    #[test]
    fn test_insert_next_rejects_duplicate() {
        let store = RoundStore::new();
        store.insert_next(block_at(11)).unwrap();
        let first = store.get(11).unwrap();

        let err = store.insert_next(block_at(11)).unwrap_err();
        assert!(matches!(err, ConsensusError::DuplicateHeight(11)));
        assert_eq!(store.get(11).unwrap(), first);
    }

    #[test]
    fn test_insert_next_rejects_gap() {
        let store = RoundStore::new();
        store.insert_next(block_at(11)).unwrap();

        let err = store.insert_next(block_at(13)).unwrap_err();
        assert!(matches!(
            err,
            ConsensusError::HeightDiscontinuity {
                expected: 12,
                got: 13
            }
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_insert_next_after_max_height() {
        let store = RoundStore::new();
        store.put(block_at(u64::MAX));

        let err = store.insert_next(block_at(1)).unwrap_err();
        assert!(matches!(err, ConsensusError::HeightOutOfRange(u64::MAX)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_put_overwrites() {
        let store = RoundStore::new();
        store.put(block_at(5));
        let replacement = block_at(5);
        store.put(replacement.clone());

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(5).unwrap(), replacement);
    }

    #[test]
    fn test_remove_then_empty_accepts_any_height() {
        let store = RoundStore::new();
        store.insert_next(block_at(11)).unwrap();
        assert!(store.remove(11).is_some());
        assert!(store.is_empty());

        store.insert_next(block_at(40)).unwrap();
        assert!(store.contains(40));
    }
}
