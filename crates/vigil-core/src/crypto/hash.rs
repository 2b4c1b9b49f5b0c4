use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;
use crate::serialize;

/// A 32-byte Blake3 hash
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    pub const ZERO: Hash = Hash([0u8; 32]);

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::Deserialization("hash must be 32 bytes".to_string()))?;
        Ok(Hash(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Compute Blake3 hash of data
pub fn hash_blake3(data: &[u8]) -> Hash {
    Hash(*blake3::hash(data).as_bytes())
}

/// Hash the canonical bincode encoding of a value.
///
/// Used for block header hashes and vote digests, so the same tuple always
/// produces the same digest on every replica.
pub fn hash_encoded<T: Serialize>(value: &T) -> Result<Hash, CoreError> {
    let bytes = serialize::to_bytes(value)?;
    Ok(hash_blake3(&bytes))
}

/// Compute merkle root from a list of hashes.
/// An odd node at any level is paired with itself.
pub fn merkle_root(hashes: &[Hash]) -> Hash {
    if hashes.is_empty() {
        return Hash::ZERO;
    }

    let mut level: Vec<Hash> = hashes.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let right = pair.get(1).unwrap_or(&pair[0]);
                let mut data = [0u8; 64];
                data[..32].copy_from_slice(&pair[0].0);
                data[32..].copy_from_slice(&right.0);
                hash_blake3(&data)
            })
            .collect();
    }

    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_encoded_matches_manual() {
        let tuple = (Hash::ZERO, 7u64);
        let manual = hash_blake3(&serialize::to_bytes(&tuple).unwrap());
        assert_eq!(hash_encoded(&tuple).unwrap(), manual);
    }

    #[test]
    fn test_merkle_root_edges() {
        assert_eq!(merkle_root(&[]), Hash::ZERO);

        let single = hash_blake3(b"single");
        assert_eq!(merkle_root(&[single]), single);

        let three: Vec<Hash> = (0..3u8).map(|i| hash_blake3(&[i])).collect();
        let mut four = three.clone();
        four.push(three[2]);
        // Odd leaf is duplicated
        assert_eq!(merkle_root(&three), merkle_root(&four));
    }

    #[test]
    fn test_hash_hex_rejects_short_input() {
        assert!(Hash::from_hex("abcd").is_err());
        let hash = hash_blake3(b"vigil");
        assert_eq!(Hash::from_hex(&hash.to_hex()).unwrap(), hash);
    }
}
