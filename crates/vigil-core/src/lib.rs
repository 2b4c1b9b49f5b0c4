//! Vigil Core - Shared types, cryptography, and serialization
//!
//! This crate provides the keys, blocks, committee descriptions and
//! switch payloads shared by the health manager and the round coordinator.

pub mod crypto;
pub mod error;
pub mod serialize;
pub mod types;

pub use crypto::{
    hash_blake3, hash_encoded, merkle_root, sign, verify, Address, Hash, KeyPair, PublicKey,
    SecretKey, Sig,
};
pub use error::CoreError;
pub use types::*;
