//! Commitments over the eligible pool of a draw.
//!
//! Every draw is equal-weight: after sorting the pool by address, holder `i`
//! owns the ticket range `[i, i + 1)`. The merkle root over those ranges is
//! logged and stored with the draw so anyone holding the same snapshot can
//! check that a winner was part of the pool the draw was made from.

use sha2::{Digest, Sha256};

use crate::types::Holder;

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// `leaf_hash = sha256( 0x00 || address_bytes || ticket_start_u64_be || ticket_end_u64_be )`
///
/// The address is hashed as its base58 string bytes.
pub fn compute_leaf_hash(address: &str, ticket_start: u64, ticket_end: u64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update(address.as_bytes());
    hasher.update(ticket_start.to_be_bytes());
    hasher.update(ticket_end.to_be_bytes());
    hasher.finalize().into()
}

/// Sorted-pair internal node: smaller hash first, prefixed with 0x01.
fn hash_pair(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([NODE_PREFIX]);
    if a <= b {
        hasher.update(a);
        hasher.update(b);
    } else {
        hasher.update(b);
        hasher.update(a);
    }
    hasher.finalize().into()
}

/// Odd trailing nodes are promoted to the next level unchanged.
fn next_level(level: &[[u8; 32]]) -> Vec<[u8; 32]> {
    level
        .chunks(2)
        .map(|pair| match pair {
            [a, b] => hash_pair(a, b),
            _ => pair[0],
        })
        .collect()
}

/// Leaves for an equal-weight pool, in address order.
pub fn snapshot_leaves(holders: &[Holder]) -> Vec<[u8; 32]> {
    let mut addresses: Vec<&str> = holders.iter().map(|h| h.address.as_str()).collect();
    addresses.sort_unstable();
    addresses
        .iter()
        .enumerate()
        .map(|(i, address)| compute_leaf_hash(address, i as u64, i as u64 + 1))
        .collect()
}

pub fn build_merkle_root(leaves: &[[u8; 32]]) -> Option<[u8; 32]> {
    if leaves.is_empty() {
        return None;
    }
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = next_level(&level);
    }
    Some(level[0])
}

/// Sibling path for the leaf at `index`, bottom-up.
pub fn merkle_proof(leaves: &[[u8; 32]], index: usize) -> Option<Vec<[u8; 32]>> {
    if index >= leaves.len() {
        return None;
    }

    let mut proof = Vec::new();
    let mut level = leaves.to_vec();
    let mut position = index;
    while level.len() > 1 {
        let sibling = position ^ 1;
        if sibling < level.len() {
            proof.push(level[sibling]);
        }
        level = next_level(&level);
        position /= 2;
    }
    Some(proof)
}

/// Verify a hex-encoded proof against a hex-encoded root.
pub fn verify_merkle_proof(root_hex: &str, proof_hex: &[String], leaf_hash: &[u8; 32]) -> bool {
    let Ok(expected_root) = hex::decode(root_hex) else {
        return false;
    };
    if expected_root.len() != 32 {
        return false;
    }

    let mut current = *leaf_hash;
    for sibling_hex in proof_hex {
        let sibling: [u8; 32] = match hex::decode(sibling_hex).map(<[u8; 32]>::try_from) {
            Ok(Ok(bytes)) => bytes,
            _ => return false,
        };
        current = hash_pair(&current, &sibling);
    }

    current.as_slice() == expected_root.as_slice()
}

/// Hex root of the equal-weight commitment over `holders`, independent of
/// input order. `None` for an empty pool.
pub fn snapshot_root(holders: &[Holder]) -> Option<String> {
    build_merkle_root(&snapshot_leaves(holders)).map(hex::encode)
}
