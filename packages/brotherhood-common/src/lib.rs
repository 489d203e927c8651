pub mod merkle;
pub mod types;

pub use merkle::{
    build_merkle_root, compute_leaf_hash, merkle_proof, snapshot_root, verify_merkle_proof,
};
pub use types::{lamports_to_sol, sol_to_lamports, Holder, LAMPORTS_PER_SOL};
