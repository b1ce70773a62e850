// Blockchain module
//
// This module contains the ledger implementation including:
// - Block and transaction structures
// - The chain with its pending pool
// - Proof of work and the miner
// - Chain validation and device authorization
// - Peer registry and consensus

pub mod authorization;
pub mod block;
pub mod chain;
pub mod consensus;
pub mod miner;
pub mod nodes;
pub mod pow;
pub mod transaction;
pub mod validation;

// Re-export main components for easier access
pub use block::Block;
pub use chain::{Blockchain, BlockchainError};
pub use consensus::ConsensusResolver;
pub use miner::Miner;
pub use nodes::NodeError;
pub use pow::MiningError;
pub use transaction::Transaction;
