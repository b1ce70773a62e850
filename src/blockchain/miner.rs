use std::time::Duration;

use log::{info, warn};

use super::block::Block;
use super::chain::{Blockchain, BlockchainError};
use super::pow::{mine_with, MiningControl};
use super::transaction::Transaction;

/// Amount granted to the node that mines a block
pub const MINING_REWARD: f64 = 1.0;

/// Mines blocks on behalf of this node
#[derive(Debug, Clone)]
pub struct Miner {
    /// Recipient of the mining reward (this node's identifier)
    reward_recipient: String,

    /// Longest a single proof search may run
    deadline: Option<Duration>,
}

impl Miner {
    pub fn new(reward_recipient: impl Into<String>, deadline: Option<Duration>) -> Self {
        Miner {
            reward_recipient: reward_recipient.into(),
            deadline,
        }
    }

    /// Searches a proof for the current tip off the async runtime, then appends a block
    /// with the pending transactions and the mining reward
    ///
    /// The search can be stopped through [`Blockchain::cancel_mining`] or the deadline. If the
    /// tip changes while searching, the proof is discarded with [`BlockchainError::StaleTip`].
    pub async fn mine_block(&self, blockchain: &Blockchain) -> Result<Block, BlockchainError> {
        let control = match self.deadline {
            Some(deadline) => MiningControl::with_timeout(deadline),
            None => MiningControl::new(),
        };
        let session = blockchain.begin_mining(control)?;

        let last_block = blockchain.get_last_block();
        let parent_hash = last_block.calculate_hash();
        let last_proof = last_block.proof;
        info!("Mining on top of block {} (last proof {})", last_block.index, last_proof);

        let search_control = session.control().clone();
        let proof = tokio::task::spawn_blocking(move || mine_with(last_proof, &search_control))
            .await
            .map_err(|err| BlockchainError::SystemError(err.to_string()))?
            .map_err(|err| {
                warn!("Proof search stopped: {}", err);
                BlockchainError::from(err)
            })?;
        drop(session);

        let reward = Transaction::new_reward(self.reward_recipient.clone(), MINING_REWARD);
        blockchain.commit_mined_block(proof, &parent_hash, reward)
    }
}
