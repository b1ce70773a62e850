use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{info, warn};
use thiserror::Error;

use super::authorization::{AuthorizationHook, LoggingAuthorizer};
use super::block::Block;
use super::nodes::{NodeError, NodeRegistry};
use super::pow::{MiningControl, MiningError};
use super::transaction::Transaction;
use super::validation::ChainValidator;

/// Errors that can occur during blockchain operations
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("Node error: {0}")]
    NodeError(#[from] NodeError),

    #[error("Mining error: {0}")]
    MiningError(#[from] MiningError),

    #[error("A block is already being mined")]
    MiningInProgress,

    #[error("Chain tip moved while mining: expected parent {expected}, found {found}")]
    StaleTip { expected: String, found: String },

    #[error("System error: {0}")]
    SystemError(String),
}

/// Chain and pending pool; always locked together
#[derive(Debug)]
struct LedgerState {
    chain: Vec<Block>,
    pending_transactions: Vec<Transaction>,
}

impl LedgerState {
    fn last_block(&self) -> &Block {
        // The genesis block is created with the state and chains are never emptied.
        &self.chain[self.chain.len() - 1]
    }

    /// Moves the pending pool into a new block on top of the chain
    fn append_block(&mut self, proof: u64, previous_hash: String) -> Block {
        let transactions = std::mem::take(&mut self.pending_transactions);
        let block = Block::new(self.chain.len() as u64 + 1, transactions, proof, previous_hash);
        self.chain.push(block.clone());
        block
    }
}

/// Represents the blockchain held by this node
#[derive(Debug)]
pub struct Blockchain {
    /// The chain of blocks and the transactions waiting for the next one
    state: Mutex<LedgerState>,

    /// Known peers
    nodes: Mutex<NodeRegistry>,

    /// Validator owning the registry of authorized devices
    validator: ChainValidator,

    /// Control of the proof search currently running, if any
    mining: Mutex<Option<MiningControl>>,
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

/// Recovers the data behind a poisoned lock; every critical section leaves it consistent
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Blockchain {
    /// Creates a new blockchain with a genesis block, authorizing devices through the log only
    pub fn new() -> Self {
        Self::with_authorizer(Arc::new(LoggingAuthorizer))
    }

    /// Creates a new blockchain with a genesis block and the given authorization hook
    pub fn with_authorizer(hook: Arc<dyn AuthorizationHook>) -> Self {
        Blockchain {
            state: Mutex::new(LedgerState {
                chain: vec![Block::genesis()],
                pending_transactions: Vec::new(),
            }),
            nodes: Mutex::new(NodeRegistry::new()),
            validator: ChainValidator::new(hook),
            mining: Mutex::new(None),
        }
    }

    /// Gets the last block in the chain
    pub fn get_last_block(&self) -> Block {
        lock(&self.state).last_block().clone()
    }

    /// Number of blocks in the chain
    pub fn len(&self) -> usize {
        lock(&self.state).chain.len()
    }

    /// Adds a new transaction to the pending transactions
    ///
    /// # Returns
    ///
    /// The index of the block that will include this transaction
    pub fn add_transaction(&self, transaction: Transaction) -> u64 {
        let mut state = lock(&self.state);
        state.pending_transactions.push(transaction);
        state.chain.len() as u64 + 1
    }

    /// Creates a new block holding every pending transaction and appends it
    ///
    /// # Arguments
    ///
    /// * `proof` - The proof found for the current tip
    /// * `previous_hash` - Hash to link to; defaults to the hash of the current tip
    pub fn create_block(&self, proof: u64, previous_hash: Option<String>) -> Block {
        let mut state = lock(&self.state);
        let previous_hash =
            previous_hash.unwrap_or_else(|| state.last_block().calculate_hash());
        let block = state.append_block(proof, previous_hash);

        info!(
            "Created block {} with {} transactions",
            block.index,
            block.transactions.len()
        );
        block
    }

    /// Appends a block for a proof that was searched against the block hashing to `parent_hash`
    ///
    /// `reward` joins the pending transactions in the same critical section. Fails with
    /// [`BlockchainError::StaleTip`], leaving pool and chain untouched, when the tip is no longer
    /// that block.
    pub fn commit_mined_block(
        &self,
        proof: u64,
        parent_hash: &str,
        reward: Transaction,
    ) -> Result<Block, BlockchainError> {
        let mut state = lock(&self.state);
        let tip_hash = state.last_block().calculate_hash();
        if tip_hash != parent_hash {
            return Err(BlockchainError::StaleTip {
                expected: parent_hash.to_string(),
                found: tip_hash,
            });
        }

        state.pending_transactions.push(reward);
        let block = state.append_block(proof, tip_hash);

        info!(
            "Mined block {} (proof={}, transactions={})",
            block.index,
            block.proof,
            block.transactions.len()
        );
        Ok(block)
    }

    /// Gets the entire blockchain
    pub fn get_chain(&self) -> Vec<Block> {
        lock(&self.state).chain.clone()
    }

    /// Gets all pending transactions
    pub fn get_pending_transactions(&self) -> Vec<Transaction> {
        lock(&self.state).pending_transactions.clone()
    }

    /// Validates a chain, authorizing any device it reveals
    pub fn valid_chain(&self, chain: &[Block]) -> bool {
        self.validator.is_valid(chain)
    }

    /// Validates this node's own chain
    pub fn is_valid(&self) -> bool {
        let chain = self.get_chain();
        self.valid_chain(&chain)
    }

    /// Device identifiers authorized so far
    pub fn authorized_users(&self) -> Vec<String> {
        self.validator.authorized_users()
    }

    /// Replaces the chain if `candidate` is longer than the chain held right now
    ///
    /// The pending pool is kept. Any running proof search is cancelled since its tip is gone.
    pub(crate) fn replace_chain(&self, candidate: Vec<Block>) -> bool {
        {
            let mut state = lock(&self.state);
            if candidate.len() <= state.chain.len() {
                warn!(
                    "Discarding candidate chain of length {}: local chain grew to {}",
                    candidate.len(),
                    state.chain.len()
                );
                return false;
            }
            state.chain = candidate;
        }

        self.cancel_mining();
        true
    }

    /// Adds a node to the list of peers
    ///
    /// # Returns
    ///
    /// The canonical `host:port` that was registered
    pub fn register_node(&self, address: &str) -> Result<String, BlockchainError> {
        let location = lock(&self.nodes).register(address)?;
        info!("Registered node {}", location);
        Ok(location)
    }

    /// Removes a node from the list of peers; unknown nodes are an error
    pub fn remove_node(&self, address: &str) -> Result<String, BlockchainError> {
        let location = lock(&self.nodes).remove(address)?;
        info!("Removed node {}", location);
        Ok(location)
    }

    /// Known peers in sorted order
    pub fn nodes(&self) -> Vec<String> {
        lock(&self.nodes).locations()
    }

    /// Claims the single mining slot
    ///
    /// The returned session releases the slot, and cancels its search, when dropped.
    pub fn begin_mining(
        &self,
        control: MiningControl,
    ) -> Result<MiningSession<'_>, BlockchainError> {
        let mut slot = lock(&self.mining);
        if slot.is_some() {
            return Err(BlockchainError::MiningInProgress);
        }
        *slot = Some(control.clone());

        Ok(MiningSession {
            blockchain: self,
            control,
        })
    }

    /// Cancels the running proof search, if any
    ///
    /// # Returns
    ///
    /// Whether a search was running
    pub fn cancel_mining(&self) -> bool {
        match lock(&self.mining).as_ref() {
            Some(control) => {
                control.cancel();
                info!("Cancelled in-flight mining");
                true
            }
            None => false,
        }
    }

    pub fn is_mining(&self) -> bool {
        lock(&self.mining).is_some()
    }
}

/// Exclusive right to run a proof search on a [`Blockchain`]
#[derive(Debug)]
pub struct MiningSession<'a> {
    blockchain: &'a Blockchain,
    control: MiningControl,
}

impl MiningSession<'_> {
    pub fn control(&self) -> &MiningControl {
        &self.control
    }
}

impl Drop for MiningSession<'_> {
    fn drop(&mut self) {
        self.control.cancel();
        lock(&self.blockchain.mining).take();
    }
}
