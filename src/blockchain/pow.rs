use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Required prefix of a valid proof digest (fixed difficulty)
pub const DIFFICULTY_PREFIX: &str = "0000";

/// Number of attempts between two checks of the mining control
const CHECK_INTERVAL: u64 = 1024;

/// Errors that can occur while searching for a proof
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MiningError {
    #[error("Mining was cancelled after {attempts} attempts")]
    Cancelled { attempts: u64 },

    #[error("Mining deadline exceeded after {attempts} attempts")]
    DeadlineExceeded { attempts: u64 },

    #[error("Proof space exhausted")]
    Exhausted,
}

/// Stop signal shared between a running proof search and whoever may abort it
#[derive(Debug, Clone, Default)]
pub struct MiningControl {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl MiningControl {
    /// A control with no deadline that only stops on [`MiningControl::cancel`]
    pub fn new() -> Self {
        Self::default()
    }

    /// A control that also stops once `timeout` has elapsed from now
    pub fn with_timeout(timeout: Duration) -> Self {
        MiningControl {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Signals every clone of this control to stop
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn check(&self, attempts: u64) -> Result<(), MiningError> {
        if self.is_cancelled() {
            return Err(MiningError::Cancelled { attempts });
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Err(MiningError::DeadlineExceeded { attempts })
            }
            _ => Ok(()),
        }
    }
}

/// Validates a proof: does SHA-256 of `"{last_proof}{proof}"` start with four zeroes?
pub fn valid_proof(last_proof: u64, proof: u64) -> bool {
    let guess = format!("{}{}", last_proof, proof);
    let digest = hex::encode(Sha256::digest(guess.as_bytes()));
    digest.starts_with(DIFFICULTY_PREFIX)
}

/// Finds the smallest proof for `last_proof`, with no way to stop the search
pub fn mine(last_proof: u64) -> u64 {
    let mut proof = 0;
    while !valid_proof(last_proof, proof) {
        proof += 1;
    }
    proof
}

/// Finds the smallest proof for `last_proof`, stopping early when `control` says so
///
/// The search is sequential from 0, so whenever it completes the result is the same as
/// [`mine`]. Stopping touches nothing but the search itself.
pub fn mine_with(last_proof: u64, control: &MiningControl) -> Result<u64, MiningError> {
    let mut proof: u64 = 0;
    loop {
        if proof % CHECK_INTERVAL == 0 {
            control.check(proof)?;
        }
        if valid_proof(last_proof, proof) {
            return Ok(proof);
        }
        proof = proof.checked_add(1).ok_or(MiningError::Exhausted)?;
    }
}
