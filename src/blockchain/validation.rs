use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info, warn};

use super::authorization::AuthorizationHook;
use super::block::Block;
use super::pow::valid_proof;

/// Checks chain linkage and proofs, and authorizes devices revealed along the way
///
/// Owns the registry of authorized device identifiers; entries are only ever added.
pub struct ChainValidator {
    users: Mutex<BTreeSet<String>>,
    hook: Arc<dyn AuthorizationHook>,
}

impl std::fmt::Debug for ChainValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainValidator")
            .field("users", &self.users)
            .finish()
    }
}

impl ChainValidator {
    pub fn new(hook: Arc<dyn AuthorizationHook>) -> Self {
        ChainValidator {
            users: Mutex::new(BTreeSet::new()),
            hook,
        }
    }

    /// Determines whether a chain is valid
    ///
    /// Each block must reference the hash of its predecessor and carry a proof that is valid
    /// against the predecessor's proof. An empty chain is invalid.
    ///
    /// For every block that passes, the first transaction carrying a device identifier is
    /// checked against the registry, and an unseen identifier is registered and handed to the
    /// authorization hook. Later devices in the same block are not looked at.
    pub fn is_valid(&self, chain: &[Block]) -> bool {
        let Some(mut last_block) = chain.first() else {
            debug!("Rejecting empty chain");
            return false;
        };

        for block in &chain[1..] {
            if block.previous_hash != last_block.calculate_hash() {
                debug!("Block {} does not link to block {}", block.index, last_block.index);
                return false;
            }

            if !valid_proof(last_block.proof, block.proof) {
                debug!("Block {} carries an invalid proof", block.index);
                return false;
            }

            self.observe_device(block);
            last_block = block;
        }

        true
    }

    /// Snapshot of the authorized device identifiers
    pub fn authorized_users(&self) -> Vec<String> {
        self.lock_users().iter().cloned().collect()
    }

    pub fn is_authorized(&self, mac: &str) -> bool {
        self.lock_users().contains(mac)
    }

    fn observe_device(&self, block: &Block) {
        // A block without any device is not an event.
        let Some(mac) = block.transactions.iter().find_map(|tx| tx.device()) else {
            return;
        };

        if !self.lock_users().insert(mac.to_string()) {
            return;
        }

        info!("Block {} revealed new device {}", block.index, mac);
        if let Err(err) = self.hook.authorize_device(mac) {
            warn!("Failed to authorize device {}: {}", mac, err);
        }
    }

    fn lock_users(&self) -> std::sync::MutexGuard<'_, BTreeSet<String>> {
        self.users.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::authorization::AuthorizationError;
    use crate::blockchain::pow::mine;
    use crate::blockchain::transaction::{Transaction, NO_DEVICE};

    /// Hook that records every call and optionally fails
    #[derive(Default)]
    struct RecordingHook {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl AuthorizationHook for RecordingHook {
        fn authorize_device(&self, mac: &str) -> Result<(), AuthorizationError> {
            self.calls.lock().unwrap().push(mac.to_string());
            if self.fail {
                Err(AuthorizationError::Unavailable("firewall offline".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn build_chain(blocks: Vec<Vec<Transaction>>) -> Vec<Block> {
        let mut chain = vec![Block::genesis()];
        for transactions in blocks {
            let last = chain.last().unwrap();
            let block = Block::new(
                last.index + 1,
                transactions,
                mine(last.proof),
                last.calculate_hash(),
            );
            chain.push(block);
        }
        chain
    }

    fn device_tx(mac: &str) -> Transaction {
        Transaction::new("A", "B", mac, "join", 1.0)
    }

    #[test]
    fn test_valid_chain() {
        let validator = ChainValidator::new(Arc::new(RecordingHook::default()));
        let chain = build_chain(vec![vec![device_tx(NO_DEVICE)], vec![]]);

        assert!(validator.is_valid(&chain));
        assert!(validator.is_valid(&chain[..1]));
        assert!(!validator.is_valid(&[]));
    }

    #[test]
    fn test_tampering_any_field_invalidates() {
        let validator = ChainValidator::new(Arc::new(RecordingHook::default()));
        let chain = build_chain(vec![
            vec![device_tx(NO_DEVICE)],
            vec![device_tx(NO_DEVICE)],
            vec![],
        ]);
        assert!(validator.is_valid(&chain));

        let tamperings: [fn(&mut Block); 6] = [
            |b: &mut Block| b.index += 10,
            |b: &mut Block| b.timestamp = b.timestamp + chrono::Duration::seconds(1),
            |b: &mut Block| b.proof += 1,
            |b: &mut Block| b.previous_hash = "forged".to_string(),
            |b: &mut Block| {
                b.transactions
                    .push(Transaction::new("X", "Y", NO_DEVICE, "join", 9.0))
            },
            |b: &mut Block| b.transactions.clear(),
        ];

        // Every block but the tip has a successor whose link must break
        for position in 0..chain.len() - 1 {
            for tamper in &tamperings {
                let mut forged = chain.clone();
                tamper(&mut forged[position]);
                if forged[position] == chain[position] {
                    continue;
                }
                assert!(
                    !validator.is_valid(&forged),
                    "tampering block {} went unnoticed",
                    position
                );
            }
        }
    }

    #[test]
    fn test_invalid_proof_rejected() {
        let validator = ChainValidator::new(Arc::new(RecordingHook::default()));
        let genesis = Block::genesis();
        let bad_proof = (0..).find(|p| !valid_proof(genesis.proof, *p)).unwrap();
        let block = Block::new(2, vec![], bad_proof, genesis.calculate_hash());

        assert!(!validator.is_valid(&[genesis, block]));
    }

    #[test]
    fn test_only_first_device_per_block_is_authorized() {
        let hook = Arc::new(RecordingHook::default());
        let validator = ChainValidator::new(hook.clone());
        let chain = build_chain(vec![vec![
            device_tx(NO_DEVICE),
            device_tx("aa:aa:aa:aa:aa:aa"),
            device_tx("bb:bb:bb:bb:bb:bb"),
        ]]);

        assert!(validator.is_valid(&chain));
        assert_eq!(*hook.calls.lock().unwrap(), vec!["aa:aa:aa:aa:aa:aa"]);
        assert!(validator.is_authorized("aa:aa:aa:aa:aa:aa"));
        assert!(!validator.is_authorized("bb:bb:bb:bb:bb:bb"));
    }

    #[test]
    fn test_known_device_not_authorized_twice() {
        let hook = Arc::new(RecordingHook::default());
        let validator = ChainValidator::new(hook.clone());
        let chain = build_chain(vec![
            vec![device_tx("aa:aa:aa:aa:aa:aa")],
            vec![device_tx("aa:aa:aa:aa:aa:aa")],
        ]);

        assert!(validator.is_valid(&chain));
        assert!(validator.is_valid(&chain));
        assert_eq!(hook.calls.lock().unwrap().len(), 1);
        assert_eq!(validator.authorized_users(), vec!["aa:aa:aa:aa:aa:aa"]);
    }

    #[test]
    fn test_block_without_device_is_not_an_error() {
        let hook = Arc::new(RecordingHook::default());
        let validator = ChainValidator::new(hook.clone());
        let chain = build_chain(vec![vec![device_tx(NO_DEVICE), device_tx(NO_DEVICE)], vec![]]);

        assert!(validator.is_valid(&chain));
        assert!(hook.calls.lock().unwrap().is_empty());
        assert!(validator.authorized_users().is_empty());
    }

    #[test]
    fn test_hook_failure_does_not_change_result() {
        let hook = Arc::new(RecordingHook {
            fail: true,
            ..Default::default()
        });
        let validator = ChainValidator::new(hook.clone());
        let chain = build_chain(vec![vec![device_tx("cc:cc:cc:cc:cc:cc")]]);

        assert!(validator.is_valid(&chain));
        assert_eq!(hook.calls.lock().unwrap().len(), 1);
        // Registration stands even though the side effect failed
        assert!(validator.is_authorized("cc:cc:cc:cc:cc:cc"));
    }
}
