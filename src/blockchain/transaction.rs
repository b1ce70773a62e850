use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Value of the `mac` field meaning "no device associated with this transaction"
pub const NO_DEVICE: &str = "null";

/// Sender used for the reward transaction appended by the miner
pub const REWARD_SENDER: &str = "0";

/// Represents a transaction in the blockchain
///
/// Field contents are not validated: the ledger records whatever it was given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Sender's address
    pub sender: String,

    /// Recipient's address
    pub recipient: String,

    /// Identifier of the device this transaction concerns, or `"null"`
    #[schema(example = "aa:bb:cc:dd:ee:ff")]
    pub mac: String,

    /// Free-form action label (e.g. `join`, `leave`, `reward`)
    pub action: String,

    /// Amount being transferred
    pub amount: f64,
}

impl Transaction {
    /// Creates a new transaction
    ///
    /// # Arguments
    ///
    /// * `sender` - The address of the sender
    /// * `recipient` - The address of the recipient
    /// * `mac` - The device identifier, or [`NO_DEVICE`]
    /// * `action` - The action label
    /// * `amount` - The amount to transfer
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        mac: impl Into<String>,
        action: impl Into<String>,
        amount: f64,
    ) -> Self {
        Transaction {
            sender: sender.into(),
            recipient: recipient.into(),
            mac: mac.into(),
            action: action.into(),
            amount,
        }
    }

    /// Creates the reward transaction granted to the node that mined a block
    pub fn new_reward(recipient: impl Into<String>, amount: f64) -> Self {
        Transaction::new(REWARD_SENDER, recipient, NO_DEVICE, "reward", amount)
    }

    /// Returns the device identifier carried by this transaction, if any
    pub fn device(&self) -> Option<&str> {
        if self.mac == NO_DEVICE {
            None
        } else {
            Some(&self.mac)
        }
    }
}
