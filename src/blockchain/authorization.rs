use log::info;
use thiserror::Error;

/// Errors reported by an authorization hook
#[derive(Debug, Error)]
pub enum AuthorizationError {
    #[error("Device {0} was rejected: {1}")]
    Rejected(String, String),

    #[error("Authorization backend unavailable: {0}")]
    Unavailable(String),
}

/// Side effect run when validation reveals a device identifier not seen before
///
/// Implementations grant the device access outside the ledger (e.g. install a firewall
/// rule). The ledger never retries a failed call and never lets it change a validation result.
pub trait AuthorizationHook: Send + Sync {
    fn authorize_device(&self, mac: &str) -> Result<(), AuthorizationError>;
}

/// Hook that only records the event in the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingAuthorizer;

impl AuthorizationHook for LoggingAuthorizer {
    fn authorize_device(&self, mac: &str) -> Result<(), AuthorizationError> {
        info!("Authorizing new device {}", mac);
        Ok(())
    }
}
