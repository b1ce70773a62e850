use std::collections::BTreeSet;

use actix_web::http::Uri;
use thiserror::Error;

/// Errors that can occur while maintaining the set of peers
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NodeError {
    #[error("Invalid node address: {0}")]
    InvalidAddress(String),

    #[error("Node not found: {0}")]
    NotFound(String),
}

/// Reduces a URL-shaped address to its `host:port` network location
///
/// Scheme, credentials, path and query are dropped and the host is lower-cased, so
/// `http://Peer:5000/chain` and `peer:5000` name the same node.
pub fn canonical_location(address: &str) -> Result<String, NodeError> {
    let invalid = || NodeError::InvalidAddress(address.to_string());

    let uri: Uri = address.trim().parse().map_err(|_| invalid())?;
    let authority = uri.authority().ok_or_else(invalid)?;

    let host = authority.host().to_ascii_lowercase();
    if host.is_empty() {
        return Err(invalid());
    }

    Ok(match authority.port_u16() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}

/// Set of known peers, kept sorted so every pass over it visits them in the same order
#[derive(Debug, Default, Clone)]
pub struct NodeRegistry {
    nodes: BTreeSet<String>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node; registering an already known location is a no-op
    ///
    /// # Returns
    ///
    /// The canonical location that was registered
    pub fn register(&mut self, address: &str) -> Result<String, NodeError> {
        let location = canonical_location(address)?;
        self.nodes.insert(location.clone());
        Ok(location)
    }

    /// Removes a node, failing with [`NodeError::NotFound`] when it is not known
    pub fn remove(&mut self, address: &str) -> Result<String, NodeError> {
        let location = canonical_location(address)?;
        if self.nodes.remove(&location) {
            Ok(location)
        } else {
            Err(NodeError::NotFound(location))
        }
    }

    pub fn contains(&self, address: &str) -> bool {
        canonical_location(address)
            .map(|location| self.nodes.contains(&location))
            .unwrap_or(false)
    }

    /// Known locations in sorted order
    pub fn locations(&self) -> Vec<String> {
        self.nodes.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
