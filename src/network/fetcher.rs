use std::time::Duration;

use async_trait::async_trait;
use log::debug;

use crate::blockchain::consensus::{ChainFetcher, FetchError, PeerChain};

/// Path under which every node serves its chain
pub const CHAIN_PATH: &str = "/api/v1/chain";

/// Largest chain response accepted from a peer
const MAX_CHAIN_BYTES: usize = 64 * 1024 * 1024;

/// Fetches peer chains over HTTP with the actix client
#[derive(Debug, Clone)]
pub struct HttpChainFetcher {
    timeout: Duration,
}

impl HttpChainFetcher {
    pub fn new(timeout: Duration) -> Self {
        HttpChainFetcher { timeout }
    }

    /// URL of the chain endpoint of the node at `location` (`host:port`)
    pub fn chain_url(location: &str) -> String {
        format!("http://{}{}", location, CHAIN_PATH)
    }
}

#[async_trait(?Send)]
impl ChainFetcher for HttpChainFetcher {
    async fn fetch_chain(&self, node: &str) -> Result<PeerChain, FetchError> {
        let url = Self::chain_url(node);
        debug!("Fetching chain from {}", url);

        let client = awc::Client::builder().timeout(self.timeout).finish();
        let mut response = client
            .get(&url)
            .send()
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        response
            .json::<PeerChain>()
            .limit(MAX_CHAIN_BYTES)
            .await
            .map_err(|err| FetchError::Decode(err.to_string()))
    }
}
