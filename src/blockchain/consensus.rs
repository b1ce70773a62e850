use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::block::Block;
use super::chain::Blockchain;

/// Errors that can occur while fetching a peer's chain
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Peer answered with status {0}")]
    Status(u16),

    #[error("Malformed chain response: {0}")]
    Decode(String),

    #[error("No answer within {0:?}")]
    Timeout(Duration),
}

/// A peer's copy of the chain as served on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerChain {
    pub length: usize,
    pub chain: Vec<Block>,
}

/// Retrieves the chain held by a peer
#[async_trait(?Send)]
pub trait ChainFetcher {
    async fn fetch_chain(&self, node: &str) -> Result<PeerChain, FetchError>;
}

/// Outcome of a consensus round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The local chain was replaced by a longer valid peer chain
    Replaced,
    /// The local chain is authoritative
    Kept,
}

impl Resolution {
    pub fn is_replaced(self) -> bool {
        self == Resolution::Replaced
    }
}

/// Longest-valid-chain consensus against the registered peers
#[derive(Debug, Clone)]
pub struct ConsensusResolver {
    /// Upper bound on each peer fetch
    peer_timeout: Duration,
}

impl ConsensusResolver {
    pub fn new(peer_timeout: Duration) -> Self {
        ConsensusResolver { peer_timeout }
    }

    /// Replaces the local chain with the longest valid chain found among the peers
    ///
    /// Peers are queried concurrently and judged in sorted location order. A candidate must be
    /// strictly longer than the best seen so far and pass validation; among equally long valid
    /// chains the first location in sorted order wins. Peers that fail, time out, or report a
    /// length that does not match their chain are skipped.
    pub async fn resolve_conflicts<F>(&self, blockchain: &Blockchain, fetcher: &F) -> Resolution
    where
        F: ChainFetcher + ?Sized,
    {
        let nodes = blockchain.nodes();
        let local_length = blockchain.len();

        let responses = join_all(nodes.iter().map(|node| self.fetch(fetcher, node))).await;

        let mut max_length = local_length;
        let mut new_chain: Option<(&str, Vec<Block>)> = None;

        for (node, response) in nodes.iter().zip(responses) {
            let peer = match response {
                Ok(peer) => peer,
                Err(err) => {
                    warn!("Skipping node {}: {}", node, err);
                    continue;
                }
            };

            if peer.length != peer.chain.len() {
                warn!(
                    "Skipping node {}: reported length {} but sent {} blocks",
                    node,
                    peer.length,
                    peer.chain.len()
                );
                continue;
            }

            debug!("Node {} holds a chain of length {}", node, peer.length);
            if peer.length > max_length && blockchain.valid_chain(&peer.chain) {
                max_length = peer.length;
                new_chain = Some((node.as_str(), peer.chain));
            }
        }

        let replaced = match new_chain {
            Some((node, chain)) => {
                let replaced = blockchain.replace_chain(chain);
                if replaced {
                    info!(
                        "Replaced local chain of length {} with chain of length {} from {}",
                        local_length, max_length, node
                    );
                }
                replaced
            }
            None => false,
        };

        if replaced {
            Resolution::Replaced
        } else {
            debug!("Local chain of length {} is authoritative", local_length);
            Resolution::Kept
        }
    }

    async fn fetch<F>(&self, fetcher: &F, node: &str) -> Result<PeerChain, FetchError>
    where
        F: ChainFetcher + ?Sized,
    {
        tokio::time::timeout(self.peer_timeout, fetcher.fetch_chain(node))
            .await
            .map_err(|_| FetchError::Timeout(self.peer_timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::pow::mine;
    use crate::blockchain::transaction::{Transaction, NO_DEVICE};
    use std::collections::HashMap;

    enum Reply {
        Chain(PeerChain),
        Fail(FetchError),
        Hang,
    }

    /// In-memory stand-in for the peers
    #[derive(Default)]
    struct StaticFetcher {
        replies: HashMap<String, Reply>,
    }

    impl StaticFetcher {
        fn with_chain(mut self, node: &str, chain: Vec<Block>) -> Self {
            let peer = PeerChain {
                length: chain.len(),
                chain,
            };
            self.replies.insert(node.to_string(), Reply::Chain(peer));
            self
        }

        fn with_reply(mut self, node: &str, reply: Reply) -> Self {
            self.replies.insert(node.to_string(), reply);
            self
        }
    }

    #[async_trait(?Send)]
    impl ChainFetcher for StaticFetcher {
        async fn fetch_chain(&self, node: &str) -> Result<PeerChain, FetchError> {
            match self.replies.get(node) {
                Some(Reply::Chain(peer)) => Ok(peer.clone()),
                Some(Reply::Fail(FetchError::Status(code))) => Err(FetchError::Status(*code)),
                Some(Reply::Fail(err)) => Err(FetchError::Transport(err.to_string())),
                Some(Reply::Hang) => {
                    futures::future::pending::<()>().await;
                    unreachable!()
                }
                None => Err(FetchError::Transport("connection refused".to_string())),
            }
        }
    }

    /// Extends `chain` with `count` mined blocks whose first transaction carries `mac`
    fn extend(mut chain: Vec<Block>, count: usize, mac: &str) -> Vec<Block> {
        for _ in 0..count {
            let last = chain.last().unwrap().clone();
            chain.push(Block::new(
                last.index + 1,
                vec![Transaction::new("A", "B", mac, "join", 1.0)],
                mine(last.proof),
                last.calculate_hash(),
            ));
        }
        chain
    }

    fn resolver() -> ConsensusResolver {
        ConsensusResolver::new(Duration::from_millis(200))
    }

    fn node_with_peers(peers: &[&str]) -> Blockchain {
        let blockchain = Blockchain::new();
        for peer in peers {
            blockchain.register_node(&format!("http://{}", peer)).unwrap();
        }
        blockchain
    }

    #[tokio::test]
    async fn test_adopts_longer_valid_chain() {
        let blockchain = node_with_peers(&["peer-a:5000"]);
        let longer = extend(blockchain.get_chain(), 2, NO_DEVICE);
        let fetcher = StaticFetcher::default().with_chain("peer-a:5000", longer.clone());

        let resolution = resolver().resolve_conflicts(&blockchain, &fetcher).await;

        assert_eq!(resolution, Resolution::Replaced);
        assert_eq!(blockchain.get_chain(), longer);
    }

    #[tokio::test]
    async fn test_keeps_chain_against_equal_length() {
        let blockchain = node_with_peers(&["peer-a:5000"]);
        blockchain.create_block(mine(100), None);
        let local = blockchain.get_chain();

        // Different but equally long fork
        let fork = extend(vec![local[0].clone()], 1, NO_DEVICE);
        let fetcher = StaticFetcher::default().with_chain("peer-a:5000", fork);

        let resolution = resolver().resolve_conflicts(&blockchain, &fetcher).await;

        assert_eq!(resolution, Resolution::Kept);
        assert_eq!(blockchain.get_chain(), local);
    }

    #[tokio::test]
    async fn test_rejects_invalid_longer_chain() {
        let blockchain = node_with_peers(&["peer-a:5000"]);
        let local = blockchain.get_chain();
        let mut forged = extend(local.clone(), 3, NO_DEVICE);
        forged[1].transactions[0].amount = 1000.0;
        let fetcher = StaticFetcher::default().with_chain("peer-a:5000", forged);

        let resolution = resolver().resolve_conflicts(&blockchain, &fetcher).await;

        assert_eq!(resolution, Resolution::Kept);
        assert_eq!(blockchain.get_chain(), local);
    }

    #[tokio::test]
    async fn test_rejects_misreported_length() {
        let blockchain = node_with_peers(&["peer-a:5000"]);
        let local = blockchain.get_chain();
        let fetcher = StaticFetcher::default().with_reply(
            "peer-a:5000",
            Reply::Chain(PeerChain {
                length: 10,
                chain: local.clone(),
            }),
        );

        let resolution = resolver().resolve_conflicts(&blockchain, &fetcher).await;

        assert_eq!(resolution, Resolution::Kept);
        assert_eq!(blockchain.get_chain(), local);
    }

    #[tokio::test]
    async fn test_picks_longest_among_peers() {
        let blockchain = node_with_peers(&["peer-a:5000", "peer-b:5000", "peer-c:5000"]);
        let genesis = blockchain.get_chain();
        let longest = extend(genesis.clone(), 3, NO_DEVICE);
        let fetcher = StaticFetcher::default()
            .with_chain("peer-a:5000", extend(genesis.clone(), 1, NO_DEVICE))
            .with_chain("peer-b:5000", longest.clone())
            .with_chain("peer-c:5000", extend(genesis, 2, NO_DEVICE));

        let resolution = resolver().resolve_conflicts(&blockchain, &fetcher).await;

        assert!(resolution.is_replaced());
        assert_eq!(blockchain.get_chain(), longest);
    }

    #[tokio::test]
    async fn test_tie_goes_to_first_location_in_sorted_order() {
        let blockchain = node_with_peers(&["peer-b:5000", "peer-a:5000"]);
        let genesis = blockchain.get_chain();
        let from_a = extend(genesis.clone(), 2, "aa:aa:aa:aa:aa:aa");
        let from_b = extend(genesis, 2, "bb:bb:bb:bb:bb:bb");
        let fetcher = StaticFetcher::default()
            .with_chain("peer-a:5000", from_a.clone())
            .with_chain("peer-b:5000", from_b);

        resolver().resolve_conflicts(&blockchain, &fetcher).await;

        assert_eq!(blockchain.get_chain(), from_a);
    }

    #[tokio::test]
    async fn test_failing_peers_are_skipped() {
        let blockchain = node_with_peers(&["peer-a:5000", "peer-b:5000", "peer-c:5000", "peer-d:5000"]);
        let longer = extend(blockchain.get_chain(), 1, NO_DEVICE);
        let fetcher = StaticFetcher::default()
            .with_reply("peer-a:5000", Reply::Fail(FetchError::Status(500)))
            .with_reply("peer-b:5000", Reply::Hang)
            .with_chain("peer-c:5000", longer.clone());

        let resolution = resolver().resolve_conflicts(&blockchain, &fetcher).await;

        assert_eq!(resolution, Resolution::Replaced);
        assert_eq!(blockchain.get_chain(), longer);
    }

    #[tokio::test]
    async fn test_no_peers_keeps_chain() {
        let blockchain = Blockchain::new();
        let resolution = resolver()
            .resolve_conflicts(&blockchain, &StaticFetcher::default())
            .await;

        assert_eq!(resolution, Resolution::Kept);
    }

    #[tokio::test]
    async fn test_validating_peer_chain_authorizes_devices() {
        let blockchain = node_with_peers(&["peer-a:5000"]);
        let longer = extend(blockchain.get_chain(), 1, "aa:aa:aa:aa:aa:aa");
        let fetcher = StaticFetcher::default().with_chain("peer-a:5000", longer);

        resolver().resolve_conflicts(&blockchain, &fetcher).await;

        assert_eq!(blockchain.authorized_users(), vec!["aa:aa:aa:aa:aa:aa"]);
    }
}
