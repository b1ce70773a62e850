use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blockchain::consensus::ChainFetcher;
use crate::blockchain::{
    Block, Blockchain, BlockchainError, ConsensusResolver, Miner, MiningError, NodeError,
    Transaction,
};

/// Data structure for the blockchain state
pub type BlockchainData = web::Data<Blockchain>;

/// Transport used to reach peers during conflict resolution
pub type FetcherData = web::Data<dyn ChainFetcher + Send + Sync>;

/// Response for the chain endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ChainResponse {
    /// The length of the chain
    pub length: usize,

    /// The blocks in the chain
    pub chain: Vec<Block>,
}

/// Request for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionRequest {
    /// The sender's address
    pub sender: String,

    /// The recipient's address
    pub recipient: String,

    /// The device identifier, or "null"
    pub mac: String,

    /// The action label
    pub action: String,

    /// The amount to transfer
    pub amount: f64,
}

/// Response for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    /// The message
    pub message: String,

    /// The index of the block that will include this transaction
    pub block_index: u64,
}

/// Response for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineResponse {
    /// The message
    pub message: String,

    /// The newly mined block
    pub block: Block,
}

/// Response for the mining cancellation endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct CancelMiningResponse {
    /// Whether a proof search was running
    pub cancelled: bool,
}

/// Response for the validate endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ValidateResponse {
    /// Whether the local chain is valid
    pub valid: bool,

    /// The length of the chain
    pub length: usize,
}

/// Request for the node registration and removal endpoints
#[derive(Serialize, Deserialize, ToSchema)]
pub struct NodesRequest {
    /// Node addresses, e.g. "http://192.168.0.5:5000"
    pub nodes: Vec<String>,
}

/// Response for the node endpoints
#[derive(Serialize, Deserialize, ToSchema)]
pub struct NodesResponse {
    /// The message
    pub message: String,

    /// Every node known after the operation
    pub total_nodes: Vec<String>,
}

/// Response for the resolve endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ResolveResponse {
    /// The message
    pub message: String,

    /// Whether the local chain was replaced
    pub replaced: bool,

    /// The chain held after resolution
    pub chain: Vec<Block>,
}

fn error_response(err: &BlockchainError) -> HttpResponse {
    let mut response = match err {
        BlockchainError::NodeError(NodeError::InvalidAddress(_)) => HttpResponse::BadRequest(),
        BlockchainError::NodeError(NodeError::NotFound(_)) => HttpResponse::NotFound(),
        BlockchainError::MiningInProgress
        | BlockchainError::StaleTip { .. }
        | BlockchainError::MiningError(MiningError::Cancelled { .. }) => HttpResponse::Conflict(),
        BlockchainError::MiningError(MiningError::DeadlineExceeded { .. }) => {
            HttpResponse::RequestTimeout()
        }
        BlockchainError::MiningError(MiningError::Exhausted) | BlockchainError::SystemError(_) => {
            HttpResponse::InternalServerError()
        }
    };

    response.json(serde_json::json!({
        "error": err.to_string()
    }))
}

/// Get the full blockchain
///
/// Returns the entire blockchain; this is also what peers fetch during consensus
#[utoipa::path(
    get,
    path = "/api/v1/chain",
    responses(
        (status = 200, description = "Blockchain retrieved successfully", body = ChainResponse)
    )
)]
pub async fn get_chain(blockchain: BlockchainData) -> impl Responder {
    let chain = blockchain.get_chain();

    let response = ChainResponse {
        length: chain.len(),
        chain,
    };

    HttpResponse::Ok().json(response)
}

/// Get all pending transactions
///
/// Returns all transactions waiting to be included in a block
#[utoipa::path(
    get,
    path = "/api/v1/transactions/pending",
    responses(
        (status = 200, description = "Pending transactions retrieved successfully", body = Vec<Transaction>)
    )
)]
pub async fn get_pending_transactions(blockchain: BlockchainData) -> impl Responder {
    let transactions = blockchain.get_pending_transactions();
    HttpResponse::Ok().json(transactions)
}

/// Create a new transaction
///
/// Adds a new transaction to the pending transactions
#[utoipa::path(
    post,
    path = "/api/v1/transactions/new",
    request_body = TransactionRequest,
    responses(
        (status = 201, description = "Transaction created successfully", body = TransactionResponse),
        (status = 400, description = "Missing or mistyped fields")
    )
)]
pub async fn new_transaction(
    blockchain: BlockchainData,
    transaction_req: web::Json<TransactionRequest>,
) -> impl Responder {
    let req = transaction_req.into_inner();
    let transaction = Transaction::new(req.sender, req.recipient, req.mac, req.action, req.amount);

    let block_index = blockchain.add_transaction(transaction);

    HttpResponse::Created().json(TransactionResponse {
        message: format!("Transaction will be added to Block {}", block_index),
        block_index,
    })
}

/// Mine a new block
///
/// Searches a proof for the current tip and forges a block with all pending transactions
/// plus the mining reward
#[utoipa::path(
    post,
    path = "/api/v1/mine",
    responses(
        (status = 200, description = "Block mined successfully", body = MineResponse),
        (status = 408, description = "Mining deadline exceeded"),
        (status = 409, description = "Mining cancelled, already running, or chain changed meanwhile")
    )
)]
pub async fn mine_block(blockchain: BlockchainData, miner: web::Data<Miner>) -> impl Responder {
    match miner.mine_block(&blockchain).await {
        Ok(block) => HttpResponse::Ok().json(MineResponse {
            message: "New Block Forged".to_string(),
            block,
        }),
        Err(err) => error_response(&err),
    }
}

/// Cancel mining
///
/// Stops the proof search currently running, if any
#[utoipa::path(
    post,
    path = "/api/v1/mine/cancel",
    responses(
        (status = 200, description = "Cancellation processed", body = CancelMiningResponse)
    )
)]
pub async fn cancel_mining(blockchain: BlockchainData) -> impl Responder {
    HttpResponse::Ok().json(CancelMiningResponse {
        cancelled: blockchain.cancel_mining(),
    })
}

/// Check if the blockchain is valid
///
/// Validates the entire local chain
#[utoipa::path(
    get,
    path = "/api/v1/validate",
    responses(
        (status = 200, description = "Blockchain validation status", body = ValidateResponse)
    )
)]
pub async fn validate_chain(blockchain: BlockchainData) -> impl Responder {
    let chain = blockchain.get_chain();

    HttpResponse::Ok().json(ValidateResponse {
        valid: blockchain.valid_chain(&chain),
        length: chain.len(),
    })
}

/// List known nodes
#[utoipa::path(
    get,
    path = "/api/v1/nodes",
    responses(
        (status = 200, description = "Known nodes", body = Vec<String>)
    )
)]
pub async fn get_nodes(blockchain: BlockchainData) -> impl Responder {
    HttpResponse::Ok().json(blockchain.nodes())
}

/// Register nodes
///
/// Adds peers by URL; only the host and port are kept
#[utoipa::path(
    post,
    path = "/api/v1/nodes/register",
    request_body = NodesRequest,
    responses(
        (status = 201, description = "Nodes registered", body = NodesResponse),
        (status = 400, description = "Empty list or invalid address")
    )
)]
pub async fn register_nodes(
    blockchain: BlockchainData,
    nodes_req: web::Json<NodesRequest>,
) -> impl Responder {
    if nodes_req.nodes.is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Please supply a valid list of nodes"
        }));
    }

    for node in &nodes_req.nodes {
        if let Err(err) = blockchain.register_node(node) {
            return error_response(&err);
        }
    }

    HttpResponse::Created().json(NodesResponse {
        message: "New nodes have been added".to_string(),
        total_nodes: blockchain.nodes(),
    })
}

/// Remove nodes
///
/// Removes peers by URL; an unknown node is an error
#[utoipa::path(
    post,
    path = "/api/v1/nodes/remove",
    request_body = NodesRequest,
    responses(
        (status = 200, description = "Nodes removed", body = NodesResponse),
        (status = 400, description = "Invalid address"),
        (status = 404, description = "Node not registered")
    )
)]
pub async fn remove_nodes(
    blockchain: BlockchainData,
    nodes_req: web::Json<NodesRequest>,
) -> impl Responder {
    for node in &nodes_req.nodes {
        if let Err(err) = blockchain.remove_node(node) {
            return error_response(&err);
        }
    }

    HttpResponse::Ok().json(NodesResponse {
        message: "Nodes have been removed".to_string(),
        total_nodes: blockchain.nodes(),
    })
}

/// Resolve conflicts
///
/// Adopts the longest valid chain held by the known peers
#[utoipa::path(
    get,
    path = "/api/v1/nodes/resolve",
    responses(
        (status = 200, description = "Consensus round finished", body = ResolveResponse)
    )
)]
pub async fn resolve_conflicts(
    blockchain: BlockchainData,
    resolver: web::Data<ConsensusResolver>,
    fetcher: FetcherData,
) -> impl Responder {
    let resolution = resolver
        .resolve_conflicts(&blockchain, fetcher.get_ref())
        .await;

    let message = if resolution.is_replaced() {
        "Our chain was replaced"
    } else {
        "Our chain is authoritative"
    };

    HttpResponse::Ok().json(ResolveResponse {
        message: message.to_string(),
        replaced: resolution.is_replaced(),
        chain: blockchain.get_chain(),
    })
}

/// List authorized devices
///
/// Returns every device identifier revealed by a validated chain
#[utoipa::path(
    get,
    path = "/api/v1/users",
    responses(
        (status = 200, description = "Authorized device identifiers", body = Vec<String>)
    )
)]
pub async fn get_users(blockchain: BlockchainData) -> impl Responder {
    HttpResponse::Ok().json(blockchain.authorized_users())
}
