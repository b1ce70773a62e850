use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use log::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod api;
mod blockchain;
mod config;
mod network;

use blockchain::consensus::ChainFetcher;
use blockchain::{Blockchain, ConsensusResolver, Miner};
use config::NodeConfig;
use network::HttpChainFetcher;

// Initialize the blockchain with its genesis block and the configured peers
fn initialize_blockchain(config: &NodeConfig) -> Blockchain {
    let blockchain = Blockchain::new();

    for peer in &config.bootstrap_peers {
        if let Err(err) = blockchain.register_node(peer) {
            warn!("Ignoring bootstrap peer {}: {}", peer, err);
        }
    }

    blockchain
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::get_chain,
        api::handlers::get_pending_transactions,
        api::handlers::new_transaction,
        api::handlers::mine_block,
        api::handlers::cancel_mining,
        api::handlers::validate_chain,
        api::handlers::get_nodes,
        api::handlers::register_nodes,
        api::handlers::remove_nodes,
        api::handlers::resolve_conflicts,
        api::handlers::get_users
    ),
    components(
        schemas(
            blockchain::Block,
            blockchain::Transaction,
            api::handlers::ChainResponse,
            api::handlers::TransactionRequest,
            api::handlers::TransactionResponse,
            api::handlers::MineResponse,
            api::handlers::CancelMiningResponse,
            api::handlers::ValidateResponse,
            api::handlers::NodesRequest,
            api::handlers::NodesResponse,
            api::handlers::ResolveResponse
        )
    ),
    tags(
        (name = "spectrum", description = "Ledger node API endpoints")
    ),
    info(
        title = "Spectrum Ledger API",
        version = "0.1.0",
        description = "Proof-of-work ledger node with longest-chain consensus",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = NodeConfig::from_env()?;

    let blockchain = web::Data::new(initialize_blockchain(&config));
    let miner = web::Data::new(Miner::new(config.node_id.clone(), config.mining_deadline));
    let resolver = web::Data::new(ConsensusResolver::new(config.peer_timeout));
    let fetcher: Arc<dyn ChainFetcher + Send + Sync> =
        Arc::new(HttpChainFetcher::new(config.peer_timeout));
    let fetcher = web::Data::from(fetcher);

    info!(
        "Node {} starting HTTP server at http://{}:{}",
        config.node_id, config.host, config.port
    );

    let app_blockchain = blockchain.clone();
    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(app_blockchain.clone())
            .app_data(miner.clone())
            .app_data(resolver.clone())
            .app_data(fetcher.clone())
            // API routes
            .configure(api::configure_routes)
            // Swagger UI
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", ApiDoc::openapi())
            )
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    // Drain any proof search still running on the blocking pool
    blockchain.cancel_mining();
    info!("Node {} stopped", config.node_id);

    Ok(())
}
