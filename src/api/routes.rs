use actix_web::web;

use super::handlers;

/// Configures the API routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/chain", web::get().to(handlers::get_chain))
            .route("/transactions/pending", web::get().to(handlers::get_pending_transactions))
            .route("/transactions/new", web::post().to(handlers::new_transaction))
            .route("/mine", web::post().to(handlers::mine_block))
            .route("/mine/cancel", web::post().to(handlers::cancel_mining))
            .route("/validate", web::get().to(handlers::validate_chain))
            .route("/nodes", web::get().to(handlers::get_nodes))
            .route("/nodes/register", web::post().to(handlers::register_nodes))
            .route("/nodes/remove", web::post().to(handlers::remove_nodes))
            .route("/nodes/resolve", web::get().to(handlers::resolve_conflicts))
            .route("/users", web::get().to(handlers::get_users))
    );
}
