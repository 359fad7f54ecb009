// HTTP request handlers for the gateway
use actix_web::web;

pub mod auth;
pub mod health;
pub mod proxy_upstream;

pub use auth::{logout, session_info};
pub use health::health;
pub use proxy_upstream::proxy_upstream;

/// Register the gateway's own endpoints; every other path is proxied
pub fn configure_services(cfg: &mut web::ServiceConfig) {
    cfg.route("/ping", web::get().to(health))
        .route("/auth/session", web::get().to(session_info))
        .route("/auth/logout", web::get().to(logout))
        .route("/auth/logout", web::post().to(logout))
        .default_service(web::to(proxy_upstream));
}
