#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::time::Duration;

use actix_web::{middleware::Logger, web, App, HttpServer};
use tollgate::{
    authentication::{AuthenticationServiceFactory, GatewayServices},
    handlers::configure_services,
    revocation::spawn_cleanup_task,
    settings::TollgateSettings,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Loads .env, Settings.toml and environment overrides, and initializes the logger
    let settings = TollgateSettings::load()
        .map_err(|e| std::io::Error::other(format!("Failed to load settings: {e}")))?;

    let services = AuthenticationServiceFactory::create(&settings)
        .map_err(|e| std::io::Error::other(format!("Failed to start gateway: {e:#}")))?;

    start_server(services, settings).await
}

/// Run the server until it stops, then shut the revocation store down
///
/// # Errors
///
/// Returns an error if:
/// - Server binding fails
/// - Server fails to start
async fn start_server(
    services: GatewayServices,
    settings: TollgateSettings,
) -> std::io::Result<()> {
    let bind_address = settings.get_bind_address();
    print_startup_info(&bind_address, &services, &settings);

    let cleanup = spawn_cleanup_task(
        services.revocation.clone(),
        Duration::from_secs(settings.revocation.cleanup_interval_seconds.max(1)),
    );
    let revocation = services.revocation.clone();

    let services = web::Data::new(services);
    let settings = web::Data::new(settings);

    let result = HttpServer::new(move || {
        App::new()
            .app_data(services.clone())
            .app_data(settings.clone())
            .wrap(Logger::default())
            .configure(configure_services)
    })
    .bind(&bind_address)?
    .run()
    .await;

    cleanup.abort();
    if let Err(e) = revocation.close().await {
        log::error!("Failed to close revocation store: {e}");
    }
    log::info!("Gateway stopped");

    result
}

fn print_startup_info(bind_address: &str, services: &GatewayServices, settings: &TollgateSettings) {
    println!("Starting Tollgate gateway on http://{bind_address}");
    println!("Public base URL: {}", settings.application.base_url);
    println!(
        "Revocation backend: {} ({}, lookup timeout {}ms)",
        settings.revocation.backend,
        settings.revocation.failure_policy,
        settings.revocation.lookup_timeout_ms
    );
    println!();
    println!("Gateway endpoints:");
    println!("  GET      /ping          - Health check");
    println!("  GET      /auth/session  - Current session state");
    println!("  GET|POST /auth/logout   - Revoke session and clear cookies");
    println!();
    println!("Proxied routes ({}):", services.routes.len());
    for route in &settings.routes {
        println!(
            "  {:<20} -> {} [{}]",
            route.path_prefix, route.upstream_url, route.security_profile
        );
    }
}
