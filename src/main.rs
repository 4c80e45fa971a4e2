use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

mod api;
mod config;
mod models;
mod services;
mod storage;
mod validation;

use config::Config;
use models::SourceType;
use services::database::{create_driver, SourceRegistry};
use services::ModelService;
use storage::JoinCatalogStore;

/// Register every configured source; a source that fails to build is skipped
async fn register_sources(service: &ModelService, config: &Config) {
    for source in &config.sources {
        let source_type = match SourceType::from_str(&source.source_type) {
            Ok(source_type) => source_type,
            Err(e) => {
                warn!("Skipping source '{}': {}", source.id, e);
                continue;
            }
        };

        let driver = create_driver(
            source_type,
            &source.url,
            config.query_timeout(),
            config.pool_size_for(source),
        );
        let registered = match driver {
            Ok(driver) => service.add_source(&source.id, source.name.clone(), driver).await,
            Err(e) => Err(e),
        };
        match registered {
            Ok(()) => info!("Registered {} source '{}'", source_type.as_str(), source.id),
            Err(e) => warn!("Skipping source '{}': {}", source.id, e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with_ansi(config.logging.style != "never")
        .init();

    info!("Starting server on {}", config.server_address());

    // Initialize the join catalog
    let catalog = JoinCatalogStore::new(&config.database.url).await.map_err(|e| {
        error!("Failed to initialize join catalog: {}", e);
        e
    })?;

    let service = ModelService::new(
        Arc::new(SourceRegistry::new()),
        catalog,
        Arc::new(config.tenants.limits()),
        config.suggestions.clone(),
        config.query_timeout(),
    );
    register_sources(&service, &config).await;

    // Create router with state
    let app: Router = api::routes::create_router_with_state(Arc::new(service), config.clone());

    // Start server
    let addr: SocketAddr = config.server_address().parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    Ok(())
}
