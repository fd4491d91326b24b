//! opshq API server binary

use std::net::SocketAddr;

use axum::http::{header, HeaderValue, Method};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use opshq_api::{create_router, AppState, Config};
use opshq_shared::{create_migration_pool, create_pool, run_migrations};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,opshq_api=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting opshq API server v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    tracing::info!("Connecting to database...");
    let pool = create_pool(&config.database_url).await?;

    // Migrations go through the direct URL when configured; poolers in
    // transaction mode cannot run them.
    let migration_url = config
        .database_direct_url
        .as_ref()
        .unwrap_or(&config.database_url);
    let migration_pool = create_migration_pool(migration_url).await?;
    run_migrations(&migration_pool).await?;
    migration_pool.close().await;
    tracing::info!("Database migrations applied");

    let allowed_origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true);

    let state = AppState::new(pool, config.clone());
    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.bind_address.parse()?;
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
