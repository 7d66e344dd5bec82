use opencharacter::{
    config::AppConfig,
    db, routes,
    services::{create_email_service, create_token_store},
    AppState,
};

use anyhow::Context;
use std::{net::SocketAddr, sync::Arc};
use tower_sessions_sqlx_store::SqliteStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "opencharacter=debug,tower_http=debug,axum::rejection=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env().context("Invalid configuration")?;
    config.validate().context("Refusing to start")?;
    let config = Arc::new(config);

    tracing::info!("Starting in {:?} mode", config.environment);

    // Database connection
    let pool = db::create_pool(&config.database_url).await?;

    // Run migrations
    db::run_migrations(&pool).await?;

    let token_store = create_token_store(&config.token_store, pool.clone())?;
    let email_service = create_email_service(&config);

    let app_state = AppState::new(config.clone(), pool.clone(), token_store, email_service);

    // Session store
    let session_store = SqliteStore::new(pool.clone())
        .with_table_name("sessions")
        .map_err(|e| anyhow::anyhow!("Invalid session table name: {}", e))?;
    session_store.migrate().await?;

    let session_layer = config
        .session_config()
        .create_layer(session_store, config.session_secret.as_deref());

    let app = routes::build_router(app_state).layer(session_layer);

    // Start server
    let addr = SocketAddr::from((config.host.parse::<std::net::IpAddr>()?, config.port));

    tracing::info!("Server running on http://{}", addr);
    tracing::info!("Magic links point at {}", config.base_url);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
