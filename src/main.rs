//! Rollcall - authentication and session core for a school attendance system

use anyhow::Result;
use std::net::SocketAddr;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rollcall::{
    api::{self, AppState},
    config::Config,
    db,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rollcall=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Rollcall...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    pool.ping().await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    tracing::info!(
        "Session store: {:?}, timeout {}s",
        config.session.store,
        config.session.timeout_seconds
    );
    let state = AppState::new(pool.clone(), config.session.clone());

    if let Some(admin) = &config.bootstrap {
        state
            .auth_service
            .bootstrap_admin(&admin.username, &admin.password, &admin.full_name)
            .await?;
    }

    // Drop abandoned sessions now and every 5 minutes
    {
        let guard = state.guard.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(300));
            loop {
                interval.tick().await;
                if let Err(e) = guard.purge_idle().await {
                    tracing::warn!("Idle session cleanup failed: {}", e);
                }
            }
        });
    }

    let app = api::build_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    pool.close().await;
    Ok(())
}
