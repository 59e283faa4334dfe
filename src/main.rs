use std::net::SocketAddr;
use std::sync::Arc;

use atelier_messaging::config::Config;
use atelier_messaging::error::{AppError, AppResult};
use atelier_messaging::state::AppState;
use atelier_messaging::storage::LocalFileStore;
use atelier_messaging::{db, logging, routes};

#[tokio::main]
async fn main() -> AppResult<()> {
    logging::init_tracing();

    let config = Config::from_env()?;
    let port = config.port;

    let pool = db::init_pool(&config.database_url).await?;
    db::MIGRATOR
        .run(&pool)
        .await
        .map_err(|e| AppError::StartServer(format!("migrations failed: {e}")))?;

    let storage = Arc::new(LocalFileStore::new(config.attachment_root.clone()));
    let state = AppState {
        db: pool,
        config: Arc::new(config),
        storage,
    };

    let app = routes::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::StartServer(format!("bind {addr}: {e}")))?;
    tracing::info!(%addr, "messaging service listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::StartServer(e.to_string()))?;

    Ok(())
}
