//! Shared fixtures for integration tests.
//!
//! Tests that need Postgres read `TEST_DATABASE_URL` and skip cleanly when
//! it is unset, so the suite stays runnable on machines without a database.

use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use atelier_messaging::config::Config;
use atelier_messaging::db::MIGRATOR;
use atelier_messaging::routes;
use atelier_messaging::state::AppState;
use atelier_messaging::storage::LocalFileStore;

pub async fn test_pool() -> Option<Pool<Postgres>> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("connect to TEST_DATABASE_URL");
    MIGRATOR.run(&pool).await.expect("run migrations");
    Some(pool)
}

/// App state over a throwaway attachment directory. Keep the returned
/// `TempDir` alive for the duration of the test.
pub fn test_state(pool: Pool<Postgres>) -> (AppState, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("create attachment tempdir");
    let mut config = Config::test_defaults();
    config.attachment_root = dir.path().to_path_buf();
    let state = AppState {
        db: pool,
        storage: Arc::new(LocalFileStore::new(dir.path())),
        config: Arc::new(config),
    };
    (state, dir)
}

/// Insert a user row. Usernames get a uuid suffix so runs never collide.
pub async fn create_user(pool: &Pool<Postgres>, display_name: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, username, display_name) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(format!("{}_{id}", display_name.to_lowercase().replace(' ', "_")))
        .bind(display_name)
        .execute(pool)
        .await
        .expect("insert test user");
    id
}

pub async fn spawn_app(state: AppState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    let app = routes::build_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve test app");
    });
    addr
}
