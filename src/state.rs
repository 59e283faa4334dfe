use crate::{config::Config, storage::FileStore};
use sqlx::{Pool, Postgres};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Pool<Postgres>,
    pub config: Arc<Config>,
    pub storage: Arc<dyn FileStore>,
}
