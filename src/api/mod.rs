// API module - HTTP endpoints

use sqlx::PgPool;

use crate::config::Config;

pub mod wallet;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
}
