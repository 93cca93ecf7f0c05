use axum::extract::FromRef;
use sqlx::PgPool;

use crate::config::AppConfig;

/// Composite state for the router; sub-extractors pull out what they need.
#[derive(Clone, FromRef)]
pub struct AppState {
    pub pool: PgPool,
    pub config: AppConfig,
}
