use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::AppConfig;

/// Build a lazily-connecting pool from the configured database URL.
/// Returns `None` when no URL is set so the server can still boot and
/// report a degraded health status instead of crashing on startup.
pub fn build_pool(config: &AppConfig) -> Option<PgPool> {
    let url = config.supabase_db_url.as_deref()?;

    let options = PgPoolOptions::new()
        .max_connections(config.db_pool_max_connections)
        .min_connections(config.db_pool_min_connections)
        .acquire_timeout(Duration::from_secs(config.db_pool_acquire_timeout_seconds))
        .idle_timeout(Duration::from_secs(config.db_pool_idle_timeout_seconds));

    match url.parse() {
        Ok(connect_options) => Some(options.connect_lazy_with(connect_options)),
        Err(error) => {
            tracing::error!(error = %error, "Invalid database URL, running without a pool");
            None
        }
    }
}
