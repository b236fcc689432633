use std::sync::Arc;

use aqura_cache::ExpiringCache;
use sqlx_postgres::PgPool;

use crate::config::AppConfig;

/// Cached handler responses, keyed by [`aqura_cache::keys`].
pub type ResponseCache = ExpiringCache<serde_json::Value>;

/// Shared application state handed to request handlers.
///
/// There is exactly one cache per process; every clone of the state points at
/// the same instance the invalidation dispatcher evicts from.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db_pool: PgPool,
    pub cache: Arc<ResponseCache>,
}

impl AppState {
    pub fn new(config: AppConfig, db_pool: PgPool) -> Self {
        Self {
            config: Arc::new(config),
            db_pool,
            cache: Arc::new(ResponseCache::new()),
        }
    }
}
