//! Redis-backed shared state: permission cache, token revocation and typing indicators.

pub mod permission_cache;
pub mod token_revocation;
pub mod typing;

use deadpool_redis::{Config as RedisPoolConfig, Pool, Runtime};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::RedisConfig;

pub use permission_cache::PermissionCache;
pub use token_revocation::TokenRevocationList;
pub use typing::TypingTracker;

pub fn create_redis_pool(config: &RedisConfig) -> Option<Pool> {
    let url = config.url.as_ref()?;

    let timeout = Duration::from_secs(config.connection_timeout_secs);
    let pool = RedisPoolConfig::from_url(url)
        .builder()
        .ok()
        .and_then(|b| {
            b.max_size(config.pool_size)
                .wait_timeout(Some(timeout))
                .create_timeout(Some(timeout))
                .runtime(Runtime::Tokio1)
                .build()
                .ok()
        });

    let host = url.split('@').next_back().unwrap_or("***");
    match &pool {
        Some(_) => info!(redis_url = %host, "Redis pool created"),
        None => warn!(redis_url = %host, "Redis pool could not be created, running without cache"),
    }

    pool
}

#[derive(Clone)]
pub struct CacheServices {
    pub token_revocation: Arc<TokenRevocationList>,
    pub permission_cache: Arc<PermissionCache>,
    pub typing: Arc<TypingTracker>,
}

impl CacheServices {
    pub fn new(redis_pool: Option<Pool>, typing_ttl_secs: u64) -> Self {
        Self {
            token_revocation: Arc::new(TokenRevocationList::new(redis_pool.clone())),
            permission_cache: Arc::new(PermissionCache::new(redis_pool.clone())),
            typing: Arc::new(TypingTracker::new(redis_pool, typing_ttl_secs)),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, 4)
    }
}
